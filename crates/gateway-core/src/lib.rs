//! # Gateway Core
//!
//! Core types, traits, and error handling for the LLM Chat Gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Client wire messages and validated queries
//! - The inference backend trait and sampling parameters
//! - Streaming chunks and the chunk sink abstraction
//! - Error types and handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod request;
pub mod streaming;
pub mod types;

// Re-export commonly used types
pub use error::{CancelReason, GatewayError, GatewayResult};
pub use provider::{ChunkStream, HealthStatus, InferenceBackend, SamplingParams};
pub use request::{ChatRequest, ChatResponse, Query, RequestContext};
pub use streaming::{ChunkSink, StreamChunk};
pub use types::RequestId;

// Cancellation tokens cross every crate boundary in the pipeline
pub use tokio_util::sync::CancellationToken;
