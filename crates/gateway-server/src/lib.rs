//! # Gateway Server
//!
//! WebSocket chat server for the LLM Chat Gateway.
//!
//! This crate provides:
//! - Axum-based HTTP server with a `/chat` WebSocket endpoint
//! - Per-connection sessions with admission control and streamed answers
//! - Health, readiness, and Prometheus metrics endpoints
//! - Graceful shutdown handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod handlers;
pub mod relay;
pub mod routes;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod state;

// Re-export main types
pub use relay::StreamRelay;
pub use routes::create_router;
pub use server::{Server, ServerConfig, ServerError};
pub use session::ConnectionSession;
pub use shutdown::shutdown_signal;
pub use state::{AppState, AppStateBuilder};
