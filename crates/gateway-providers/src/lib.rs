//! # Gateway Providers
//!
//! Inference backend implementations for the LLM Chat Gateway.
//!
//! Currently supported:
//! - Ollama (native `/api/generate` streaming API)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ollama;

pub use ollama::{OllamaBackend, OllamaConfig};
