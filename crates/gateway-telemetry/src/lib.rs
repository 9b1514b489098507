//! # Gateway Telemetry
//!
//! Observability and telemetry for the LLM Chat Gateway.
//!
//! This crate provides:
//! - Prometheus metrics for monitoring
//! - Structured logging

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;

// Re-export main types
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};
pub use metrics::{Metrics, MetricsConfig, MetricsError, QueryOutcome};
