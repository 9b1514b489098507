//! # Gateway Resilience
//!
//! Admission control and retry handling for the LLM Chat Gateway:
//! - Fixed-window rate limiter shared by all connections
//! - Concurrency gate bounding in-flight inference executions
//! - Retrying inference client with exponential backoff and per-attempt deadlines

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod concurrency;
pub mod rate_limiter;
pub mod retry;

// Re-export main types
pub use concurrency::{ConcurrencyGate, ConcurrencyPermit};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterStats};
pub use retry::{RetryConfig, RetryPolicy, RetryPolicyBuilder, RetryingInferenceClient};
