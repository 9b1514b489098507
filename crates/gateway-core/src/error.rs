//! Error types for the gateway.
//!
//! Every failure a query can hit is a [`GatewayError`]. The variants follow the
//! propagation policy of the pipeline: validation and admission failures are
//! local and never retried, cancellations abort immediately, provider failures
//! are retried, and transport failures end only the owning session.

use std::fmt;

/// Result alias used throughout the gateway crates
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Why an in-flight query was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The client connection was closed or could not be written to
    ClientDisconnected,
    /// The per-attempt deadline elapsed
    DeadlineExceeded,
    /// The process is shutting down
    Shutdown,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientDisconnected => write!(f, "client disconnected"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::Shutdown => write!(f, "server shutting down"),
        }
    }
}

/// Unified gateway error
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// The inbound message or query is invalid
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable message
        message: String,
        /// Machine-readable code
        code: String,
    },

    /// The rate limiter rejected the query
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The query was cancelled mid-flight
    #[error("Request cancelled: {reason}")]
    Cancelled {
        /// Cancellation cause
        reason: CancelReason,
    },

    /// The inference backend failed
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider identifier
        provider: String,
        /// Error message
        message: String,
        /// HTTP status code returned by the backend, if any
        status_code: Option<u16>,
        /// Whether the backend indicated the failure is transient
        retryable: bool,
    },

    /// Every attempt failed
    #[error("LLM request failed after {retries} retries")]
    RetriesExhausted {
        /// Number of retries performed after the first attempt
        retries: u32,
        /// The error of the final attempt
        last_error: Box<GatewayError>,
    },

    /// Reading from or writing to the client connection failed
    #[error("Transport error: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled { reason }
    }

    /// Create a cancellation for an attempt that ran past its deadline
    #[must_use]
    pub fn deadline_exceeded() -> Self {
        Self::Cancelled {
            reason: CancelReason::DeadlineExceeded,
        }
    }

    /// Create a provider error
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create a retries-exhausted error wrapping the final attempt's error
    #[must_use]
    pub fn retries_exhausted(retries: u32, last_error: Self) -> Self {
        Self::RetriesExhausted {
            retries,
            last_error: Box::new(last_error),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the failure is transient.
    ///
    /// For provider errors this is the backend's own verdict. The retry loop
    /// retries every non-cancellation error regardless and only logs this value.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Internal { .. } => true,
            _ => false,
        }
    }

    /// Whether this error represents a cancellation
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Error type string, used as a metric label
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::RateLimited => "rate_limited",
            Self::Cancelled { .. } => "cancelled",
            Self::Provider { .. } => "provider",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Transport { .. } => "transport",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
        }
    }

    /// Message sent to the client in an `{"error": ...}` frame
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::RateLimited => "Too many requests".to_string(),
            Self::Cancelled { .. } => "Stream Cancelled".to_string(),
            Self::RetriesExhausted { .. } => self.to_string(),
            Self::Provider { .. } => "LLM request failed".to_string(),
            Self::Transport { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation("Invalid message format", format!("invalid_json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::provider("ollama", "boom", Some(503), true).is_retryable());
        assert!(!GatewayError::provider("ollama", "bad", Some(400), false).is_retryable());
        assert!(!GatewayError::cancelled(CancelReason::ClientDisconnected).is_retryable());
        assert!(!GatewayError::deadline_exceeded().is_retryable());
        assert!(!GatewayError::validation("Invalid query", "empty_query").is_retryable());
        assert!(!GatewayError::RateLimited.is_retryable());
    }

    #[test]
    fn test_retries_exhausted_names_retry_count() {
        let err = GatewayError::retries_exhausted(
            3,
            GatewayError::provider("ollama", "connection refused", None, true),
        );
        assert_eq!(err.to_string(), "LLM request failed after 3 retries");
        assert_eq!(err.client_message(), "LLM request failed after 3 retries");
    }

    #[test]
    fn test_client_messages() {
        assert_eq!(GatewayError::RateLimited.client_message(), "Too many requests");
        assert_eq!(
            GatewayError::cancelled(CancelReason::DeadlineExceeded).client_message(),
            "Stream Cancelled"
        );
        assert_eq!(
            GatewayError::validation("Invalid query", "empty_query").client_message(),
            "Invalid query"
        );
        assert_eq!(
            GatewayError::transport("broken pipe").client_message(),
            "Internal server error"
        );
    }

    #[test]
    fn test_json_error_maps_to_validation() {
        let err: GatewayError = serde_json::from_str::<serde_json::Value>("{nope")
            .unwrap_err()
            .into();
        assert_eq!(err.error_type(), "validation");
        assert_eq!(err.client_message(), "Invalid message format");
    }
}
