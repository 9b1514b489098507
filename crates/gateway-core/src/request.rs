//! Request types for the gateway.
//!
//! This module defines the client wire messages exchanged over a chat
//! connection, the validated [`Query`], and the per-query [`RequestContext`].

use crate::error::{CancelReason, GatewayError, GatewayResult};
use crate::types::RequestId;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Inbound client message: `{"query": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Free-text question
    #[serde(default)]
    pub query: String,
}

impl ChatRequest {
    /// Create a new chat request
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    /// Decode a request from a raw text frame
    ///
    /// # Errors
    /// Returns a validation error if the frame is not a JSON object with a string `query`
    pub fn from_json(text: &str) -> GatewayResult<Self> {
        serde_json::from_str(text).map_err(Into::into)
    }
}

/// Outbound client message.
///
/// Exactly one of `answer` or `error` is set. Partial chunks and the final
/// aggregated answer both use `answer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Partial chunk or full answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    /// Error description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    /// Create an answer message
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            answer: Some(text.into()),
            error: None,
        }
    }

    /// Create an error message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            answer: None,
            error: Some(message.into()),
        }
    }

    /// Create the error message a client sees for `err`
    #[must_use]
    pub fn from_error(err: &GatewayError) -> Self {
        Self::error(err.client_message())
    }

    /// Whether this message carries an error
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Encode as a JSON text frame
    ///
    /// # Errors
    /// Returns an internal error if serialization fails
    pub fn to_json(&self) -> GatewayResult<String> {
        serde_json::to_string(self)
            .map_err(|e| GatewayError::internal(format!("Failed to encode response: {e}")))
    }
}

/// A validated, non-blank query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Validate a raw query string.
    ///
    /// The text is kept as sent; only the blank check trims.
    ///
    /// # Errors
    /// Returns a validation error if the query is empty after trimming whitespace
    pub fn parse(raw: impl Into<String>) -> GatewayResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(GatewayError::validation("Invalid query", "empty_query"));
        }
        Ok(Self(raw))
    }

    /// Borrow the query text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the completion prompt sent to the backend
    #[must_use]
    pub fn to_prompt(&self) -> String {
        format!("Human: {}\nAssistant:", self.0)
    }
}

impl TryFrom<ChatRequest> for Query {
    type Error = GatewayError;

    fn try_from(request: ChatRequest) -> Result<Self, Self::Error> {
        Self::parse(request.query)
    }
}

/// Per-query execution context
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation ID for logs
    pub id: RequestId,
    /// Cancellation signal for everything running on behalf of this query
    pub cancel: CancellationToken,
    /// Deadline of the attempt currently in flight
    pub deadline: Option<Instant>,
    /// Process-wide shutdown signal, used to tell shutdown apart from a client leaving
    pub shutdown: Option<CancellationToken>,
}

impl RequestContext {
    /// Create a context with a fresh ID and its own cancellation token
    #[must_use]
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Create a context bound to an existing cancellation token
    #[must_use]
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            id: RequestId::generate(),
            cancel,
            deadline: None,
            shutdown: None,
        }
    }

    /// Attach the process shutdown token
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Why the query was cancelled, judged by which signal fired
    #[must_use]
    pub fn cancel_reason(&self) -> CancelReason {
        match &self.shutdown {
            Some(shutdown) if shutdown.is_cancelled() => CancelReason::Shutdown,
            _ => CancelReason::ClientDisconnected,
        }
    }

    /// Cancellation error for the current cancel reason
    #[must_use]
    pub fn cancelled_error(&self) -> GatewayError {
        GatewayError::cancelled(self.cancel_reason())
    }

    /// Set the deadline of the next attempt, returning it
    pub fn start_attempt(&mut self, timeout: std::time::Duration) -> Instant {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(deadline);
        deadline
    }

    /// Whether the query has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
