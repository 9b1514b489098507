//! Streaming types.
//!
//! A backend produces an ordered sequence of [`StreamChunk`]s for one
//! execution; the retry client pushes each into a [`ChunkSink`].

use crate::error::GatewayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An incremental text fragment produced by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Generated text
    pub text: String,
    /// Whether the backend marked this as the final fragment
    #[serde(default)]
    pub done: bool,
}

impl StreamChunk {
    /// Create an intermediate chunk
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }

    /// Create the final chunk of a generation
    pub fn last(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: true,
        }
    }

    /// Whether the chunk carries no text
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Consumer of chunks produced during one inference execution.
///
/// `on_chunk` is awaited before the next chunk is pulled from the backend, so
/// chunks arrive in production order. Returning an error aborts the execution.
#[async_trait]
pub trait ChunkSink: Send {
    /// Handle one chunk
    async fn on_chunk(&mut self, chunk: &StreamChunk) -> GatewayResult<()>;

    /// Called when the sink learns the consumer is gone and the execution
    /// should stop producing output
    fn on_cancel_signal(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_constructors() {
        let chunk = StreamChunk::new("He");
        assert!(!chunk.done);
        assert!(!chunk.is_empty());

        let last = StreamChunk::last("");
        assert!(last.done);
        assert!(last.is_empty());
    }
}
