//! Chunk relay from the inference client to a client connection.
//!
//! A [`StreamRelay`] lives for one query. Every chunk is written to the
//! connection as `{"answer": chunk}` the moment it arrives, and
//! [`StreamRelay::finish`] writes the single terminal message.

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use gateway_core::{
    CancellationToken, ChatResponse, ChunkSink, GatewayError, GatewayResult, StreamChunk,
};
use gateway_telemetry::Metrics;
use std::fmt::Display;
use tracing::{debug, trace};

/// Forwards chunks of one query to the connection writer
pub struct StreamRelay<'a, W> {
    writer: &'a mut W,
    cancel: CancellationToken,
    accumulated: String,
    chunks_sent: usize,
    broken: bool,
    metrics: Option<Metrics>,
}

impl<'a, W> StreamRelay<'a, W>
where
    W: Sink<Message> + Unpin + Send,
    W::Error: Display,
{
    /// Create a relay writing to `writer`; `cancel` is the query's token
    pub fn new(writer: &'a mut W, cancel: CancellationToken) -> Self {
        Self {
            writer,
            cancel,
            accumulated: String::new(),
            chunks_sent: 0,
            broken: false,
            metrics: None,
        }
    }

    /// Count forwarded chunks in `metrics`
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Everything forwarded so far, across attempts
    #[must_use]
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Number of partial messages written
    #[must_use]
    pub fn chunks_sent(&self) -> usize {
        self.chunks_sent
    }

    /// Write the terminal message for `outcome` and consume the relay.
    ///
    /// # Errors
    /// Returns a transport error if the connection is gone
    pub async fn finish(mut self, outcome: &GatewayResult<String>) -> GatewayResult<()> {
        if self.broken {
            return Err(GatewayError::transport("Connection already closed"));
        }

        let response = match outcome {
            Ok(answer) => ChatResponse::answer(answer.clone()),
            Err(err) => ChatResponse::from_error(err),
        };

        debug!(
            chunks_sent = self.chunks_sent,
            is_error = response.is_error(),
            "Writing terminal message"
        );

        self.write(&response).await
    }

    async fn write(&mut self, response: &ChatResponse) -> GatewayResult<()> {
        let frame = response.to_json()?;
        if let Err(e) = self.writer.send(Message::Text(frame)).await {
            self.broken = true;
            return Err(GatewayError::transport(format!("Write failed: {e}")));
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, W> ChunkSink for StreamRelay<'a, W>
where
    W: Sink<Message> + Unpin + Send,
    W::Error: Display,
{
    async fn on_chunk(&mut self, chunk: &StreamChunk) -> GatewayResult<()> {
        if self.broken {
            return Err(GatewayError::transport("Connection already closed"));
        }

        trace!(len = chunk.text.len(), "Forwarding chunk");
        self.accumulated.push_str(&chunk.text);
        self.write(&ChatResponse::answer(chunk.text.clone())).await?;

        self.chunks_sent += 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_chunk();
        }
        Ok(())
    }

    fn on_cancel_signal(&mut self) {
        debug!("Client gone, cancelling in-flight inference");
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::StreamExt;
    use gateway_core::CancelReason;

    fn text(message: Message) -> String {
        match message {
            Message::Text(text) => text,
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chunks_then_terminal_answer() {
        let (mut tx, rx) = mpsc::unbounded::<Message>();
        let cancel = CancellationToken::new();

        let mut relay = StreamRelay::new(&mut tx, cancel.clone());
        relay.on_chunk(&StreamChunk::new("He")).await.unwrap();
        relay.on_chunk(&StreamChunk::new("llo")).await.unwrap();
        assert_eq!(relay.accumulated(), "Hello");
        assert_eq!(relay.chunks_sent(), 2);

        relay.finish(&Ok("Hello".to_string())).await.unwrap();
        drop(tx);

        let frames: Vec<String> = rx.map(text).collect().await;
        assert_eq!(
            frames,
            vec![
                r#"{"answer":"He"}"#,
                r#"{"answer":"llo"}"#,
                r#"{"answer":"Hello"}"#,
            ]
        );
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_terminal_error_message() {
        let (mut tx, rx) = mpsc::unbounded::<Message>();
        let relay = StreamRelay::new(&mut tx, CancellationToken::new());

        let err = GatewayError::retries_exhausted(
            3,
            GatewayError::provider("ollama", "boom", Some(500), true),
        );
        relay.finish(&Err(err)).await.unwrap();
        drop(tx);

        let frames: Vec<String> = rx.map(text).collect().await;
        assert_eq!(
            frames,
            vec![r#"{"error":"LLM request failed after 3 retries"}"#]
        );
    }

    #[tokio::test]
    async fn test_cancelled_outcome_reports_stream_cancelled() {
        let (mut tx, rx) = mpsc::unbounded::<Message>();
        let relay = StreamRelay::new(&mut tx, CancellationToken::new());

        relay
            .finish(&Err(GatewayError::cancelled(CancelReason::DeadlineExceeded)))
            .await
            .unwrap();
        drop(tx);

        let frames: Vec<String> = rx.map(text).collect().await;
        assert_eq!(frames, vec![r#"{"error":"Stream Cancelled"}"#]);
    }

    #[tokio::test]
    async fn test_write_failure_is_transport_error() {
        let (mut tx, rx) = mpsc::unbounded::<Message>();
        drop(rx);
        let cancel = CancellationToken::new();

        let mut relay = StreamRelay::new(&mut tx, cancel.clone());
        let err = relay.on_chunk(&StreamChunk::new("He")).await.unwrap_err();
        assert_eq!(err.error_type(), "transport");

        relay.on_cancel_signal();
        assert!(cancel.is_cancelled());

        // No terminal write is attempted on a broken connection
        assert!(relay.finish(&Ok("He".to_string())).await.is_err());
    }

    #[tokio::test]
    async fn test_metrics_count_chunks() {
        let metrics = Metrics::new(&gateway_telemetry::MetricsConfig::default()).unwrap();
        let (mut tx, _rx) = mpsc::unbounded::<Message>();

        let mut relay =
            StreamRelay::new(&mut tx, CancellationToken::new()).with_metrics(metrics.clone());
        relay.on_chunk(&StreamChunk::new("a")).await.unwrap();
        relay.on_chunk(&StreamChunk::new("b")).await.unwrap();

        assert!(metrics.gather().contains("gateway_chunks_streamed_total 2"));
    }
}
