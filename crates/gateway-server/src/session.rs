//! Per-connection chat session.
//!
//! A session reads queries from one client and answers them strictly one at
//! a time. A separate reader task forwards inbound frames over a channel so
//! that a peer close is seen, and the running query cancelled, while the
//! session is busy streaming. Frames that arrive mid-query wait in the
//! channel.

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use gateway_core::{
    CancellationToken, ChatRequest, ChatResponse, GatewayError, GatewayResult, Query,
    RequestContext, RequestId,
};
use gateway_resilience::ConcurrencyPermit;
use gateway_telemetry::{Metrics, QueryOutcome};
use std::fmt::Display;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::relay::StreamRelay;
use crate::state::AppState;

/// One client connection
pub struct ConnectionSession {
    state: AppState,
    id: RequestId,
    cancel: CancellationToken,
}

impl ConnectionSession {
    /// Create a session whose cancellation descends from the shutdown token
    #[must_use]
    pub fn new(state: AppState) -> Self {
        let cancel = state.shutdown.child_token();
        Self {
            state,
            id: RequestId::generate(),
            cancel,
        }
    }

    /// Connection ID used in logs
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Serve an upgraded WebSocket until either side closes
    pub async fn run(self, socket: WebSocket) {
        let (writer, reader) = socket.split();
        self.serve(writer, reader).await;
    }

    /// Serve a connection given as separate writer and reader halves
    pub async fn serve<W, R, E>(self, mut writer: W, reader: R)
    where
        W: Sink<Message> + Unpin + Send,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let span = info_span!("connection", connection_id = %self.id);
        let metrics = self.state.metrics.clone();

        async {
            metrics.connection_opened();
            info!("Chat connection opened");

            let (tx, mut rx) = mpsc::unbounded_channel();
            let reader_task = tokio::spawn(
                read_frames(reader, tx, self.cancel.clone()).in_current_span(),
            );

            loop {
                let frame = tokio::select! {
                    () = self.cancel.cancelled() => break,
                    frame = rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                if let Err(e) = self.handle_frame(&mut writer, frame).await {
                    debug!(error = %e, "Ending session after transport failure");
                    break;
                }
            }

            if self.state.shutdown.is_cancelled() {
                // Best effort; the peer may already be gone
                let _ = writer.send(Message::Close(None)).await;
            }

            self.cancel.cancel();
            reader_task.abort();
            metrics.connection_closed();
            info!("Chat connection closed");
        }
        .instrument(span)
        .await;
    }

    /// Handle one inbound text frame. Only transport failures are returned.
    async fn handle_frame<W>(&self, writer: &mut W, frame: String) -> GatewayResult<()>
    where
        W: Sink<Message> + Unpin + Send,
        W::Error: Display,
    {
        let metrics = &self.state.metrics;

        let request = match ChatRequest::from_json(&frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Error decoding message");
                metrics.record_query(QueryOutcome::Invalid);
                return send(writer, &ChatResponse::from_error(&e)).await;
            }
        };

        let query = match Query::try_from(request) {
            Ok(query) => query,
            Err(e) => {
                warn!("Received empty query");
                metrics.record_query(QueryOutcome::Invalid);
                return send(writer, &ChatResponse::from_error(&e)).await;
            }
        };

        if !self.state.rate_limiter.allow() {
            warn!("Rate limit exceeded");
            metrics.record_query(QueryOutcome::RateLimited);
            return send(writer, &ChatResponse::from_error(&GatewayError::RateLimited)).await;
        }

        let ctx = RequestContext::with_token(self.cancel.child_token())
            .with_shutdown(self.state.shutdown.clone());
        let span = info_span!("query", request_id = %ctx.id);
        self.process_query(writer, ctx, query).instrument(span).await
    }

    async fn process_query<W>(
        &self,
        writer: &mut W,
        mut ctx: RequestContext,
        query: Query,
    ) -> GatewayResult<()>
    where
        W: Sink<Message> + Unpin + Send,
        W::Error: Display,
    {
        let metrics = &self.state.metrics;
        let started = Instant::now();
        info!(query_len = query.as_str().len(), "Query admitted");

        let permit = tokio::select! {
            () = ctx.cancel.cancelled() => {
                let err = ctx.cancelled_error();
                debug!(error = %err, "Cancelled while waiting for a concurrency permit");
                metrics.record_query(QueryOutcome::Cancelled);
                // Best effort; the peer may already be gone
                let _ = send(writer, &ChatResponse::from_error(&err)).await;
                return Ok(());
            }
            permit = self.state.gate.acquire() => permit,
        };
        let permit = match permit {
            Ok(permit) => permit,
            Err(e) => {
                metrics.record_query(QueryOutcome::Failed);
                return send(writer, &ChatResponse::from_error(&e)).await;
            }
        };
        let _in_flight = InFlight::start(permit, metrics.clone());

        let mut relay = StreamRelay::new(writer, ctx.cancel.clone()).with_metrics(metrics.clone());
        let outcome = self.state.client.execute(&mut ctx, &query, &mut relay).await;

        metrics.record_query(match &outcome {
            Ok(_) => QueryOutcome::Success,
            Err(e) if e.is_cancellation() => QueryOutcome::Cancelled,
            Err(_) => QueryOutcome::Failed,
        });
        metrics.observe_query_duration(started.elapsed());

        match &outcome {
            Ok(answer) => info!(
                answer_len = answer.len(),
                elapsed_ms = started.elapsed().as_millis(),
                "Query answered"
            ),
            Err(e) => warn!(
                error = %e,
                elapsed_ms = started.elapsed().as_millis(),
                "Query failed"
            ),
        }

        relay.finish(&outcome).await
    }
}

/// Holds a concurrency permit for the duration of one inference
struct InFlight {
    _permit: ConcurrencyPermit,
    metrics: Metrics,
}

impl InFlight {
    fn start(permit: ConcurrencyPermit, metrics: Metrics) -> Self {
        metrics.inference_started();
        Self {
            _permit: permit,
            metrics,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.metrics.inference_finished();
    }
}

async fn send<W>(writer: &mut W, response: &ChatResponse) -> GatewayResult<()>
where
    W: Sink<Message> + Unpin + Send,
    W::Error: Display,
{
    let frame = response.to_json()?;
    writer
        .send(Message::Text(frame))
        .await
        .map_err(|e| GatewayError::transport(format!("Write failed: {e}")))
}

/// Forward text frames to the session until the peer goes away, then cancel
/// the connection
async fn read_frames<R, E>(
    mut reader: R,
    tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = reader.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(_)) => {
                debug!("WebSocket closed by client");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                debug!(error = %e, "Error reading message");
                break;
            }
        };

        if tx.send(text).is_err() {
            return;
        }
    }

    cancel.cancel();
}
