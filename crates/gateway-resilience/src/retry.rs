//! Retrying inference client with exponential backoff.
//!
//! Wraps one backend generation per attempt with a deadline, forwards every
//! chunk to a [`ChunkSink`] as it arrives, and retries failed attempts after
//! a doubling delay. Cancellation (client gone, deadline hit, shutdown) ends
//! the query immediately and is never retried.

use futures::StreamExt;
use gateway_core::{
    CancelReason, ChunkSink, GatewayError, GatewayResult, InferenceBackend, Query,
    RequestContext, SamplingParams,
};
use gateway_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Deadline for a single attempt
    pub attempt_timeout: Duration,
}

impl RetryConfig {
    /// Retries after the first attempt
    pub const MAX_RETRIES: u32 = 3;
    /// First backoff delay
    pub const BASE_DELAY: Duration = Duration::from_secs(2);
    /// Per-attempt deadline
    pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(90);
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: Self::MAX_RETRIES,
            base_delay: Self::BASE_DELAY,
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            attempt_timeout: Self::ATTEMPT_TIMEOUT,
        }
    }
}

/// Backoff schedule
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Delay to sleep after the failed attempt with index `attempt` (0-indexed)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_millis() as f64;
        let delay = base * self.config.multiplier.powi(attempt as i32);
        let delay = delay.min(self.config.max_delay.as_millis() as f64);
        Duration::from_millis(delay.max(0.0) as u64)
    }

    /// Total attempts allowed, including the first
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries + 1
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

/// Builder for retry policy
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    config: RetryConfig,
}

impl RetryPolicyBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max retries
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    /// Set base delay
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Set max delay
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.config.multiplier = multiplier;
        self
    }

    /// Set the per-attempt deadline
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = timeout;
        self
    }

    /// Build the policy
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy::new(self.config)
    }
}

/// Inference client that retries failed generations
#[derive(Clone)]
pub struct RetryingInferenceClient {
    backend: Arc<dyn InferenceBackend>,
    policy: RetryPolicy,
    params: SamplingParams,
    metrics: Option<Metrics>,
}

impl RetryingInferenceClient {
    /// Create a client over `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn InferenceBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            params: SamplingParams::default(),
            metrics: None,
        }
    }

    /// Record attempts and retries into `metrics`
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The backend being wrapped
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    /// The retry policy
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `query` to completion, streaming chunks into `sink`.
    ///
    /// Returns the aggregated answer of the first successful attempt.
    ///
    /// # Errors
    /// - `Cancelled` if the context is cancelled, the sink fails, or an attempt hits its deadline
    /// - `RetriesExhausted` if every attempt failed
    pub async fn execute(
        &self,
        ctx: &mut RequestContext,
        query: &Query,
        sink: &mut dyn ChunkSink,
    ) -> GatewayResult<String> {
        let prompt = query.to_prompt();
        let max_retries = self.policy.config().max_retries;
        let mut last_error: Option<GatewayError> = None;

        for attempt in 0..=max_retries {
            let deadline = ctx.start_attempt(self.policy.config().attempt_timeout);
            if let Some(metrics) = &self.metrics {
                metrics.record_attempt();
            }

            match self.run_attempt(ctx, &prompt, sink, deadline).await {
                Ok(answer) => {
                    info!(
                        request_id = %ctx.id,
                        attempt = attempt + 1,
                        answer_len = answer.len(),
                        "LLM request successful"
                    );
                    return Ok(answer);
                }
                Err(error) if error.is_cancellation() => {
                    warn!(
                        request_id = %ctx.id,
                        attempt = attempt + 1,
                        error = %error,
                        "LLM request cancelled"
                    );
                    return Err(error);
                }
                Err(error) => {
                    warn!(
                        request_id = %ctx.id,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts(),
                        retryable = error.is_retryable(),
                        error = %error,
                        "LLM request failed"
                    );

                    if attempt < max_retries {
                        let delay = self.policy.delay_for_attempt(attempt);
                        debug!(
                            request_id = %ctx.id,
                            delay_ms = delay.as_millis(),
                            "Backing off before retry"
                        );
                        if let Some(metrics) = &self.metrics {
                            metrics.record_retry();
                        }

                        tokio::select! {
                            () = ctx.cancel.cancelled() => {
                                return Err(ctx.cancelled_error());
                            }
                            () = sleep(delay) => {}
                        }
                    }

                    last_error = Some(error);
                }
            }
        }

        warn!(
            request_id = %ctx.id,
            retries = max_retries,
            "LLM request failed after all retries"
        );

        Err(GatewayError::retries_exhausted(
            max_retries,
            last_error.unwrap_or_else(|| GatewayError::internal("Retry exhausted without error")),
        ))
    }

    async fn run_attempt(
        &self,
        ctx: &RequestContext,
        prompt: &str,
        sink: &mut dyn ChunkSink,
        deadline: Instant,
    ) -> GatewayResult<String> {
        let generation = async {
            let mut stream = self.backend.stream_generate(prompt, &self.params).await?;
            let mut answer = String::new();

            while let Some(item) = stream.next().await {
                let chunk = item?;
                if let Err(error) = sink.on_chunk(&chunk).await {
                    debug!(request_id = %ctx.id, error = %error, "Chunk sink failed");
                    sink.on_cancel_signal();
                    return Err(GatewayError::cancelled(CancelReason::ClientDisconnected));
                }
                answer.push_str(&chunk.text);
            }

            Ok(answer)
        };

        // Dropping `generation` drops the backend stream, which stops the backend
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => Err(ctx.cancelled_error()),
            () = sleep_until(deadline) => {
                Err(GatewayError::deadline_exceeded())
            }
            result = generation => result,
        }
    }
}

impl std::fmt::Debug for RetryingInferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingInferenceClient")
            .field("backend", &self.backend.id())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
