//! Shared application state.

use gateway_config::GatewayConfig;
use gateway_core::{CancellationToken, GatewayError, InferenceBackend};
use gateway_resilience::{
    ConcurrencyGate, RateLimiter, RateLimiterConfig, RetryPolicy, RetryingInferenceClient,
};
use gateway_telemetry::{Metrics, MetricsConfig};
use std::sync::Arc;
use std::time::Instant;

/// State shared by every handler and connection
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<GatewayConfig>,
    /// Process-wide admission counter
    pub rate_limiter: Arc<RateLimiter>,
    /// Process-wide inference permit pool
    pub gate: ConcurrencyGate,
    /// Retrying client over the backend
    pub client: Arc<RetryingInferenceClient>,
    /// Inference backend, also used for readiness probes
    pub backend: Arc<dyn InferenceBackend>,
    /// Metrics registry
    pub metrics: Metrics,
    /// Root cancellation token, cancelled on shutdown
    pub shutdown: CancellationToken,
    /// When the state was built
    pub started_at: Instant,
}

impl AppState {
    /// Create a new state builder
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Seconds since startup
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("backend", &self.backend.id())
            .field("gate", &self.gate)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AppState`]
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<GatewayConfig>,
    backend: Option<Arc<dyn InferenceBackend>>,
    retry_policy: Option<RetryPolicy>,
    metrics: Option<Metrics>,
    shutdown: Option<CancellationToken>,
}

impl AppStateBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the inference backend
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Set the metrics registry
    #[must_use]
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the root cancellation token
    #[must_use]
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the state
    ///
    /// # Errors
    /// Returns a configuration error if no backend was set or metrics cannot be registered
    pub fn build(self) -> Result<AppState, GatewayError> {
        let config = self.config.unwrap_or_default();
        let backend = self
            .backend
            .ok_or_else(|| GatewayError::configuration("An inference backend is required"))?;

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Metrics::new(&MetricsConfig::default())
                .map_err(|e| GatewayError::configuration(e.to_string()))?,
        };

        let rate_limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: config.limits.max_requests,
            period: config.limits.rate_limit_period,
        });
        let gate = ConcurrencyGate::new(config.limits.max_concurrency);

        let client = RetryingInferenceClient::new(
            Arc::clone(&backend),
            self.retry_policy.unwrap_or_else(RetryPolicy::with_defaults),
        )
        .with_metrics(metrics.clone());

        Ok(AppState {
            config: Arc::new(config),
            rate_limiter: Arc::new(rate_limiter),
            gate,
            client: Arc::new(client),
            backend,
            metrics,
            shutdown: self.shutdown.unwrap_or_default(),
            started_at: Instant::now(),
        })
    }
}
