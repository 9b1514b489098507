//! Prometheus metrics for the gateway.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metrics configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Metric namespace prefix
    pub namespace: String,
    /// Buckets for the query duration histogram, in seconds
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "gateway".to_string(),
            duration_buckets: vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0],
        }
    }
}

/// Terminal outcome of a query, used as a label value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Full answer delivered
    Success,
    /// Rejected before admission (blank or malformed)
    Invalid,
    /// Rejected by the rate limiter
    RateLimited,
    /// Cancelled by disconnect, deadline, or shutdown
    Cancelled,
    /// All attempts failed
    Failed,
}

impl QueryOutcome {
    /// Label value
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Invalid => "invalid",
            Self::RateLimited => "rate_limited",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

/// Gateway metrics registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    queries_total: IntCounterVec,
    rate_limited_total: IntCounter,
    inference_attempts_total: IntCounter,
    inference_retries_total: IntCounter,
    chunks_streamed_total: IntCounter,
    active_inferences: IntGauge,
    active_connections: IntGauge,
    query_duration_seconds: Histogram,
}

impl Metrics {
    /// Create and register all metrics
    ///
    /// # Errors
    /// Returns error if a metric cannot be created or registered
    pub fn new(config: &MetricsConfig) -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let ns = config.namespace.as_str();

        let queries_total = IntCounterVec::new(
            Opts::new("queries_total", "Queries by terminal outcome").namespace(ns),
            &["outcome"],
        )?;
        let rate_limited_total = IntCounter::with_opts(
            Opts::new("rate_limited_total", "Queries rejected by the rate limiter").namespace(ns),
        )?;
        let inference_attempts_total = IntCounter::with_opts(
            Opts::new("inference_attempts_total", "Backend inference attempts").namespace(ns),
        )?;
        let inference_retries_total = IntCounter::with_opts(
            Opts::new("inference_retries_total", "Backend inference retries after a failure")
                .namespace(ns),
        )?;
        let chunks_streamed_total = IntCounter::with_opts(
            Opts::new("chunks_streamed_total", "Partial answer chunks sent to clients")
                .namespace(ns),
        )?;
        let active_inferences = IntGauge::with_opts(
            Opts::new("active_inferences", "Inference executions holding a permit").namespace(ns),
        )?;
        let active_connections = IntGauge::with_opts(
            Opts::new("active_connections", "Open chat connections").namespace(ns),
        )?;
        let query_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("query_duration_seconds", "Admitted query latency in seconds")
                .namespace(ns)
                .buckets(config.duration_buckets.clone()),
        )?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(inference_attempts_total.clone()))?;
        registry.register(Box::new(inference_retries_total.clone()))?;
        registry.register(Box::new(chunks_streamed_total.clone()))?;
        registry.register(Box::new(active_inferences.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(query_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            queries_total,
            rate_limited_total,
            inference_attempts_total,
            inference_retries_total,
            chunks_streamed_total,
            active_inferences,
            active_connections,
            query_duration_seconds,
        })
    }

    /// Record the terminal outcome of a query
    pub fn record_query(&self, outcome: QueryOutcome) {
        self.queries_total.with_label_values(&[outcome.as_str()]).inc();
        if outcome == QueryOutcome::RateLimited {
            self.rate_limited_total.inc();
        }
    }

    /// Record how long an admitted query took end to end
    pub fn observe_query_duration(&self, duration: Duration) {
        self.query_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Record one backend attempt
    pub fn record_attempt(&self) {
        self.inference_attempts_total.inc();
    }

    /// Record one retry
    pub fn record_retry(&self) {
        self.inference_retries_total.inc();
    }

    /// Record one chunk forwarded to a client
    pub fn record_chunk(&self) {
        self.chunks_streamed_total.inc();
    }

    /// An inference execution took a permit
    pub fn inference_started(&self) {
        self.active_inferences.inc();
    }

    /// An inference execution released its permit
    pub fn inference_finished(&self) {
        self.active_inferences.dec();
    }

    /// A chat connection opened
    pub fn connection_opened(&self) {
        self.active_connections.inc();
    }

    /// A chat connection closed
    pub fn connection_closed(&self) {
        self.active_connections.dec();
    }

    /// Queries counted for `outcome`
    #[must_use]
    pub fn query_count(&self, outcome: QueryOutcome) -> u64 {
        self.queries_total.with_label_values(&[outcome.as_str()]).get()
    }

    /// Attempts counted so far
    #[must_use]
    pub fn attempt_count(&self) -> u64 {
        self.inference_attempts_total.get()
    }

    /// Retries counted so far
    #[must_use]
    pub fn retry_count(&self) -> u64 {
        self.inference_retries_total.get()
    }

    /// Currently active inferences
    #[must_use]
    pub fn active_inference_count(&self) -> i64 {
        self.active_inferences.get()
    }

    /// Render all metrics in the Prometheus text exposition format
    #[must_use]
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

/// Metrics setup error
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Prometheus rejected a metric definition or registration
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_gather() {
        let metrics = Metrics::new(&MetricsConfig::default()).unwrap();

        metrics.record_query(QueryOutcome::Success);
        metrics.record_query(QueryOutcome::RateLimited);
        metrics.record_attempt();
        metrics.record_attempt();
        metrics.record_retry();
        metrics.record_chunk();
        metrics.observe_query_duration(Duration::from_millis(250));

        assert_eq!(metrics.query_count(QueryOutcome::Success), 1);
        assert_eq!(metrics.query_count(QueryOutcome::RateLimited), 1);
        assert_eq!(metrics.attempt_count(), 2);
        assert_eq!(metrics.retry_count(), 1);

        let text = metrics.gather();
        assert!(text.contains("gateway_queries_total{outcome=\"success\"} 1"));
        assert!(text.contains("gateway_rate_limited_total 1"));
        assert!(text.contains("gateway_chunks_streamed_total 1"));
        assert!(text.contains("gateway_query_duration_seconds_count 1"));
    }

    #[test]
    fn test_gauges() {
        let metrics = Metrics::new(&MetricsConfig::default()).unwrap();

        metrics.inference_started();
        metrics.inference_started();
        metrics.inference_finished();
        assert_eq!(metrics.active_inference_count(), 1);

        metrics.connection_opened();
        metrics.connection_closed();
        assert!(metrics.gather().contains("gateway_active_connections 0"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = Metrics::new(&MetricsConfig::default()).unwrap();
        let b = Metrics::new(&MetricsConfig::default()).unwrap();
        a.record_attempt();
        assert_eq!(a.attempt_count(), 1);
        assert_eq!(b.attempt_count(), 0);
    }
}
