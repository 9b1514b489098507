//! Inference backend abstraction.

use crate::error::GatewayResult;
use crate::streaming::StreamChunk;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Stream of chunks for one execution. Dropping it stops generation.
pub type ChunkStream = BoxStream<'static, GatewayResult<StreamChunk>>;

/// Sampling parameters passed to the backend.
///
/// These are fixed for every query; [`SamplingParams::default`] holds the
/// values the gateway always sends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Nucleus sampling probability mass
    pub top_p: f32,
    /// Frequency penalty
    pub frequency_penalty: f32,
    /// Presence penalty
    pub presence_penalty: f32,
}

impl SamplingParams {
    /// Temperature sent with every query
    pub const TEMPERATURE: f32 = 0.8;
    /// Token limit sent with every query
    pub const MAX_TOKENS: u32 = 100;
    /// Top-p sent with every query
    pub const TOP_P: f32 = 0.9;
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: Self::TEMPERATURE,
            max_tokens: Self::MAX_TOKENS,
            top_p: Self::TOP_P,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Backend health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Backend is reachable and serving
    Healthy,
    /// Backend is reachable but throttling
    Degraded,
    /// Backend is unreachable or failing
    Unhealthy,
}

impl HealthStatus {
    /// Whether queries can be served
    #[must_use]
    pub fn is_available(self) -> bool {
        !matches!(self, Self::Unhealthy)
    }
}

/// A text-generation backend.
///
/// Implementations start one generation per call and return its chunks as
/// a stream. They do not retry; that is the caller's job.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Backend identifier used in logs and errors
    fn id(&self) -> &str;

    /// Model served by this backend
    fn model(&self) -> &str;

    /// Start a streaming generation for `prompt`
    async fn stream_generate(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> GatewayResult<ChunkStream>;

    /// Check backend reachability
    async fn health_check(&self) -> HealthStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sampling_params() {
        let params = SamplingParams::default();
        assert!((params.temperature - 0.8).abs() < f32::EPSILON);
        assert_eq!(params.max_tokens, 100);
        assert!((params.top_p - 0.9).abs() < f32::EPSILON);
        assert!(params.frequency_penalty.abs() < f32::EPSILON);
        assert!(params.presence_penalty.abs() < f32::EPSILON);
    }

    #[test]
    fn test_health_availability() {
        assert!(HealthStatus::Healthy.is_available());
        assert!(HealthStatus::Degraded.is_available());
        assert!(!HealthStatus::Unhealthy.is_available());
    }
}
