//! Ollama backend implementation.
//!
//! Talks to a self-hosted Ollama server over its native API.
//!
//! # API Format
//! - Generation: `POST {base_url}/api/generate` with `stream: true`, answered
//!   with newline-delimited JSON objects carrying `response` and `done`
//! - Health: `GET {base_url}/api/tags`

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use gateway_core::{
    ChunkStream, GatewayError, GatewayResult, HealthStatus, InferenceBackend, SamplingParams,
    StreamChunk,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

const PROVIDER: &str = "ollama";

/// Ollama backend configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Backend instance ID
    pub id: String,
    /// Server base URL, e.g. `http://ollama:11434`
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Timeout for the health probe
    pub health_timeout: Duration,
}

impl OllamaConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: PROVIDER.to_string(),
            base_url: base_url.into(),
            model: model.into(),
            connect_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_secs(5),
        }
    }

    /// Set the connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the backend instance ID
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Ollama backend
pub struct OllamaBackend {
    config: OllamaConfig,
    client: Client,
    base_url: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be built
    pub fn new(config: OllamaConfig) -> Result<Self, GatewayError> {
        let parsed = url::Url::parse(&config.base_url).map_err(|e| {
            GatewayError::configuration(format!("Invalid Ollama URL '{}': {e}", config.base_url))
        })?;

        // No overall request timeout: generations stream for as long as the
        // caller's deadline allows
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| {
                GatewayError::configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        let base_url = parsed.as_str().trim_end_matches('/').to_string();

        Ok(Self {
            config,
            client,
            base_url,
        })
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }

    fn build_request<'a>(
        &'a self,
        prompt: &'a str,
        params: &SamplingParams,
    ) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: true,
            options: GenerateOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
                top_p: params.top_p,
                frequency_penalty: params.frequency_penalty,
                presence_penalty: params.presence_penalty,
            },
        }
    }

    /// Parse error response
    fn parse_error(status: u16, body: &str) -> GatewayError {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|e| e.error)
            .unwrap_or_else(|_| format!("HTTP {status}: {body}"));

        match status {
            429 | 500..=599 => GatewayError::provider(PROVIDER, message, Some(status), true),
            _ => GatewayError::provider(PROVIDER, message, Some(status), false),
        }
    }

    /// Decode one NDJSON line
    fn parse_line(line: &str) -> GatewayResult<Option<GenerateLine>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let parsed: GenerateLine = serde_json::from_str(line).map_err(|e| {
            GatewayError::provider(PROVIDER, format!("Invalid stream line: {e}"), None, true)
        })?;

        if let Some(message) = parsed.error {
            return Err(GatewayError::provider(PROVIDER, message, None, true));
        }

        Ok(Some(parsed))
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> GatewayResult<ChunkStream> {
        let url = self.generate_url();
        let body = self.build_request(prompt, params);

        debug!(
            provider = PROVIDER,
            model = %self.config.model,
            url = %url,
            "Sending streaming generate request"
        );

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            error!(error = %e, "Ollama streaming request failed");
            GatewayError::provider(PROVIDER, format!("Streaming request failed: {e}"), None, true)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Ollama returned error status");
            return Err(Self::parse_error(status.as_u16(), &body));
        }

        let stream = try_stream! {
            let mut byte_stream = response.bytes_stream();
            // Raw bytes, so a multi-byte character split across reads survives
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = chunk_result.map_err(|e| {
                    GatewayError::provider(PROVIDER, format!("Stream error: {e}"), None, true)
                })?;
                buffer.extend_from_slice(&bytes);

                // Process complete lines
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let Some(parsed) = Self::parse_line(&String::from_utf8_lossy(&line))? else {
                        continue;
                    };

                    trace!(
                        done = parsed.done,
                        len = parsed.response.len(),
                        "Received Ollama line"
                    );

                    if parsed.done {
                        if !parsed.response.is_empty() {
                            yield StreamChunk::last(parsed.response);
                        }
                        return;
                    }
                    if !parsed.response.is_empty() {
                        yield StreamChunk::new(parsed.response);
                    }
                }
            }

            // A final line without a trailing newline
            if let Some(parsed) = Self::parse_line(&String::from_utf8_lossy(&buffer))? {
                if parsed.done {
                    if !parsed.response.is_empty() {
                        yield StreamChunk::last(parsed.response);
                    }
                    return;
                }
                if !parsed.response.is_empty() {
                    yield StreamChunk::new(parsed.response);
                }
            }

            Err::<(), _>(GatewayError::provider(
                PROVIDER,
                "Stream ended before generation completed",
                None,
                true,
            ))?;
        };

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> HealthStatus {
        match self
            .client
            .get(self.tags_url())
            .timeout(self.config.health_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => HealthStatus::Healthy,
            Ok(response) if response.status().as_u16() == 429 => HealthStatus::Degraded,
            Ok(_) | Err(_) => HealthStatus::Unhealthy,
        }
    }
}

impl std::fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("id", &self.config.id)
            .field("model", &self.config.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> OllamaBackend {
        OllamaBackend::new(OllamaConfig::new(server.uri(), "llama3")).unwrap()
    }

    fn ndjson(lines: &[&str]) -> String {
        lines.iter().map(|l| format!("{l}\n")).collect()
    }

    async fn collect(backend: &OllamaBackend) -> GatewayResult<Vec<StreamChunk>> {
        backend
            .stream_generate("Human: hi\nAssistant:", &SamplingParams::default())
            .await?
            .try_collect()
            .await
    }

    #[test]
    fn test_config() {
        let config = OllamaConfig::new("http://localhost:11434", "llama3")
            .with_id("local")
            .with_connect_timeout(Duration::from_secs(3));

        assert_eq!(config.id, "local");
        assert_eq!(config.model, "llama3");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_url() {
        let result = OllamaBackend::new(OllamaConfig::new("not a url", "llama3"));
        assert!(matches!(result, Err(GatewayError::Configuration { .. })));
    }

    #[test]
    fn test_urls_trim_trailing_slash() {
        let backend =
            OllamaBackend::new(OllamaConfig::new("http://ollama:11434/", "llama3")).unwrap();
        assert_eq!(backend.generate_url(), "http://ollama:11434/api/generate");
        assert_eq!(backend.tags_url(), "http://ollama:11434/api/tags");
    }

    #[test]
    fn test_parse_error() {
        let err = OllamaBackend::parse_error(404, r#"{"error":"model 'x' not found"}"#);
        match err {
            GatewayError::Provider { message, status_code, retryable, .. } => {
                assert_eq!(message, "model 'x' not found");
                assert_eq!(status_code, Some(404));
                assert!(!retryable);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = OllamaBackend::parse_error(502, "bad gateway");
        assert!(err.to_string().contains("HTTP 502"));
        assert!(err.is_retryable());
        assert!(OllamaBackend::parse_error(429, "").is_retryable());
    }

    #[tokio::test]
    async fn test_streams_chunks_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3",
                "prompt": "Human: hi\nAssistant:",
                "stream": true,
                "options": { "num_predict": 100 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
                r#"{"model":"llama3","response":"He","done":false}"#,
                r#"{"model":"llama3","response":"llo","done":false}"#,
                r#"{"model":"llama3","response":"","done":true}"#,
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let chunks = collect(&backend(&server)).await.unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["He", "llo"]);
    }

    #[tokio::test]
    async fn test_error_status_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(503).set_body_string(r#"{"error":"model is loading"}"#),
            )
            .mount(&server)
            .await;

        let err = collect(&backend(&server)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("model is loading"));
    }

    #[tokio::test]
    async fn test_in_stream_error_line() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
                r#"{"response":"partial","done":false}"#,
                r#"{"error":"out of memory"}"#,
            ])))
            .mount(&server)
            .await;

        let err = collect(&backend(&server)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("out of memory"));
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
                r#"{"response":"partial","done":false}"#,
            ])))
            .mount(&server)
            .await;

        let err = collect(&backend(&server)).await.unwrap_err();
        assert!(err.to_string().contains("before generation completed"));
    }

    #[tokio::test]
    async fn test_final_line_without_newline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"response\":\"a\",\"done\":false}\n{\"response\":\"b\",\"done\":true}",
            ))
            .mount(&server)
            .await;

        let chunks = collect(&backend(&server)).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].done);
    }

    #[tokio::test]
    async fn test_unterminated_final_line_not_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("{\"response\":\"a\",\"done\":false}"),
            )
            .mount(&server)
            .await;

        let mut stream = backend(&server)
            .stream_generate("Human: hi\nAssistant:", &SamplingParams::default())
            .await
            .unwrap();

        let chunk = stream.try_next().await.unwrap().unwrap();
        assert_eq!(chunk.text, "a");
        assert!(!chunk.done);

        let err = stream.try_next().await.unwrap_err();
        assert!(err.to_string().contains("before generation completed"));
    }

    #[tokio::test]
    async fn test_health_check_degraded_when_busy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let status = backend(&server).health_check().await;
        assert_eq!(status, HealthStatus::Degraded);
        assert!(status.is_available());
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let backend =
            OllamaBackend::new(OllamaConfig::new("http://127.0.0.1:9", "llama3")).unwrap();
        let err = collect(&backend).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"models":[]}"#))
            .mount(&server)
            .await;

        assert_eq!(backend(&server).health_check().await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_health_check_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert_eq!(backend(&server).health_check().await, HealthStatus::Unhealthy);
    }
}
