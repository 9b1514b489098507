//! # LLM Chat Gateway
//!
//! Streaming chat gateway in front of a self-hosted Ollama server.
//!
//! ## Features
//!
//! - WebSocket chat endpoint streaming partial answers as they are generated
//! - Process-wide rate limiting and bounded inference concurrency
//! - Retries with exponential backoff and per-attempt deadlines
//! - Prometheus metrics and structured logging
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration
//! llm-chat-gateway
//!
//! # Start with a config file
//! GATEWAY_CONFIG=/path/to/config.yaml llm-chat-gateway
//!
//! # Start with environment overrides
//! OLLAMA_MODEL=mistral API_PORT=9000 llm-chat-gateway
//! ```

use anyhow::Context;
use gateway_config::{load_config, GatewayConfig};
use gateway_providers::{OllamaBackend, OllamaConfig};
use gateway_resilience::{RetryConfig, RetryPolicy};
use gateway_server::{AppState, Server, ServerConfig};
use gateway_telemetry::{init_logging, Metrics, MetricsConfig};
use std::sync::Arc;
use tracing::{error, info};

/// Application entry point
#[tokio::main]
async fn main() {
    // Configuration decides the log format, so it is loaded before logging
    let config = match load_config().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging.to_logging_config()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting LLM Chat Gateway"
    );

    if let Err(e) = run(config).await {
        error!(error = format!("{e:#}"), "Application failed");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    info!(
        host = %config.server.host,
        port = config.server.port,
        model = %config.backend.model,
        backend_url = %config.backend.base_url,
        max_requests = config.limits.max_requests,
        rate_limit_period_secs = config.limits.rate_limit_period.as_secs(),
        max_concurrency = config.limits.max_concurrency,
        "Configuration loaded"
    );

    let metrics = Metrics::new(&MetricsConfig::default()).context("Failed to create metrics")?;

    let backend = OllamaBackend::new(
        OllamaConfig::new(&config.backend.base_url, &config.backend.model)
            .with_connect_timeout(config.backend.connect_timeout),
    )
    .context("Failed to initialize LLM backend")?;

    let server_config = ServerConfig::new()
        .with_host(&config.server.host)
        .with_port(config.server.port)
        .with_shutdown_timeout(config.server.shutdown_timeout);

    let state = AppState::builder()
        .config(config)
        .backend(Arc::new(backend))
        .retry_policy(RetryPolicy::new(RetryConfig::default()))
        .metrics(metrics)
        .build()
        .context("Failed to build application state")?;

    Server::new(server_config, state)
        .run()
        .await
        .context("Server failed")?;

    Ok(())
}
