//! HTTP request handlers for the gateway.

use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::HealthStatus;
use serde::Serialize;
use tracing::debug;

use crate::{session::ConnectionSession, state::AppState};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version
    pub version: String,
    /// Uptime in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Whether queries can be served
    pub ready: bool,
    /// Backend identifier
    pub backend: String,
    /// Model served by the backend
    pub model: String,
    /// Backend health
    pub backend_status: HealthStatus,
    /// Free concurrency permits
    pub available_permits: usize,
}

/// Root endpoint
pub async fn root() -> &'static str {
    "Hello, World!"
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: Some(state.uptime_seconds()),
    })
}

/// Readiness check endpoint; probes the backend
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let backend_status = state.backend.health_check().await;
    let ready = backend_status.is_available() && !state.shutdown.is_cancelled();

    let body = ReadinessResponse {
        ready,
        backend: state.backend.id().to_string(),
        model: state.backend.model().to_string(),
        backend_status,
        available_permits: state.gate.available_permits(),
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(body))
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.gather();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics,
    )
}

/// Chat endpoint: upgrades to a WebSocket and runs a session on it
pub async fn chat(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    debug!("Upgrading chat connection");
    ws.on_upgrade(move |socket| ConnectionSession::new(state).run(socket))
}
