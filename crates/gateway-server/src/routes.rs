//! Route definitions for the gateway.

use axum::{http::Method, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{handlers, state::AppState};

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        // Chat over WebSocket
        .route("/chat", get(handlers::chat))
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // Apply middleware
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin may connect; only simple methods and `Content-Type` are allowed
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use gateway_config::GatewayConfig;
    use gateway_core::{
        ChunkStream, GatewayError, GatewayResult, HealthStatus, InferenceBackend, SamplingParams,
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct StaticBackend(HealthStatus);

    #[async_trait]
    impl InferenceBackend for StaticBackend {
        fn id(&self) -> &str {
            "static"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn stream_generate(
            &self,
            _prompt: &str,
            _params: &SamplingParams,
        ) -> GatewayResult<ChunkStream> {
            Err(GatewayError::provider("static", "unavailable", None, true))
        }

        async fn health_check(&self) -> HealthStatus {
            self.0
        }
    }

    fn create_test_state(health: HealthStatus) -> AppState {
        AppState::builder()
            .config(GatewayConfig::default())
            .backend(Arc::new(StaticBackend(health)))
            .build()
            .unwrap()
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let app = create_router(create_test_state(HealthStatus::Healthy));
        let (status, body) = get(app, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Hello, World!");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(create_test_state(HealthStatus::Unhealthy));
        let (status, body) = get(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_when_backend_healthy() {
        let app = create_router(create_test_state(HealthStatus::Healthy));
        let (status, body) = get(app, "/ready").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["ready"], true);
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["available_permits"], 100);
    }

    #[tokio::test]
    async fn test_not_ready_when_backend_down() {
        let app = create_router(create_test_state(HealthStatus::Unhealthy));
        let (status, body) = get(app, "/ready").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("\"backend_status\":\"unhealthy\""));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = create_test_state(HealthStatus::Healthy);
        state.metrics.record_attempt();
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("gateway_inference_attempts_total 1"));
    }

    #[tokio::test]
    async fn test_chat_requires_upgrade() {
        let app = create_router(create_test_state(HealthStatus::Healthy));
        let (status, _) = get(app, "/chat").await;

        assert!(status.is_client_error());
    }
}
