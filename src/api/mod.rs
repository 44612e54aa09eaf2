//! HTTP surface of the relay
//!
//! - `POST /api/download` - run a job (bearer token required)
//! - `GET /health`, `GET /ping`, `GET /`, `GET /api` - unauthenticated info

use crate::job::JobOrchestrator;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod routes;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Runs submitted jobs
    pub orchestrator: JobOrchestrator,
    /// Expected bearer token
    pub secret: Arc<str>,
}

impl AppState {
    /// Create handler state
    pub fn new(orchestrator: JobOrchestrator, secret: impl Into<Arc<str>>) -> Self {
        Self {
            orchestrator,
            secret: secret.into(),
        }
    }
}

/// Build the router
pub fn create_router(state: AppState) -> Router {
    let auth = middleware::from_fn_with_state(state.secret.clone(), auth::require_bearer_token);

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/ping", get(routes::ping))
        .route("/api", get(routes::api_info))
        .route(
            "/api/download",
            post(routes::download).route_layer(auth),
        )
        .fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::transfer::MockTransferClient;
    use crate::job::OrchestratorConfig;
    use crate::retrieval::{MockMediaExtractor, MockRetriever, RetrievalRouter};
    use axum::{body::Body, http::Request, http::StatusCode};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "backend-secret";

    fn app() -> Router {
        let mut transfer = MockTransferClient::new();
        transfer.expect_send_status().never();
        let mut direct = MockRetriever::new();
        direct.expect_retrieve().never();
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_extract().never();

        let orchestrator = JobOrchestrator::new(
            Arc::new(transfer),
            RetrievalRouter::new(Arc::new(direct), Arc::new(extractor)),
            OrchestratorConfig {
                backup_chat_id: -1_001,
                probe_metadata: false,
                progress_ttl: Duration::from_secs(60),
            },
        );
        create_router(AppState::new(orchestrator, SECRET))
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.expect("response");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    fn download_request(token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/download")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).expect("request")
    }

    #[tokio::test]
    async fn test_health_and_info_routes() {
        let (status, json) = send(get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["timestamp"].is_i64());

        let (status, json) = send(get_request("/ping")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["pong"].is_i64());

        let (_, json) = send(get_request("/")).await;
        assert_eq!(json["status"], "running");

        let (_, json) = send(get_request("/api")).await;
        assert_eq!(json["endpoints"]["download"], "/api/download (POST)");
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let (status, json) = send(get_request("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json, serde_json::json!({"error": "Not found"}));
    }

    #[tokio::test]
    async fn test_download_requires_token() {
        let body = r#"{"url":"https://example.com/a.mp4","chatId":1,"messageId":2,"userId":3,"timestamp":4}"#;

        let (status, json) = send(download_request(None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["detail"], "Missing Authorization header");

        let (status, _) = send(download_request(Some("wrong"), body)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_download_rejects_malformed_body() {
        let (status, json) = send(download_request(Some(SECRET), r#"{"url":"x"}"#)).await;
        assert!(status.is_client_error());
        assert_eq!(json["error"], "Invalid request");
    }

    #[tokio::test]
    async fn test_download_rejects_invalid_job() {
        let body = r#"{"url":"ftp://example.com/a.mp4","chatId":1,"messageId":2,"userId":3,"timestamp":4}"#;
        let (status, json) = send(download_request(Some(SECRET), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid job");
    }
}
