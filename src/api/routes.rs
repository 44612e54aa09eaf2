//! HTTP handlers.

use super::AppState;
use crate::config::{SERVICE_NAME, SERVICE_VERSION};
use crate::error::RelayError;
use crate::job::Job;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::error;

/// JSON error body `{error, detail}`
pub fn error_response(status: StatusCode, error: &str, detail: &str) -> Response {
    (status, Json(json!({ "error": error, "detail": detail }))).into_response()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": now(),
        "version": SERVICE_VERSION,
    }))
}

/// `GET /ping`
pub async fn ping() -> Json<Value> {
    Json(json!({ "pong": now() }))
}

/// `GET /`
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "status": "running",
    }))
}

/// `GET /api`
pub async fn api_info() -> Json<Value> {
    Json(json!({
        "name": "Telegram Downloader API",
        "version": SERVICE_VERSION,
        "endpoints": {
            "download": "/api/download (POST)",
            "health": "/health (GET)",
            "ping": "/ping (GET)",
        },
    }))
}

/// `POST /api/download`
///
/// The job runs in its own task: a client hanging up does not cut the job
/// short or skip its cleanup.
pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<Job>, JsonRejection>,
) -> Response {
    let job = match payload {
        Ok(Json(job)) => job,
        Err(rejection) => {
            return error_response(rejection.status(), "Invalid request", &rejection.body_text());
        }
    };

    let orchestrator = state.orchestrator.clone();
    match tokio::spawn(async move { orchestrator.run(job).await }).await {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(Err(e)) => job_error_response(&e),
        Err(e) => {
            error!(error = %e, "Job task panicked");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &e.to_string(),
            )
        }
    }
}

fn job_error_response(e: &RelayError) -> Response {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let label = match e {
        RelayError::Validation(_) => "Invalid job",
        _ => "Download failed",
    };
    error_response(status, label, &e.to_string())
}

/// Fallback for unknown routes
pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}
