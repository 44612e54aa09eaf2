//! Bearer token authentication for `/api/*` routes.
//!
//! Missing `Authorization` header answers 401, a wrong token answers 403.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use super::routes::error_response;

/// Middleware comparing the bearer token with the configured secret
///
/// # Examples
///
/// ```no_run
/// use axum::{middleware, routing::post, Router};
/// use oxide_relay::api::auth::require_bearer_token;
/// use std::sync::Arc;
///
/// let secret: Arc<str> = Arc::from("backend-secret");
/// let router: Router = Router::new().route(
///     "/api/download",
///     post(|| async { "ok" })
///         .route_layer(middleware::from_fn_with_state(secret, require_bearer_token)),
/// );
/// ```
pub async fn require_bearer_token(
    State(secret): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let Some(header) = header else {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            "Missing Authorization header",
        );
    };

    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    if constant_time_eq(token.as_bytes(), secret.as_bytes()) {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Rejected request with invalid token");
    error_response(StatusCode::FORBIDDEN, "Forbidden", "Invalid token")
}

/// Compares all bytes regardless of where the first mismatch is
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
