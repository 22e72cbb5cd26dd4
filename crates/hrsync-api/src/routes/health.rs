//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'static str>,
    /// Which dependency failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthResponse {
    fn unhealthy(message: String) -> (StatusCode, Json<Self>) {
        warn!(%message, "health check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Self {
                status: "unhealthy",
                version: None,
                message: Some(message),
            }),
        )
    }
}

/// GET /health
///
/// Healthy only when both the queue store and the downstream asset API
/// answer. Has no side effects.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if let Err(e) = state.queue.ping().await {
        return HealthResponse::unhealthy(format!("database unavailable: {e}"));
    }
    if let Err(e) = state.handler.check_connection().await {
        return HealthResponse::unhealthy(format!("asset API unavailable: {e}"));
    }

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            version: Some(env!("CARGO_PKG_VERSION")),
            message: None,
        }),
    )
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
