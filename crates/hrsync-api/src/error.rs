//! HR Sync: API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hrsync_core::error::QueueError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    /// Tracing or OpenTelemetry setup failed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// The asset API client could not be built.
    #[error("asset client error: {0}")]
    Assets(#[from] hrsync_assets::AssetError),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer error that implements `IntoResponse`.
#[derive(Debug)]
pub enum ApiError {
    /// A queue or ingestion error.
    Queue(QueueError),
    /// Missing or invalid webhook signature.
    Unauthorized,
    /// The request body exceeded the configured limit.
    PayloadTooLarge { limit: usize },
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self::Queue(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::Queue(err @ QueueError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error", err.to_string())
            }
            Self::Queue(err @ QueueError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found", err.to_string())
            }
            Self::Queue(err @ QueueError::ClaimLost(_)) => {
                (StatusCode::CONFLICT, "conflict", err.to_string())
            }
            // Store details stay in the logs.
            Self::Queue(QueueError::Persistence(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "persistence_error",
                "failed to queue event for processing".to_owned(),
            ),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "missing or invalid webhook signature".to_owned(),
            ),
            Self::PayloadTooLarge { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                format!("request body exceeds {limit} bytes"),
            ),
        };

        (status, Json(ErrorBody { error, message })).into_response()
    }
}
