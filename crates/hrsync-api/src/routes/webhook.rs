//! Webhook ingestion endpoint.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use hrsync_core::error::QueueError;
use hrsync_core::event::EventId;
use hrsync_sync::ingestion::{Notification, ingest};
use serde::Serialize;
use sha2::Sha256;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Response for an accepted notification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub event_id: EventId,
}

/// Verify `signature` (raw hex or `sha256=<hex>`) against `body`.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` if the signature is not valid hex or does
/// not match.
pub fn verify_signature(secret: &str, signature: &str, body: &[u8]) -> Result<(), ApiError> {
    let signature = signature.trim();
    let hex_digest = signature.strip_prefix("sha256=").unwrap_or(signature);
    let provided = hex::decode(hex_digest).map_err(|_| ApiError::Unauthorized)?;

    // `verify_slice` compares in constant time.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ApiError::Unauthorized)?;
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| ApiError::Unauthorized)
}

/// Compute the `sha256=<hex>` signature header value for `body`.
#[must_use]
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC key of any length is valid"));
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn check_signature(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    let Some(secret) = &state.webhook.signing_secret else {
        return Ok(());
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    verify_signature(secret, signature, body)
}

/// POST /webhooks/{source}
///
/// Enqueues the notification and answers 202 without waiting for it to be
/// processed. Nothing is stored when the request is rejected.
#[instrument(skip_all, fields(source = %source, request_id = %Uuid::now_v7()))]
async fn receive_webhook(
    State(state): State<AppState>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge {
                limit: state.webhook.max_body_bytes,
            }
        } else {
            ApiError::from(QueueError::Validation(rejection.body_text()))
        }
    })?;

    if let Err(err) = check_signature(&state, &headers, &body) {
        warn!("webhook rejected: bad signature");
        return Err(err);
    }

    let notification = Notification::from_slice(&body).inspect_err(|e| {
        warn!(error = %e, "webhook rejected");
    })?;

    let stored = ingest(
        &source,
        notification,
        state.clock.as_ref(),
        state.queue.as_ref(),
    )
    .await?;

    if let Some(waker) = &state.waker {
        waker.wake();
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted",
            message: "Event queued for processing",
            event_id: stored.id,
        }),
    ))
}

/// Returns the webhook router. Bodies above `max_body_bytes` are refused.
pub fn router(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/webhooks/{source}", post(receive_webhook))
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use hrsync_core::event::EventStatus;
    use hrsync_core::queue::EventQueue;
    use hrsync_test_support::{
        FailingEventQueue, FixedClock, InMemoryEventQueue, ScriptedHandler,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::WebhookConfig;

    fn app(queue: Arc<dyn EventQueue>, webhook: WebhookConfig) -> Router {
        let limit = webhook.max_body_bytes;
        let state = AppState::new(
            queue,
            Arc::new(ScriptedHandler::succeeding()),
            Arc::new(FixedClock(Utc::now())),
            webhook,
        );
        router(limit).with_state(state)
    }

    async fn post_raw(
        app: Router,
        body: &[u8],
        signature: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/paycor")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        let request = builder.body(Body::from(body.to_vec())).unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_sign_then_verify_accepts_both_formats() {
        let body = br#"{"eventType":"employee.updated"}"#;
        let signature = sign("whsec", body);

        assert!(verify_signature("whsec", &signature, body).is_ok());
        assert!(verify_signature("whsec", signature.trim_start_matches("sha256="), body).is_ok());
    }

    #[test]
    fn test_verify_rejects_wrong_secret_and_garbage() {
        let body = b"{}";
        let signature = sign("whsec", body);

        assert!(verify_signature("other", &signature, body).is_err());
        assert!(verify_signature("whsec", "sha256=not-hex", body).is_err());
    }

    #[tokio::test]
    async fn test_accepts_valid_notification() {
        // Arrange
        let queue = Arc::new(InMemoryEventQueue::new());
        let app = app(queue.clone(), WebhookConfig::default());

        // Act
        let (status, json) =
            post_raw(app, br#"{"eventType":"employee.updated","eventId":"e-1"}"#, None).await;

        // Assert
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "accepted");
        assert_eq!(json["message"], "Event queued for processing");
        assert_eq!(json["eventId"], 1);
        let stored = queue.snapshot();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].source, "paycor");
        assert_eq!(stored[0].status, EventStatus::Pending);
    }

    #[tokio::test]
    async fn test_rejects_empty_event_type_without_inserting() {
        let queue = Arc::new(InMemoryEventQueue::new());
        let app = app(queue.clone(), WebhookConfig::default());

        let (status, json) = post_raw(app, br#"{"eventType":""}"#, None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "validation_error");
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_malformed_json() {
        let queue = Arc::new(InMemoryEventQueue::new());
        let app = app(queue.clone(), WebhookConfig::default());

        let (status, _) = post_raw(app, b"{not json", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_returns_500() {
        let app = app(Arc::new(FailingEventQueue), WebhookConfig::default());

        let (status, json) = post_raw(app, br#"{"eventType":"employee.updated"}"#, None).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "persistence_error");
    }

    #[tokio::test]
    async fn test_oversized_body_returns_413() {
        let queue = Arc::new(InMemoryEventQueue::new());
        let webhook = WebhookConfig {
            max_body_bytes: 16,
            ..WebhookConfig::default()
        };
        let app = app(queue.clone(), webhook);

        let (status, json) = post_raw(
            app,
            br#"{"eventType":"employee.updated","padding":"xxxxxxxxxxxxxxxx"}"#,
            None,
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error"], "payload_too_large");
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_signature_required_when_secret_configured() {
        // Arrange
        let queue = Arc::new(InMemoryEventQueue::new());
        let webhook = WebhookConfig {
            signing_secret: Some("whsec".to_owned()),
            ..WebhookConfig::default()
        };
        let body = br#"{"eventType":"employee.updated"}"#;

        // Act
        let (missing, _) = post_raw(app(queue.clone(), webhook.clone()), body, None).await;
        let (wrong, json) =
            post_raw(app(queue.clone(), webhook.clone()), body, Some("sha256=00")).await;
        let (valid, _) = post_raw(
            app(queue.clone(), webhook),
            body,
            Some(&sign("whsec", body)),
        )
        .await;

        // Assert
        assert_eq!(missing, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "unauthorized");
        assert_eq!(valid, StatusCode::ACCEPTED);
        assert_eq!(queue.snapshot().len(), 1);
    }
}
