//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hrsync_core::clock::Clock;
use hrsync_event_store::pg_event_queue::PgEventQueue;
use hrsync_test_support::{FixedClock, ScriptedHandler};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use hrsync_api::build_router;
use hrsync_api::config::WebhookConfig;
use hrsync_api::state::AppState;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Build the full app router with a real `PgEventQueue`, a succeeding
/// handler and a fixed clock.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with(pool, ScriptedHandler::succeeding(), WebhookConfig::default())
}

/// Build the full app router with a custom handler and webhook settings.
pub fn build_test_app_with(
    pool: PgPool,
    handler: ScriptedHandler,
    webhook: WebhookConfig,
) -> Router {
    let queue = Arc::new(PgEventQueue::new(pool));
    let app_state = AppState::new(queue, Arc::new(handler), fixed_clock(), webhook);
    build_router(app_state)
}

/// Send a POST request with a raw body and extra headers, returning the
/// response.
pub async fn post_bytes(
    app: Router,
    uri: &str,
    body: &[u8],
    headers: &[(&str, &str)],
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body.to_vec())).unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post_bytes(app, uri, &serde_json::to_vec(body).unwrap(), &[]).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Count rows in the queue table.
pub async fn queued_rows(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
        .fetch_one(pool)
        .await
        .unwrap()
}
