//! Integration tests for webhook ingestion against PostgreSQL.

mod common;

use axum::http::StatusCode;
use hrsync_api::config::WebhookConfig;
use hrsync_api::routes::webhook::{SIGNATURE_HEADER, sign};
use hrsync_test_support::ScriptedHandler;
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
async fn test_valid_notification_creates_exactly_one_pending_row(pool: PgPool) {
    // Arrange
    let app = common::build_test_app(pool.clone());
    let body = json!({
        "eventType": "employee.updated",
        "eventId": "evt-1",
        "body": { "employeeId": "E-7", "workEmail": "ada@example.com" }
    });

    // Act
    let (status, json) = common::post_json(app, "/webhooks/paycor", &body).await;

    // Assert
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "accepted");
    assert_eq!(json["message"], "Event queued for processing");
    let id = json["eventId"].as_i64().unwrap();

    let (source, event_type, payload, status): (String, String, serde_json::Value, String) =
        sqlx::query_as(
            "SELECT source, event_type, payload, status FROM sync_queue WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(source, "paycor");
    assert_eq!(event_type, "employee.updated");
    assert_eq!(payload, body);
    assert_eq!(status, "Pending");
    assert_eq!(common::queued_rows(&pool).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_empty_event_type_returns_400_and_stores_nothing(pool: PgPool) {
    let app = common::build_test_app(pool.clone());

    let (status, json) =
        common::post_json(app, "/webhooks/paycor", &json!({ "eventType": "" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
    assert_eq!(common::queued_rows(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_malformed_body_returns_400_and_stores_nothing(pool: PgPool) {
    let app = common::build_test_app(pool.clone());

    let (status, _) = common::post_bytes(app, "/webhooks/paycor", b"not json", &[]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::queued_rows(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_repeated_notifications_get_increasing_ids(pool: PgPool) {
    let body = json!({ "eventType": "employee.created" });

    let (_, first) =
        common::post_json(common::build_test_app(pool.clone()), "/webhooks/paycor", &body).await;
    let (_, second) =
        common::post_json(common::build_test_app(pool.clone()), "/webhooks/paycor", &body).await;

    assert!(second["eventId"].as_i64().unwrap() > first["eventId"].as_i64().unwrap());
    assert_eq!(common::queued_rows(&pool).await, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_signed_webhooks_are_verified(pool: PgPool) {
    // Arrange
    let webhook = WebhookConfig {
        signing_secret: Some("whsec".to_owned()),
        ..WebhookConfig::default()
    };
    let body = br#"{"eventType":"employee.updated"}"#;
    let signature = sign("whsec", body);

    // Act
    let (rejected, _) = common::post_bytes(
        common::build_test_app_with(pool.clone(), ScriptedHandler::succeeding(), webhook.clone()),
        "/webhooks/paycor",
        body,
        &[(SIGNATURE_HEADER, "sha256=deadbeef")],
    )
    .await;
    let (accepted, _) = common::post_bytes(
        common::build_test_app_with(pool.clone(), ScriptedHandler::succeeding(), webhook),
        "/webhooks/paycor",
        body,
        &[(SIGNATURE_HEADER, signature.as_str())],
    )
    .await;

    // Assert
    assert_eq!(rejected, StatusCode::UNAUTHORIZED);
    assert_eq!(accepted, StatusCode::ACCEPTED);
    assert_eq!(common::queued_rows(&pool).await, 1);
}
