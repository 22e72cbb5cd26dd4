//! Ingestion adapter.
//!
//! Validates an inbound notification just enough to classify it, then
//! enqueues it. Ingestion never waits on processing: the caller is answered
//! as soon as the event is durable.

use hrsync_core::clock::Clock;
use hrsync_core::error::QueueError;
use hrsync_core::event::{NewSyncEvent, SyncEvent};
use hrsync_core::queue::EventQueue;
use serde_json::Value;
use tracing::{info, instrument, warn};

/// Field carrying the event classifier in every notification.
const EVENT_TYPE_FIELD: &str = "eventType";

/// A decoded inbound notification with a validated classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    event_type: String,
    body: Value,
}

impl Notification {
    /// Decode a raw request body.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Validation` if the body is not a JSON object or
    /// lacks a non-empty `eventType` string.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, QueueError> {
        let body: Value = serde_json::from_slice(bytes)
            .map_err(|e| QueueError::Validation(format!("invalid request payload: {e}")))?;
        Self::from_value(body)
    }

    /// Validate an already decoded body.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Validation` if the body is not a JSON object or
    /// lacks a non-empty `eventType` string.
    pub fn from_value(body: Value) -> Result<Self, QueueError> {
        let Some(fields) = body.as_object() else {
            return Err(QueueError::Validation(
                "notification must be a JSON object".into(),
            ));
        };

        let event_type = fields
            .get(EVENT_TYPE_FIELD)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| QueueError::Validation("missing event type".into()))?
            .to_owned();

        Ok(Self { event_type, body })
    }

    /// The notification's classifier.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The full notification body.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }
}

/// Enqueue a notification received on `source` as a `Pending` event.
///
/// The whole body is stored verbatim as the payload.
///
/// # Errors
///
/// Returns `QueueError::Persistence` if the insert fails. The notification is
/// not buffered anywhere else and is lost.
#[instrument(skip(notification, clock, queue), fields(event_type = %notification.event_type))]
pub async fn ingest(
    source: &str,
    notification: Notification,
    clock: &dyn Clock,
    queue: &dyn EventQueue,
) -> Result<SyncEvent, QueueError> {
    let new_event = NewSyncEvent {
        source: source.to_owned(),
        event_type: notification.event_type,
        payload: notification.body,
        received_at: clock.now(),
    };

    match queue.insert(new_event).await {
        Ok(stored) => {
            info!(event_id = %stored.id, "webhook event queued");
            Ok(stored)
        }
        Err(err) => {
            warn!(error = %err, "failed to queue webhook event");
            Err(err)
        }
    }
}
