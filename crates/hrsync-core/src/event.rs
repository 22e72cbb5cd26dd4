//! Queued sync event model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the stored `error_detail`, in characters.
pub const MAX_ERROR_DETAIL_CHARS: usize = 500;

/// Server-assigned, monotonically increasing event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    /// Waiting to be claimed by the processing loop.
    Pending,
    /// Claimed by a consumer; the handler is running or the consumer died.
    Processing,
    /// Synchronized downstream.
    Success,
    /// The last attempt failed.
    Failed,
}

impl EventStatus {
    /// The exact string stored in the `status` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored status string is not one of the four known states.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown event status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for EventStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Processing" => Ok(Self::Processing),
            "Success" => Ok(Self::Success),
            "Failed" => Ok(Self::Failed),
            other => Err(ParseStatusError(other.to_owned())),
        }
    }
}

/// An event as accepted by the ingestion adapter, before the store assigns
/// an id.
#[derive(Debug, Clone)]
pub struct NewSyncEvent {
    /// Webhook source the notification arrived on.
    pub source: String,
    /// Opaque classifier taken from the notification.
    pub event_type: String,
    /// The notification body, stored verbatim.
    pub payload: serde_json::Value,
    /// Receipt time; becomes both `created_at` and `updated_at`.
    pub received_at: DateTime<Utc>,
}

/// Stored representation of a queued event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncEvent {
    /// Unique, never reused identifier.
    pub id: EventId,
    /// Webhook source the notification arrived on.
    pub source: String,
    /// Opaque classifier.
    pub event_type: String,
    /// Schema-less payload document.
    pub payload: serde_json::Value,
    /// Current lifecycle state.
    pub status: EventStatus,
    /// Set once at insert.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every transition.
    pub updated_at: DateTime<Utc>,
    /// Number of failed attempts so far.
    pub retry_count: i32,
    /// Last failure message, at most [`MAX_ERROR_DETAIL_CHARS`] characters.
    pub error_detail: String,
    /// Downstream identifier, set on success.
    pub external_object_id: Option<String>,
    /// When a failed event becomes eligible for requeue, if ever.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// Truncates a failure message to [`MAX_ERROR_DETAIL_CHARS`] characters.
///
/// Truncation happens on a character boundary; shorter messages are returned
/// unchanged.
#[must_use]
pub fn truncate_error_detail(detail: &str) -> String {
    match detail.char_indices().nth(MAX_ERROR_DETAIL_CHARS) {
        Some((byte_idx, _)) => detail[..byte_idx].to_owned(),
        None => detail.to_owned(),
    }
}
