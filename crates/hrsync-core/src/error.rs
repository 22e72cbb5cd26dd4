//! Queue error types.

use thiserror::Error;

use crate::event::EventId;

/// Errors raised by the ingestion adapter and the event store.
///
/// Downstream synchronization failures are not part of this type; they are
/// reported as [`crate::handler::HandlerError`] and recorded on the event.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The inbound notification is malformed or incomplete. Never persisted.
    #[error("validation error: {0}")]
    Validation(String),

    /// The store is unreachable or a read/write failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A status update referenced an event id that does not exist.
    #[error("event not found: {0}")]
    NotFound(EventId),

    /// An outcome was recorded for an event that is no longer `Processing`,
    /// so the caller's claim was reclaimed or resolved elsewhere.
    #[error("event {0} is no longer claimed")]
    ClaimLost(EventId),
}
