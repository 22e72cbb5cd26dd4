//! Synchronization handler contract.
//!
//! The handler performs the actual downstream work for one event. It is
//! supplied by the integration layer and must be idempotent: an event left in
//! `Processing` by a crashed consumer is reclaimed and handed over again.

use async_trait::async_trait;
use thiserror::Error;

use crate::event::SyncEvent;

/// Successful synchronization of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Identifier of the object created or updated downstream.
    pub external_object_id: String,
}

impl SyncOutcome {
    /// Creates an outcome for the given downstream object.
    #[must_use]
    pub fn new(external_object_id: impl Into<String>) -> Self {
        Self {
            external_object_id: external_object_id.into(),
        }
    }
}

/// Downstream synchronization failed for one event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    /// Human-readable failure message, recorded on the event.
    pub message: String,
}

impl HandlerError {
    /// Creates a handler error from any message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Performs downstream synchronization for queued events.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    /// Synchronize one event.
    async fn handle(&self, event: &SyncEvent) -> Result<SyncOutcome, HandlerError>;

    /// Verify the downstream system is reachable. Used for health reporting.
    async fn check_connection(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}
