//! Test handlers: scripted `SyncHandler` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use hrsync_core::event::{EventId, SyncEvent};
use hrsync_core::handler::{HandlerError, SyncHandler, SyncOutcome};

/// A handler that succeeds with `OBJ-<event id>` unless a failure has been
/// scripted for the event's type. Records the id of every event it handles.
#[derive(Debug, Default)]
pub struct ScriptedHandler {
    failures: HashMap<String, String>,
    unreachable: bool,
    handled: Mutex<Vec<EventId>>,
}

impl ScriptedHandler {
    /// A handler that succeeds for every event.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Fail every event whose `event_type` equals `event_type` with `message`.
    #[must_use]
    pub fn failing_on(mut self, event_type: &str, message: impl Into<String>) -> Self {
        self.failures.insert(event_type.to_owned(), message.into());
        self
    }

    /// Report the downstream system as unreachable from `check_connection`.
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Returns the ids of handled events, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn handled(&self) -> Vec<EventId> {
        self.handled.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncHandler for ScriptedHandler {
    async fn handle(&self, event: &SyncEvent) -> Result<SyncOutcome, HandlerError> {
        self.handled.lock().unwrap().push(event.id);
        match self.failures.get(&event.event_type) {
            Some(message) => Err(HandlerError::new(message.clone())),
            None => Ok(SyncOutcome::new(format!("OBJ-{}", event.id))),
        }
    }

    async fn check_connection(&self) -> Result<(), HandlerError> {
        if self.unreachable {
            Err(HandlerError::new("asset API unreachable"))
        } else {
            Ok(())
        }
    }
}
