//! Test queues: in-memory `EventQueue` implementations for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hrsync_core::error::QueueError;
use hrsync_core::event::{
    EventId, EventStatus, NewSyncEvent, SyncEvent, truncate_error_detail,
};
use hrsync_core::queue::{ClaimOutcome, EventQueue};

#[derive(Debug, Default)]
struct Inner {
    last_id: i64,
    events: BTreeMap<EventId, SyncEvent>,
}

impl Inner {
    fn event_mut(&mut self, id: EventId) -> Result<&mut SyncEvent, QueueError> {
        self.events.get_mut(&id).ok_or(QueueError::NotFound(id))
    }

    fn claimed_mut(&mut self, id: EventId) -> Result<&mut SyncEvent, QueueError> {
        let event = self.event_mut(id)?;
        if event.status == EventStatus::Processing {
            Ok(event)
        } else {
            Err(QueueError::ClaimLost(id))
        }
    }
}

/// An event queue held entirely in memory with the same lifecycle semantics
/// as the PostgreSQL store. Ids start at 1 and increase by one per insert.
#[derive(Debug, Default)]
pub struct InMemoryEventQueue {
    inner: Mutex<Inner>,
}

impl InMemoryEventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every stored event, ordered by id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn snapshot(&self) -> Vec<SyncEvent> {
        self.inner.lock().unwrap().events.values().cloned().collect()
    }

    /// Overwrite the status of an event, bypassing the state machine. Used to
    /// stage scenarios such as an abandoned claim.
    ///
    /// # Panics
    ///
    /// Panics if the event does not exist or the mutex is poisoned.
    pub fn force_status(&self, id: EventId, status: EventStatus, updated_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        let event = inner.events.get_mut(&id).expect("event exists");
        event.status = status;
        event.updated_at = updated_at;
    }
}

#[async_trait]
impl EventQueue for InMemoryEventQueue {
    async fn insert(&self, event: NewSyncEvent) -> Result<SyncEvent, QueueError> {
        let mut inner = self.inner.lock().unwrap();
        inner.last_id += 1;
        let stored = SyncEvent {
            id: EventId(inner.last_id),
            source: event.source,
            event_type: event.event_type,
            payload: event.payload,
            status: EventStatus::Pending,
            created_at: event.received_at,
            updated_at: event.received_at,
            retry_count: 0,
            error_detail: String::new(),
            external_object_id: None,
            next_attempt_at: None,
        };
        inner.events.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn fetch_pending_batch(&self, limit: u32) -> Result<Vec<SyncEvent>, QueueError> {
        let inner = self.inner.lock().unwrap();
        let mut pending: Vec<SyncEvent> = inner
            .events
            .values()
            .filter(|e| e.status == EventStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|e| (e.created_at, e.id));
        pending.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(pending)
    }

    async fn mark_processing(
        &self,
        id: EventId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let event = inner.event_mut(id)?;
        if event.status != EventStatus::Pending {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }
        event.status = EventStatus::Processing;
        event.updated_at = now;
        Ok(ClaimOutcome::Claimed)
    }

    async fn mark_success(
        &self,
        id: EventId,
        external_object_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let event = inner.claimed_mut(id)?;
        event.status = EventStatus::Success;
        event.error_detail.clear();
        event.external_object_id = Some(external_object_id.to_owned());
        event.next_attempt_at = None;
        event.updated_at = now;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: EventId,
        error_detail: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let event = inner.event_mut(id)?;
        event.status = EventStatus::Failed;
        event.error_detail = truncate_error_detail(error_detail);
        event.updated_at = now;
        Ok(())
    }

    async fn increment_retry_count(
        &self,
        id: EventId,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let event = inner.event_mut(id)?;
        event.retry_count += 1;
        event.updated_at = now;
        Ok(())
    }

    async fn record_failure(
        &self,
        id: EventId,
        error_detail: &str,
        next_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<SyncEvent, QueueError> {
        // Single lock scope: both fields change together or not at all.
        let mut inner = self.inner.lock().unwrap();
        let event = inner.claimed_mut(id)?;
        event.status = EventStatus::Failed;
        event.error_detail = truncate_error_detail(error_detail);
        event.next_attempt_at = next_attempt_at;
        event.retry_count += 1;
        event.updated_at = now;
        Ok(event.clone())
    }

    async fn requeue_due_failures(
        &self,
        max_retries: i32,
        now: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let mut requeued = 0;
        for event in inner.events.values_mut() {
            let due = event.next_attempt_at.is_some_and(|at| at <= now);
            if event.status == EventStatus::Failed && event.retry_count < max_retries && due {
                event.status = EventStatus::Pending;
                event.updated_at = now;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn reclaim_stale(
        &self,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let mut reclaimed = 0;
        for event in inner.events.values_mut() {
            if event.status == EventStatus::Processing && event.updated_at < stale_before {
                event.status = EventStatus::Pending;
                event.updated_at = now;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn get(&self, id: EventId) -> Result<SyncEvent, QueueError> {
        let inner = self.inner.lock().unwrap();
        inner.events.get(&id).cloned().ok_or(QueueError::NotFound(id))
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// An event queue whose every operation fails with a persistence error.
/// Useful for testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventQueue;

fn connection_refused() -> QueueError {
    QueueError::Persistence("connection refused".into())
}

#[async_trait]
impl EventQueue for FailingEventQueue {
    async fn insert(&self, _event: NewSyncEvent) -> Result<SyncEvent, QueueError> {
        Err(connection_refused())
    }

    async fn fetch_pending_batch(&self, _limit: u32) -> Result<Vec<SyncEvent>, QueueError> {
        Err(connection_refused())
    }

    async fn mark_processing(
        &self,
        _id: EventId,
        _now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, QueueError> {
        Err(connection_refused())
    }

    async fn mark_success(
        &self,
        _id: EventId,
        _external_object_id: &str,
        _now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        Err(connection_refused())
    }

    async fn mark_failed(
        &self,
        _id: EventId,
        _error_detail: &str,
        _now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        Err(connection_refused())
    }

    async fn increment_retry_count(
        &self,
        _id: EventId,
        _now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        Err(connection_refused())
    }

    async fn record_failure(
        &self,
        _id: EventId,
        _error_detail: &str,
        _next_attempt_at: Option<DateTime<Utc>>,
        _now: DateTime<Utc>,
    ) -> Result<SyncEvent, QueueError> {
        Err(connection_refused())
    }

    async fn requeue_due_failures(
        &self,
        _max_retries: i32,
        _now: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        Err(connection_refused())
    }

    async fn reclaim_stale(
        &self,
        _stale_before: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        Err(connection_refused())
    }

    async fn get(&self, _id: EventId) -> Result<SyncEvent, QueueError> {
        Err(connection_refused())
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Err(connection_refused())
    }
}
