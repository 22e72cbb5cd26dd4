//! Event queue abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::QueueError;
use crate::event::{EventId, NewSyncEvent, SyncEvent};

/// Result of attempting to claim a pending event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This consumer moved the event from `Pending` to `Processing`.
    Claimed,
    /// The event exists but is no longer `Pending`; another consumer owns it.
    AlreadyClaimed,
}

/// Durable store for queued events and their lifecycle state.
///
/// The store exclusively owns event records. Callers only ever hold
/// snapshots returned from these operations.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Insert a new event as `Pending` with a zero retry count and return
    /// the stored row with its assigned id.
    async fn insert(&self, event: NewSyncEvent) -> Result<SyncEvent, QueueError>;

    /// Return up to `limit` `Pending` events, oldest first (ties broken by id).
    async fn fetch_pending_batch(&self, limit: u32) -> Result<Vec<SyncEvent>, QueueError>;

    /// Atomically claim an event: `Pending -> Processing` only if it is still
    /// `Pending`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::NotFound` if `id` does not exist.
    async fn mark_processing(
        &self,
        id: EventId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, QueueError>;

    /// Mark a `Processing` event `Success`, clear its error detail and
    /// record the downstream object id.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::NotFound` if `id` does not exist and
    /// `QueueError::ClaimLost` if the event is not `Processing`.
    async fn mark_success(
        &self,
        id: EventId,
        external_object_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    /// Mark an event `Failed` with a (truncated) error detail.
    ///
    /// Prefer [`EventQueue::record_failure`], which pairs this with the retry
    /// increment in one transaction.
    async fn mark_failed(
        &self,
        id: EventId,
        error_detail: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    /// Increment the retry count by exactly one.
    async fn increment_retry_count(&self, id: EventId, now: DateTime<Utc>)
    -> Result<(), QueueError>;

    /// The failure transition for a `Processing` event: `Failed`, truncated
    /// detail, `retry_count + 1` and the next eligible attempt time, applied
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::NotFound` if `id` does not exist and
    /// `QueueError::ClaimLost` if the event is not `Processing`. Nothing
    /// changes in either case.
    async fn record_failure(
        &self,
        id: EventId,
        error_detail: &str,
        next_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<SyncEvent, QueueError>;

    /// Move `Failed` events below `max_retries` whose `next_attempt_at` has
    /// passed back to `Pending`. Returns the number of events requeued.
    async fn requeue_due_failures(
        &self,
        max_retries: i32,
        now: DateTime<Utc>,
    ) -> Result<u64, QueueError>;

    /// Move `Processing` events last touched before `stale_before` back to
    /// `Pending`. Returns the number of events reclaimed.
    async fn reclaim_stale(
        &self,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, QueueError>;

    /// Load a single event.
    async fn get(&self, id: EventId) -> Result<SyncEvent, QueueError>;

    /// Verify the store is reachable. Has no side effects.
    async fn ping(&self) -> Result<(), QueueError>;
}
