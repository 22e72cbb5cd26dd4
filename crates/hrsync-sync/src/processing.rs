//! Processing loop.
//!
//! One invocation drains one bounded batch of `Pending` events through the
//! state machine `Pending -> Processing -> Success | Failed`. A handler
//! failure is recorded on its event and never stops the batch; a store
//! failure aborts the run and is returned to the scheduler.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use hrsync_core::clock::Clock;
use hrsync_core::error::QueueError;
use hrsync_core::event::SyncEvent;
use hrsync_core::handler::SyncHandler;
use hrsync_core::queue::{ClaimOutcome, EventQueue};
use hrsync_core::retry::RetryPolicy;
use tracing::{debug, error, info, instrument, warn};

/// Default number of events pulled per run.
pub const DEFAULT_BATCH_SIZE: u32 = 10;

/// Tunables for a processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingOptions {
    /// Maximum events fetched per run.
    pub batch_size: u32,
    /// What happens to an event after a failed attempt.
    pub retry_policy: RetryPolicy,
    /// Age after which a `Processing` event is considered abandoned and
    /// returned to `Pending`. `None` disables reclaiming.
    pub claim_timeout: Option<Duration>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            retry_policy: RetryPolicy::Terminal,
            claim_timeout: None,
        }
    }
}

/// Counters for one processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Pending events retrieved.
    pub fetched: usize,
    /// Events marked `Success`.
    pub succeeded: usize,
    /// Events marked `Failed`.
    pub failed: usize,
    /// Events claimed by another consumer, removed mid-run, or whose claim
    /// was lost before the outcome was recorded.
    pub skipped: usize,
    /// Failed events returned to `Pending` before fetching.
    pub requeued: u64,
    /// Abandoned claims returned to `Pending` before fetching.
    pub reclaimed: u64,
}

enum EventOutcome {
    Succeeded,
    Failed,
    Skipped,
}

/// Process one batch of pending events.
///
/// # Errors
///
/// Returns `QueueError::Persistence` if the store fails while fetching or
/// updating events. Events handled before the failure keep their recorded
/// outcome.
#[instrument(skip_all, fields(batch_size = options.batch_size))]
pub async fn process_batch(
    queue: &dyn EventQueue,
    handler: &dyn SyncHandler,
    clock: &dyn Clock,
    options: &ProcessingOptions,
) -> Result<BatchReport, QueueError> {
    let mut report = BatchReport::default();
    let now = clock.now();

    if let Some(stale_before) = options.claim_timeout.and_then(|t| stale_cutoff(now, t)) {
        report.reclaimed = queue.reclaim_stale(stale_before, now).await?;
        if report.reclaimed > 0 {
            warn!(count = report.reclaimed, "reclaimed abandoned events");
        }
    }

    if let Some(max_retries) = options.retry_policy.requeue_limit() {
        report.requeued = queue.requeue_due_failures(max_retries, now).await?;
    }

    let events = queue.fetch_pending_batch(options.batch_size).await?;
    report.fetched = events.len();

    for event in events {
        match process_event(queue, handler, clock, &options.retry_policy, event).await {
            Ok(EventOutcome::Succeeded) => report.succeeded += 1,
            Ok(EventOutcome::Failed) => report.failed += 1,
            Ok(EventOutcome::Skipped) => report.skipped += 1,
            Err(QueueError::NotFound(id)) => {
                error!(event_id = %id, "event disappeared while being processed");
                report.skipped += 1;
            }
            Err(QueueError::ClaimLost(id)) => {
                warn!(event_id = %id, "claim lost before the outcome was recorded");
                report.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    if report.fetched > 0 {
        info!(
            fetched = report.fetched,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "sync batch processed"
        );
    }

    Ok(report)
}

#[instrument(skip_all, fields(event_id = %event.id, event_type = %event.event_type))]
async fn process_event(
    queue: &dyn EventQueue,
    handler: &dyn SyncHandler,
    clock: &dyn Clock,
    retry_policy: &RetryPolicy,
    event: SyncEvent,
) -> Result<EventOutcome, QueueError> {
    if queue.mark_processing(event.id, clock.now()).await? == ClaimOutcome::AlreadyClaimed {
        debug!("skipping event claimed elsewhere");
        return Ok(EventOutcome::Skipped);
    }

    match handler.handle(&event).await {
        Ok(outcome) => {
            queue
                .mark_success(event.id, &outcome.external_object_id, clock.now())
                .await?;
            info!(external_object_id = %outcome.external_object_id, "event synchronized");
            Ok(EventOutcome::Succeeded)
        }
        Err(err) => {
            let now = clock.now();
            let next_attempt_at = retry_policy.next_attempt_at(event.retry_count + 1, now);
            let failed = queue
                .record_failure(event.id, &err.message, next_attempt_at, now)
                .await?;
            warn!(
                retry_count = failed.retry_count,
                next_attempt_at = ?failed.next_attempt_at,
                error = %err,
                "event synchronization failed"
            );
            Ok(EventOutcome::Failed)
        }
    }
}

fn stale_cutoff(now: DateTime<Utc>, claim_timeout: Duration) -> Option<DateTime<Utc>> {
    let timeout = TimeDelta::from_std(claim_timeout).ok()?;
    now.checked_sub_signed(timeout)
}
