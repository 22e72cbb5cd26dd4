//! `PostgreSQL` implementation of the `EventQueue` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument, warn};

use hrsync_core::error::QueueError;
use hrsync_core::event::{
    EventId, EventStatus, NewSyncEvent, SyncEvent, truncate_error_detail,
};
use hrsync_core::queue::{ClaimOutcome, EventQueue};

use crate::schema::{SYNC_EVENT_COLUMNS, SYNC_QUEUE_TABLE};

/// Row shape returned by queries that select [`SYNC_EVENT_COLUMNS`].
#[derive(Debug, FromRow)]
struct SyncEventRow {
    id: i64,
    source: String,
    event_type: String,
    payload: serde_json::Value,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    retry_count: i32,
    error_detail: String,
    external_object_id: Option<String>,
    next_attempt_at: Option<DateTime<Utc>>,
}

impl TryFrom<SyncEventRow> for SyncEvent {
    type Error = QueueError;

    fn try_from(row: SyncEventRow) -> Result<Self, Self::Error> {
        let status: EventStatus = row
            .status
            .parse()
            .map_err(|e| QueueError::Persistence(format!("row {} is corrupt: {e}", row.id)))?;
        Ok(Self {
            id: EventId(row.id),
            source: row.source,
            event_type: row.event_type,
            payload: row.payload,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            retry_count: row.retry_count,
            error_detail: row.error_detail,
            external_object_id: row.external_object_id,
            next_attempt_at: row.next_attempt_at,
        })
    }
}

fn persistence(context: &str) -> impl FnOnce(sqlx::Error) -> QueueError + '_ {
    move |e| QueueError::Persistence(format!("{context}: {e}"))
}

/// PostgreSQL-backed event queue.
#[derive(Debug, Clone)]
pub struct PgEventQueue {
    pool: PgPool,
}

impl PgEventQueue {
    /// Creates a new `PgEventQueue`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguishes "someone else claimed it" from "no such event" after a
    /// conditional update touched zero rows.
    /// After a guarded update touched no row: `NotFound` if the event is gone,
    /// otherwise `ClaimLost`.
    async fn claim_lost(&self, id: EventId) -> QueueError {
        match self.ensure_exists(id).await {
            Ok(()) => {
                warn!("event is no longer processing; outcome discarded");
                QueueError::ClaimLost(id)
            }
            Err(err) => err,
        }
    }

    async fn ensure_exists(&self, id: EventId) -> Result<(), QueueError> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {SYNC_QUEUE_TABLE} WHERE id = $1)");
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(persistence("failed to look up event"))?;
        if exists {
            Ok(())
        } else {
            Err(QueueError::NotFound(id))
        }
    }
}

#[async_trait]
impl EventQueue for PgEventQueue {
    #[instrument(skip(self, event), fields(source = %event.source, event_type = %event.event_type))]
    async fn insert(&self, event: NewSyncEvent) -> Result<SyncEvent, QueueError> {
        let sql = format!(
            "INSERT INTO {SYNC_QUEUE_TABLE} \
                 (source, event_type, payload, status, created_at, updated_at, retry_count, error_detail) \
             VALUES ($1, $2, $3, $4, $5, $5, 0, '') \
             RETURNING {SYNC_EVENT_COLUMNS}"
        );
        let row: SyncEventRow = sqlx::query_as(&sql)
            .bind(&event.source)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(EventStatus::Pending.as_str())
            .bind(event.received_at)
            .fetch_one(&self.pool)
            .await
            .map_err(persistence("failed to insert event"))?;

        let stored = SyncEvent::try_from(row)?;
        debug!(event_id = %stored.id, "event inserted");
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn fetch_pending_batch(&self, limit: u32) -> Result<Vec<SyncEvent>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {SYNC_EVENT_COLUMNS} FROM {SYNC_QUEUE_TABLE} \
             WHERE status = $1 \
             ORDER BY created_at ASC, id ASC \
             LIMIT $2"
        );
        let rows: Vec<SyncEventRow> = sqlx::query_as(&sql)
            .bind(EventStatus::Pending.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(persistence("failed to query pending events"))?;

        rows.into_iter().map(SyncEvent::try_from).collect()
    }

    #[instrument(skip(self), fields(event_id = %id))]
    async fn mark_processing(
        &self,
        id: EventId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, QueueError> {
        let sql = format!(
            "UPDATE {SYNC_QUEUE_TABLE} SET status = $1, updated_at = $2 \
             WHERE id = $3 AND status = $4"
        );
        let result = sqlx::query(&sql)
            .bind(EventStatus::Processing.as_str())
            .bind(now)
            .bind(id.0)
            .bind(EventStatus::Pending.as_str())
            .execute(&self.pool)
            .await
            .map_err(persistence("failed to claim event"))?;

        if result.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        self.ensure_exists(id).await?;
        warn!("event already claimed by another consumer");
        Ok(ClaimOutcome::AlreadyClaimed)
    }

    #[instrument(skip(self), fields(event_id = %id))]
    async fn mark_success(
        &self,
        id: EventId,
        external_object_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let sql = format!(
            "UPDATE {SYNC_QUEUE_TABLE} \
             SET status = $1, updated_at = $2, error_detail = '', \
                 external_object_id = $3, next_attempt_at = NULL \
             WHERE id = $4 AND status = $5"
        );
        let result = sqlx::query(&sql)
            .bind(EventStatus::Success.as_str())
            .bind(now)
            .bind(external_object_id)
            .bind(id.0)
            .bind(EventStatus::Processing.as_str())
            .execute(&self.pool)
            .await
            .map_err(persistence("failed to mark event successful"))?;

        if result.rows_affected() == 0 {
            return Err(self.claim_lost(id).await);
        }
        Ok(())
    }

    #[instrument(skip(self, error_detail), fields(event_id = %id))]
    async fn mark_failed(
        &self,
        id: EventId,
        error_detail: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let sql = format!(
            "UPDATE {SYNC_QUEUE_TABLE} SET status = $1, updated_at = $2, error_detail = $3 \
             WHERE id = $4"
        );
        let result = sqlx::query(&sql)
            .bind(EventStatus::Failed.as_str())
            .bind(now)
            .bind(truncate_error_detail(error_detail))
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(persistence("failed to mark event failed"))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(event_id = %id))]
    async fn increment_retry_count(
        &self,
        id: EventId,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let sql = format!(
            "UPDATE {SYNC_QUEUE_TABLE} SET retry_count = retry_count + 1, updated_at = $1 \
             WHERE id = $2"
        );
        let result = sqlx::query(&sql)
            .bind(now)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(persistence("failed to increment retry count"))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self, error_detail), fields(event_id = %id))]
    async fn record_failure(
        &self,
        id: EventId,
        error_detail: &str,
        next_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<SyncEvent, QueueError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(persistence("failed to begin transaction"))?;

        let mark_failed = format!(
            "UPDATE {SYNC_QUEUE_TABLE} \
             SET status = $1, updated_at = $2, error_detail = $3, next_attempt_at = $4 \
             WHERE id = $5 AND status = $6"
        );
        let result = sqlx::query(&mark_failed)
            .bind(EventStatus::Failed.as_str())
            .bind(now)
            .bind(truncate_error_detail(error_detail))
            .bind(next_attempt_at)
            .bind(id.0)
            .bind(EventStatus::Processing.as_str())
            .execute(&mut *tx)
            .await
            .map_err(persistence("failed to mark event failed"))?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            drop(tx);
            return Err(self.claim_lost(id).await);
        }

        let increment = format!(
            "UPDATE {SYNC_QUEUE_TABLE} SET retry_count = retry_count + 1, updated_at = $1 \
             WHERE id = $2 \
             RETURNING {SYNC_EVENT_COLUMNS}"
        );
        let row: SyncEventRow = sqlx::query_as(&increment)
            .bind(now)
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(persistence("failed to increment retry count"))?;

        tx.commit()
            .await
            .map_err(persistence("failed to commit failure transition"))?;

        SyncEvent::try_from(row)
    }

    #[instrument(skip(self))]
    async fn requeue_due_failures(
        &self,
        max_retries: i32,
        now: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        let sql = format!(
            "UPDATE {SYNC_QUEUE_TABLE} SET status = $1, updated_at = $2 \
             WHERE status = $3 AND retry_count < $4 \
               AND next_attempt_at IS NOT NULL AND next_attempt_at <= $2"
        );
        let result = sqlx::query(&sql)
            .bind(EventStatus::Pending.as_str())
            .bind(now)
            .bind(EventStatus::Failed.as_str())
            .bind(max_retries)
            .execute(&self.pool)
            .await
            .map_err(persistence("failed to requeue failed events"))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn reclaim_stale(
        &self,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        let sql = format!(
            "UPDATE {SYNC_QUEUE_TABLE} SET status = $1, updated_at = $2 \
             WHERE status = $3 AND updated_at < $4"
        );
        let result = sqlx::query(&sql)
            .bind(EventStatus::Pending.as_str())
            .bind(now)
            .bind(EventStatus::Processing.as_str())
            .bind(stale_before)
            .execute(&self.pool)
            .await
            .map_err(persistence("failed to reclaim stale events"))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(event_id = %id))]
    async fn get(&self, id: EventId) -> Result<SyncEvent, QueueError> {
        let sql = format!("SELECT {SYNC_EVENT_COLUMNS} FROM {SYNC_QUEUE_TABLE} WHERE id = $1");
        let row: Option<SyncEventRow> = sqlx::query_as(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence("failed to load event"))?;

        row.ok_or(QueueError::NotFound(id))
            .and_then(SyncEvent::try_from)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(persistence("database ping failed"))?;
        Ok(())
    }
}
