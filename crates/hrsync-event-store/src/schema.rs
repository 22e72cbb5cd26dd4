//! Event store database schema.
//!
//! The table itself is created by the workspace migrations; this module holds
//! the column projection shared by every query that returns whole rows.

/// Name of the queue table.
pub const SYNC_QUEUE_TABLE: &str = "sync_queue";

/// Columns selected for a full `SyncEvent` row, in `SyncEventRow` order.
pub const SYNC_EVENT_COLUMNS: &str = "id, source, event_type, payload, status, created_at, \
     updated_at, retry_count, error_detail, external_object_id, next_attempt_at";
