//! HR Sync: PostgreSQL event store.
//!
//! Persists queued sync events in the `sync_queue` table and implements the
//! `EventQueue` lifecycle operations on top of a `PgPool`.

pub mod pg_event_queue;
pub mod schema;

/// Embedded migrations for the `sync_queue` table.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
