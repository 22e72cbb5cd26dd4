//! HR Sync: application layer.
//!
//! Ingestion turns an inbound webhook notification into a queued event.
//! Processing drains one bounded batch of pending events through a
//! `SyncHandler`. The worker schedules processing runs for the lifetime of
//! the process.

pub mod ingestion;
pub mod processing;
pub mod worker;
