//! HR Sync Core: shared domain abstractions.
//!
//! This crate defines the queued event model and the seams the rest of the
//! workspace plugs into: the `EventQueue` persistence trait, the
//! `SyncHandler` downstream trait, the retry policy and the clock. It
//! contains no infrastructure code.

pub mod clock;
pub mod error;
pub mod event;
pub mod handler;
pub mod queue;
pub mod retry;
