//! Shared application state.

use std::sync::Arc;

use hrsync_core::clock::Clock;
use hrsync_core::handler::SyncHandler;
use hrsync_core::queue::EventQueue;
use hrsync_sync::worker::WorkerWaker;

use crate::config::WebhookConfig;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Durable event queue.
    pub queue: Arc<dyn EventQueue>,
    /// Downstream handler, consulted by the health check.
    pub handler: Arc<dyn SyncHandler>,
    /// Clock for ingestion timestamps.
    pub clock: Arc<dyn Clock>,
    /// Wakes the background worker after an insert. `None` when no worker
    /// runs in this process.
    pub waker: Option<WorkerWaker>,
    pub webhook: WebhookConfig,
}

impl AppState {
    /// Create new application state without a worker.
    #[must_use]
    pub fn new(
        queue: Arc<dyn EventQueue>,
        handler: Arc<dyn SyncHandler>,
        clock: Arc<dyn Clock>,
        webhook: WebhookConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            clock,
            waker: None,
            webhook,
        }
    }

    /// Attach the waker of a running worker.
    #[must_use]
    pub fn with_waker(mut self, waker: WorkerWaker) -> Self {
        self.waker = Some(waker);
        self
    }
}
