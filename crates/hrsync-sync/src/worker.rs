//! Background sync worker.
//!
//! Runs `process_batch` for the lifetime of the process. After a full batch
//! the next one starts immediately; after a short or failed batch the worker
//! sleeps for the poll interval or until woken by a fresh ingestion.
//! Shutdown cancels the in-flight batch; events it left in `Processing` are
//! reclaimed by a later run once their claim times out.

use std::sync::Arc;
use std::time::Duration;

use hrsync_core::clock::Clock;
use hrsync_core::handler::SyncHandler;
use hrsync_core::queue::EventQueue;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::processing::{ProcessingOptions, process_batch};

/// Default delay between polls when the queue is idle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Wakes a sleeping worker so new events are picked up without waiting for
/// the next poll.
#[derive(Debug, Clone, Default)]
pub struct WorkerWaker(Arc<Notify>);

impl WorkerWaker {
    /// Request an immediate processing run. Wakes that arrive while a batch
    /// is running are kept and consumed by the next idle wait.
    pub fn wake(&self) {
        self.0.notify_one();
    }
}

/// Long-lived consumer of the event queue.
pub struct SyncWorker {
    queue: Arc<dyn EventQueue>,
    handler: Arc<dyn SyncHandler>,
    clock: Arc<dyn Clock>,
    options: ProcessingOptions,
    poll_interval: Duration,
    waker: WorkerWaker,
}

impl SyncWorker {
    /// Create a worker over the given queue, handler and clock.
    #[must_use]
    pub fn new(
        queue: Arc<dyn EventQueue>,
        handler: Arc<dyn SyncHandler>,
        clock: Arc<dyn Clock>,
        options: ProcessingOptions,
    ) -> Self {
        Self {
            queue,
            handler,
            clock,
            options,
            poll_interval: DEFAULT_POLL_INTERVAL,
            waker: WorkerWaker::default(),
        }
    }

    /// Override the idle poll interval (default: 15 seconds).
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// A waker bound to this worker.
    #[must_use]
    pub fn waker(&self) -> WorkerWaker {
        self.waker.clone()
    }

    /// Spawn the worker onto the current Tokio runtime.
    #[must_use]
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let waker = self.waker();
        let task = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle {
            shutdown: shutdown_tx,
            task,
            waker,
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.options.batch_size,
            poll_interval_secs = self.poll_interval.as_secs(),
            "sync worker started"
        );

        let full_batch = usize::try_from(self.options.batch_size).unwrap_or(usize::MAX);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let run = process_batch(
                self.queue.as_ref(),
                self.handler.as_ref(),
                self.clock.as_ref(),
                &self.options,
            );

            let more_waiting = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                result = run => match result {
                    Ok(report) => full_batch > 0 && report.fetched >= full_batch,
                    Err(err) => {
                        error!(error = %err, "sync batch failed; retrying after poll interval");
                        false
                    }
                },
            };

            if more_waiting {
                continue;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                () = self.waker.0.notified() => {}
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("sync worker stopped");
    }
}

/// Handle to a spawned [`SyncWorker`].
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    waker: WorkerWaker,
}

impl WorkerHandle {
    /// A waker for the spawned worker.
    #[must_use]
    pub fn waker(&self) -> WorkerWaker {
        self.waker.clone()
    }

    /// Signal shutdown and wait for the worker task to finish.
    pub async fn shutdown(self) {
        // The receiver only disappears if the task already ended.
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "sync worker task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use hrsync_core::event::{EventStatus, NewSyncEvent};
    use hrsync_test_support::{
        FailingEventQueue, FixedClock, InMemoryEventQueue, ScriptedHandler,
    };
    use serde_json::json;

    async fn enqueue(queue: &InMemoryEventQueue, event_type: &str) {
        queue
            .insert(NewSyncEvent {
                source: "paycor".to_owned(),
                event_type: event_type.to_owned(),
                payload: json!({ "eventType": event_type }),
                received_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    async fn wait_until_settled(queue: &InMemoryEventQueue, expected: usize) {
        let settled = async {
            loop {
                let done = queue
                    .snapshot()
                    .iter()
                    .filter(|e| matches!(e.status, EventStatus::Success | EventStatus::Failed))
                    .count();
                if done >= expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), settled)
            .await
            .expect("events settled in time");
    }

    #[tokio::test]
    async fn test_worker_drains_more_than_one_batch() {
        // Arrange
        let queue = Arc::new(InMemoryEventQueue::new());
        for i in 0..5 {
            enqueue(&queue, &format!("employee.updated.{i}")).await;
        }
        let options = ProcessingOptions {
            batch_size: 2,
            ..ProcessingOptions::default()
        };
        let worker = SyncWorker::new(
            queue.clone(),
            Arc::new(ScriptedHandler::succeeding()),
            Arc::new(FixedClock(Utc::now())),
            options,
        )
        .with_poll_interval(Duration::from_secs(60));

        // Act
        let handle = worker.spawn();
        wait_until_settled(&queue, 5).await;
        handle.shutdown().await;

        // Assert
        assert!(
            queue
                .snapshot()
                .iter()
                .all(|e| e.status == EventStatus::Success)
        );
    }

    #[tokio::test]
    async fn test_waker_triggers_run_before_poll_interval() {
        // Arrange
        let queue = Arc::new(InMemoryEventQueue::new());
        let worker = SyncWorker::new(
            queue.clone(),
            Arc::new(ScriptedHandler::succeeding()),
            Arc::new(FixedClock(Utc::now())),
            ProcessingOptions::default(),
        )
        .with_poll_interval(Duration::from_secs(3600));
        let handle = worker.spawn();

        // Act: the worker has gone idle on an empty queue; a wake must be
        // enough to pick up the new event.
        tokio::time::sleep(Duration::from_millis(50)).await;
        enqueue(&queue, "employee.created").await;
        handle.waker().wake();
        wait_until_settled(&queue, 1).await;
        handle.shutdown().await;

        // Assert
        assert_eq!(queue.snapshot()[0].status, EventStatus::Success);
    }

    #[tokio::test]
    async fn test_worker_survives_store_failures_and_shuts_down() {
        let worker = SyncWorker::new(
            Arc::new(FailingEventQueue),
            Arc::new(ScriptedHandler::succeeding()),
            Arc::new(FixedClock(Utc::now())),
            ProcessingOptions::default(),
        )
        .with_poll_interval(Duration::from_millis(10));

        let handle = worker.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("worker stopped in time");
    }
}
