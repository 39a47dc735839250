//! Serialized task queue gating all durable store access.
//!
//! Concurrent UI-triggered writes and background sync reads must never
//! interleave against the underlying storage. `TaskQueue` provides that
//! guarantee as a single run-to-completion queue: submitted tasks execute
//! strictly in submission order, one at a time, on a dedicated worker task.
//! A task's failure is reported to its own caller and does not abort
//! subsequent queued tasks.

use futures::future::BoxFuture;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Job = BoxFuture<'static, ()>;

/// Single-worker FIFO queue for store access
///
/// # Example
///
/// ```ignore
/// let queue = TaskQueue::new();
/// let store = store.clone();
/// let pending = queue
///     .enqueue(move || async move { store.list_pending() })
///     .await?;
/// ```
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl TaskQueue {
    /// Create a new queue and spawn its worker task
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            debug!("Task queue worker stopped");
        });
        Self { tx }
    }

    /// Submit a task and await its result.
    ///
    /// Tasks run to completion in submission order. An `Err` returned by the
    /// task is delivered to this caller only; the worker moves on to the next
    /// task either way.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::QueueClosed` if the worker has shut down.
    pub async fn enqueue<T, F, Fut>(&self, task: F) -> crate::error::SyncResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = crate::error::SyncResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let result = task().await;
            let _ = done_tx.send(result);
        });
        self.tx
            .send(job)
            .map_err(|_| crate::error::SyncError::QueueClosed)?;
        done_rx
            .await
            .map_err(|_| crate::error::SyncError::QueueClosed)?
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
