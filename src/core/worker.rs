//! Worker implementation for anvilq.
//!
//! Workers are the blacksmiths of a queue: each one is a persistent tokio task
//! that pulls work from its [`BoundedQueue`], forges it and reports the
//! outcome back. Idle workers poll again after the queue's interval.

use crate::error::{AnvilError, AnvilResult};
use crate::queue::BoundedQueue;
use crate::task::Task;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// What a single worker iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStep {
    /// Nothing was runnable
    Idle,
    /// The task was evicted, so it was dropped without acknowledgement
    Discarded,
    /// The handler succeeded and the task was removed
    Acknowledged,
    /// The handler failed or panicked and the task was requeued
    Requeued,
}

/// Individual worker bound to one queue.
pub struct Worker {
    id: usize,
    queue_name: Arc<str>,
    queue: Arc<BoundedQueue>,
    interval: Duration,
}

impl Worker {
    /// Create a new worker with the given ID.
    pub fn new(id: usize, queue_name: Arc<str>, queue: Arc<BoundedQueue>) -> Self {
        let interval = queue.config().interval();
        Self {
            id,
            queue_name,
            queue,
            interval,
        }
    }

    /// Run the worker loop. Never returns; the pool aborts it.
    pub async fn run(&self) {
        tracing::debug!("🔨 Worker {} starting forge on '{}'", self.id, self.queue_name);

        loop {
            if self.step().await == WorkerStep::Idle {
                tracing::trace!("🔨 Worker {} idle, sleeping {:?}", self.id, self.interval);
                sleep(self.interval).await;
            }
        }
    }

    /// Acquire and process at most one task.
    pub async fn step(&self) -> WorkerStep {
        let Some(task) = self.queue.acquire().await else {
            return WorkerStep::Idle;
        };

        if task.is_evicted() {
            tracing::debug!("🔨 Worker {} discarding evicted task {}", self.id, task.id());
            return WorkerStep::Discarded;
        }

        if let Some(delay) = task.next_delay().await {
            tracing::debug!(
                "🔨 Worker {} backing off {:?} before retrying task {}",
                self.id,
                delay,
                task.id()
            );
            sleep(delay).await;
        }

        let outcome = {
            let Some(_attempt) = Attempt::begin(&task) else {
                tracing::debug!("🔨 Worker {} discarding evicted task {}", self.id, task.id());
                return WorkerStep::Discarded;
            };
            tracing::debug!("🔨 Worker {} forging task {}", self.id, task.id());
            self.forge(&task).await
        };

        if task.is_evicted() {
            tracing::debug!(
                "🔨 Worker {} task {} was evicted while running",
                self.id,
                task.id()
            );
            return WorkerStep::Discarded;
        }

        self.queue.acknowledge(&task, &outcome).await;
        match outcome {
            Ok(()) => WorkerStep::Acknowledged,
            Err(error) => {
                tracing::warn!(
                    "🔨 Worker {} task {} failed (attempt {}): {}",
                    self.id,
                    task.id(),
                    task.failures(),
                    error
                );
                WorkerStep::Requeued
            }
        }
    }

    /// Execute one attempt of the task.
    ///
    /// The handler runs in its own tokio task so a panic comes back as a
    /// `JoinError` and is treated like any other failure.
    async fn forge(&self, task: &Task) -> AnvilResult<()> {
        let (handler, scope, out) = task.attempt();
        let handle = tokio::spawn(async move { handler.forge(scope, out).await });

        match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                tracing::warn!("🔨 Task {} panicked: {}", task.id(), join_error);
                Err(AnvilError::task_error("Task handler panicked", join_error))
            }
        }
    }
}

/// A running attempt of a task. Ending it, including by the worker being
/// aborted mid-attempt, releases a drop callback deferred by an eviction.
struct Attempt<'a>(&'a Task);

impl<'a> Attempt<'a> {
    fn begin(task: &'a Task) -> Option<Self> {
        task.begin_attempt().then(|| Self(task))
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        self.0.finish_attempt();
    }
}

/// Decrements the active worker count when a worker future ends or is aborted.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// The fixed set of workers draining one queue.
///
/// Dropping the pool aborts every worker. A handler already running in its
/// own task is left to finish, but its outcome is never acknowledged.
pub struct WorkerPool {
    /// Number of currently running workers
    active_workers: Arc<AtomicUsize>,
    /// Handles to all worker tasks
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers on the current tokio runtime.
    pub fn spawn(queue_name: &str, queue: Arc<BoundedQueue>, count: usize) -> Self {
        let active_workers = Arc::new(AtomicUsize::new(0));
        let queue_name: Arc<str> = Arc::from(queue_name);

        let handles = (0..count)
            .map(|worker_id| {
                let worker = Worker::new(worker_id, Arc::clone(&queue_name), Arc::clone(&queue));
                let active_workers = Arc::clone(&active_workers);

                tokio::spawn(async move {
                    active_workers.fetch_add(1, Ordering::Relaxed);
                    let _guard = ActiveGuard(active_workers);
                    worker.run().await;
                })
            })
            .collect();

        tracing::debug!("🔨 Spawned {} workers for '{}'", count, queue_name);
        Self {
            active_workers,
            handles,
        }
    }

    /// Get the number of active workers.
    pub fn active_worker_count(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// Number of workers spawned.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Abort all workers.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.abort();
    }
}
