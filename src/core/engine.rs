//! The anvilq queue engine: a bounded queue plus the workers draining it.
//!
//! An engine is started once per assigned queue name. Its workers live exactly
//! as long as the engine; dropping it aborts them.

use crate::config::QueueConfig;
use crate::core::worker::WorkerPool;
use crate::error::{AnvilError, AnvilResult};
use crate::metrics::QueueSnapshot;
use crate::queue::BoundedQueue;
use crate::task::{Context, TaskId};
use std::sync::Arc;

/// A running queue with its worker pool.
pub struct QueueEngine {
    /// Name the queue is registered under
    name: String,
    /// Shared with every worker
    queue: Arc<BoundedQueue>,
    /// Workers draining the queue
    workers: WorkerPool,
}

impl QueueEngine {
    /// Validate `config`, create the queue and spawn its workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(name: impl Into<String>, config: QueueConfig) -> AnvilResult<Self> {
        let name = name.into();
        config
            .validate()
            .map_err(|errors| AnvilError::config(format!("queue '{}': {}", name, errors.join("; "))))?;

        let workers = config.workers;
        let queue = Arc::new(BoundedQueue::new(config));
        let workers = WorkerPool::spawn(&name, Arc::clone(&queue), workers);

        tracing::info!(
            "🔨 Queue '{}' started with {} workers (length {}, overflow {})",
            name,
            workers.len(),
            queue.capacity(),
            queue.config().overflow
        );

        Ok(Self {
            name,
            queue,
            workers,
        })
    }

    /// Name the engine was started under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue configuration.
    pub fn config(&self) -> &QueueConfig {
        self.queue.config()
    }

    /// The underlying queue.
    pub fn queue(&self) -> &Arc<BoundedQueue> {
        &self.queue
    }

    /// Submit a context at its own priority.
    pub async fn insert(&self, ctx: Context) -> AnvilResult<TaskId> {
        self.queue.insert(ctx.priority(), ctx).await
    }

    /// Current metrics and occupancy.
    pub async fn snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot().await
    }

    /// Workers currently running.
    pub fn active_workers(&self) -> usize {
        self.workers.active_worker_count()
    }
}

impl Drop for QueueEngine {
    fn drop(&mut self) {
        tracing::debug!("🔨 Stopping queue '{}'", self.name);
    }
}
