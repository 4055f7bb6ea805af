//! Bounded priority queue for anvilq.
//!
//! A [`BoundedQueue`] owns three lanes (one per [`Priority`]) and a global
//! count of outstanding tasks that never exceeds the configured length. All
//! lane structures, the counter and the metrics sit behind one mutex, and no
//! operation holds it across a handler call.
//!
//! When the queue is full and overflow is enabled, an insert may evict a task
//! from a lane of equal or lower priority, scanning from the lowest lane up.
//! A higher lane is never touched.
//!
//! # Examples
//!
//! ```rust
//! use anvilq::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> AnvilResult<()> {
//! let queue = BoundedQueue::new(QueueConfig::with_workers(1).with_length(2));
//! let (ctx, _out) = Context::from_fn(Priority::Normal, |_, _| async { Ok(()) });
//! queue.insert(Priority::Normal, ctx).await?;
//!
//! let task = queue.acquire().await.expect("task available");
//! queue.acknowledge(&task, &Ok(())).await;
//! assert_eq!(queue.snapshot().await.outstanding, 0);
//! # Ok(())
//! # }
//! ```

use crate::config::QueueConfig;
use crate::error::{AnvilError, AnvilResult};
use crate::metrics::{Occupancy, QueueMetrics, QueueSnapshot};
use crate::task::{Context, Priority, Task, TaskId};
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) mod lane;

use lane::{Ack, BufferQueue};

/// State guarded by the queue lock.
#[derive(Debug)]
struct QueueState {
    lanes: [BufferQueue; 3],
    outstanding: usize,
    metrics: QueueMetrics,
}

impl QueueState {
    fn lane(&mut self, priority: Priority) -> &mut BufferQueue {
        &mut self.lanes[priority.lane()]
    }

    fn occupancy(&self, capacity: usize) -> Occupancy {
        Occupancy {
            outstanding: self.outstanding,
            pending: self.lanes.iter().map(BufferQueue::pending_len).sum(),
            in_flight: self.lanes.iter().map(BufferQueue::in_flight_len).sum(),
            capacity,
        }
    }
}

/// Capacity-bounded queue with one FIFO lane per priority.
#[derive(Debug)]
pub struct BoundedQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
}

impl BoundedQueue {
    /// Create an empty queue. Workers are attached separately.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                lanes: [
                    BufferQueue::new(Priority::Low),
                    BufferQueue::new(Priority::Normal),
                    BufferQueue::new(Priority::Important),
                ],
                outstanding: 0,
                metrics: QueueMetrics::new(),
            }),
            config,
        }
    }

    /// Configuration the queue was built with.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Configured maximum of outstanding tasks.
    pub fn capacity(&self) -> usize {
        self.config.length
    }

    /// Insert a task into the lane of `priority`.
    ///
    /// The task lives in that lane whatever priority `ctx` was built with.
    /// At capacity, fails with [`AnvilError::QueueFull`] unless overflow is
    /// enabled and a lane at or below `priority` has something to evict. An
    /// invalid backoff policy is rejected with [`AnvilError::ConfigError`].
    pub async fn insert(&self, priority: Priority, ctx: Context) -> AnvilResult<TaskId> {
        if let Some(policy) = ctx.backoff() {
            policy
                .validate()
                .map_err(|errors| AnvilError::config(errors.join("; ")))?;
        }

        let mut state = self.state.lock().await;

        if state.outstanding >= self.config.length {
            if !self.config.overflow {
                tracing::debug!(priority = %priority, "Queue full, rejecting task");
                return Err(AnvilError::QueueFull {
                    capacity: self.config.length,
                });
            }

            let mut evicted = None;
            for lane in Priority::ASCENDING.into_iter().take_while(|lane| *lane <= priority) {
                if let Some(task) = state.lane(lane).drop_one() {
                    state.outstanding -= 1;
                    state.metrics.record_drop();
                    evicted = Some(task);
                    break;
                }
            }

            let Some(task) = evicted else {
                tracing::debug!(priority = %priority, "Queue full, nothing to evict");
                return Err(AnvilError::QueueFull {
                    capacity: self.config.length,
                });
            };

            tracing::debug!(
                task_id = %task.id(),
                evicted_priority = %task.priority(),
                priority = %priority,
                "Evicted task to make room"
            );
            task.release_dropped();
        }

        state.outstanding += 1;
        let task = state.lane(priority).insert(ctx);
        state.metrics.record_insert();

        tracing::debug!(task_id = %task.id(), priority = %priority, "Inserted task");
        Ok(task.id().clone())
    }

    /// Insert a task at a raw numeric priority level.
    pub async fn insert_level(&self, level: i64, ctx: Context) -> AnvilResult<TaskId> {
        let priority = Priority::try_from(level)?;
        self.insert(priority, ctx).await
    }

    /// Check out the highest-priority runnable task, if any.
    pub async fn acquire(&self) -> Option<Arc<Task>> {
        let mut state = self.state.lock().await;

        for priority in Priority::DESCENDING {
            if let Some(task) = state.lane(priority).acquire() {
                state.metrics.record_acquire();
                return Some(task);
            }
        }
        None
    }

    /// Report the outcome of an attempt.
    ///
    /// Success removes the task and frees its slot; failure requeues it and
    /// the slot stays taken. An evicted task was already removed from the
    /// accounting by its evictor, so it is ignored here.
    pub async fn acknowledge(&self, task: &Task, outcome: &AnvilResult<()>) {
        let mut state = self.state.lock().await;

        if task.is_evicted() {
            tracing::debug!(task_id = %task.id(), "Ignoring acknowledgement of evicted task");
            return;
        }

        match state.lane(task.priority()).acknowledge(task, outcome.is_ok()) {
            Ack::Removed => {
                state.outstanding -= 1;
                state.metrics.record_acknowledge();
                tracing::debug!(task_id = %task.id(), "Acknowledged task");
            }
            Ack::Requeued => {
                state.metrics.record_retry();
                tracing::debug!(
                    task_id = %task.id(),
                    failures = task.failures(),
                    "Requeued task for retry"
                );
            }
            Ack::Missing => {
                tracing::debug!(task_id = %task.id(), "Ignoring acknowledgement of unknown task");
            }
        }
    }

    /// Metrics and occupancy at this instant.
    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().await;
        state
            .metrics
            .snapshot(state.occupancy(self.config.length))
    }

    /// Number of outstanding (pending + in-flight) tasks.
    pub async fn len(&self) -> usize {
        self.state.lock().await.outstanding
    }

    /// Whether no task is outstanding.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Outstanding tasks in the lane of `priority`.
    pub async fn lane_len(&self, priority: Priority) -> usize {
        self.state.lock().await.lanes[priority.lane()].len()
    }
}
