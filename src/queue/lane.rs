//! A single priority lane.
//!
//! A lane keeps fresh tasks in FIFO order and tracks every task that has been
//! handed to a worker until it is acknowledged or evicted. Requeued tasks stay
//! in the in-flight set with their flag cleared, which lets any worker pick
//! them up again ahead of the lane's pending tasks.

use crate::task::{Context, Priority, Task};
use std::collections::VecDeque;
use std::sync::Arc;

/// Result of acknowledging an attempt on a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ack {
    /// The task succeeded and left the lane
    Removed,
    /// The task failed and can be acquired again
    Requeued,
    /// The task is not in this lane's in-flight set
    Missing,
}

/// One priority lane of a bounded queue. Not synchronized on its own; the
/// owning queue's lock guards it.
#[derive(Debug)]
pub(crate) struct BufferQueue {
    priority: Priority,
    next_index: u64,
    pending: VecDeque<Arc<Task>>,
    in_flight: Vec<Arc<Task>>,
}

impl BufferQueue {
    pub(crate) fn new(priority: Priority) -> Self {
        Self {
            priority,
            next_index: 0,
            pending: VecDeque::new(),
            in_flight: Vec::new(),
        }
    }

    /// Append a new task to the pending sequence.
    pub(crate) fn insert(&mut self, ctx: Context) -> Arc<Task> {
        self.next_index += 1;
        let task = Arc::new(Task::new(self.next_index, self.priority, ctx));
        self.pending.push_back(Arc::clone(&task));
        task
    }

    /// Check out the next runnable task.
    ///
    /// Requeued retries come first, then the head of the pending sequence.
    pub(crate) fn acquire(&mut self) -> Option<Arc<Task>> {
        if let Some(task) = self.in_flight.iter().find(|task| !task.is_acquired()) {
            task.set_acquired(true);
            return Some(Arc::clone(task));
        }

        let task = self.pending.pop_front()?;
        task.set_acquired(true);
        self.in_flight.push(Arc::clone(&task));
        Some(task)
    }

    /// Record the outcome of an attempt.
    ///
    /// Success removes the task for good. Failure makes it acquirable again.
    pub(crate) fn acknowledge(&mut self, task: &Task, succeeded: bool) -> Ack {
        let Some(position) = self.position(task) else {
            return Ack::Missing;
        };

        if succeeded {
            self.in_flight.remove(position);
            Ack::Removed
        } else {
            task.record_failure();
            task.set_acquired(false);
            Ack::Requeued
        }
    }

    /// Evict one task to make room, oldest in-flight first, then oldest
    /// pending. The task is flagged evicted; firing its drop callback is left
    /// to the caller.
    pub(crate) fn drop_one(&mut self) -> Option<Arc<Task>> {
        let task = if self.in_flight.is_empty() {
            self.pending.pop_front()?
        } else {
            self.in_flight.remove(0)
        };
        task.mark_evicted();
        tracing::trace!(priority = %self.priority, index = task.index(), "Dropped task from lane");
        Some(task)
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len() + self.in_flight.len()
    }

    fn position(&self, task: &Task) -> Option<usize> {
        self.in_flight
            .iter()
            .position(|candidate| candidate.index() == task.index())
    }
}
