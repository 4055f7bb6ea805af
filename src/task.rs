//! Task definition, submission context and execution traits.

use crate::config::BackoffPolicy;
use crate::error::{AnvilError, AnvilResult};
use crate::utils::{next_backoff, secs_to_duration};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Unique identifier for a submitted task
pub type TaskId = String;

/// Producer side of a task's output stream, handed to the handler
pub type OutputSender = mpsc::UnboundedSender<serde_json::Value>;

/// Caller side of a task's output stream
pub type OutputReceiver = mpsc::UnboundedReceiver<serde_json::Value>;

/// Callback fired when a task is evicted without running to completion
pub type DropCallback = Box<dyn FnOnce() + Send + 'static>;

/// Priority lanes, lowest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    /// Background work, drained last
    Low = 0,
    /// Default priority
    #[default]
    Normal = 1,
    /// Drained before everything else
    Important = 2,
}

impl Priority {
    /// All priorities from lowest to highest.
    pub const ASCENDING: [Priority; 3] = [Priority::Low, Priority::Normal, Priority::Important];

    /// All priorities from highest to lowest (acquire order).
    pub const DESCENDING: [Priority; 3] = [Priority::Important, Priority::Normal, Priority::Low];

    /// Lane index of this priority.
    pub fn lane(self) -> usize {
        self as usize
    }

    /// Numeric level of this priority.
    pub fn level(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for Priority {
    type Error = AnvilError;

    fn try_from(level: i64) -> AnvilResult<Self> {
        match level {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::Important),
            _ => Err(AnvilError::InvalidPriority { level }),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::Important => "important",
        };
        f.write_str(name)
    }
}

/// Trait for the unit of work carried by a task.
///
/// The handler receives the caller's cancellation scope and the producer end
/// of the task's output stream. Returning `Ok(())` acknowledges the task;
/// returning an error requeues it for another attempt. A handler may run
/// several times, so it takes `&self`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute one attempt of the task.
    async fn forge(&self, scope: CancellationToken, out: OutputSender) -> AnvilResult<()>;
}

/// Adapter turning an async closure into a [`TaskHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(CancellationToken, OutputSender) -> Fut + Send + Sync,
    Fut: Future<Output = AnvilResult<()>> + Send,
{
    async fn forge(&self, scope: CancellationToken, out: OutputSender) -> AnvilResult<()> {
        (self.0)(scope, out).await
    }
}

/// Wrap an async closure as a shareable task handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(CancellationToken, OutputSender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AnvilResult<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A unit of work as built by the producer.
///
/// # Examples
///
/// ```rust
/// use anvilq::prelude::*;
///
/// let (ctx, mut out) = Context::from_fn(Priority::Important, |_scope, out| async move {
///     let _ = out.send(serde_json::json!({"progress": 100}));
///     Ok(())
/// });
/// let ctx = ctx
///     .with_backoff(BackoffPolicy::linear(0.5, 1.0, 10.0))
///     .with_dropped(|| tracing::warn!("evicted"));
/// assert_eq!(ctx.priority(), Priority::Important);
/// # drop(out.try_recv());
/// ```
pub struct Context {
    id: TaskId,
    priority: Priority,
    handler: Arc<dyn TaskHandler>,
    dropped: Option<DropCallback>,
    backoff: Option<BackoffPolicy>,
    scope: CancellationToken,
    out: OutputSender,
}

impl Context {
    /// Build a context around a handler, returning it with its output stream.
    pub fn new(priority: Priority, handler: Arc<dyn TaskHandler>) -> (Self, OutputReceiver) {
        let (out, rx) = mpsc::unbounded_channel();
        let ctx = Self {
            id: uuid::Uuid::new_v4().to_string(),
            priority,
            handler,
            dropped: None,
            backoff: None,
            scope: CancellationToken::new(),
            out,
        };
        (ctx, rx)
    }

    /// Build a context around an async closure.
    pub fn from_fn<F, Fut>(priority: Priority, f: F) -> (Self, OutputReceiver)
    where
        F: Fn(CancellationToken, OutputSender) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AnvilResult<()>> + Send + 'static,
    {
        Self::new(priority, handler_fn(f))
    }

    /// Set the callback fired if the task is evicted.
    pub fn with_dropped<F>(mut self, dropped: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.dropped = Some(Box::new(dropped));
        self
    }

    /// Attach a retry backoff policy.
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = Some(policy);
        self
    }

    /// Run the handler under the caller's cancellation scope.
    pub fn with_scope(mut self, scope: CancellationToken) -> Self {
        self.scope = scope;
        self
    }

    /// Identifier assigned at construction.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Declared priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Attached backoff policy, if any.
    pub fn backoff(&self) -> Option<&BackoffPolicy> {
        self.backoff.as_ref()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("backoff", &self.backoff)
            .field("has_dropped", &self.dropped.is_some())
            .finish_non_exhaustive()
    }
}

/// Retry bookkeeping of a single task.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BackoffState {
    /// Delay applied before the latest retry (in seconds)
    pub delay: f64,
    /// Retry counter driving the linear growth
    pub retry: u32,
}

impl BackoffState {
    /// Advance to the next retry and return how long to wait before it.
    ///
    /// The first retry is free: it only arms the counter. Later retries grow
    /// linearly by `factor * backoff_secs` and saturate at the policy's cap.
    pub fn advance(&mut self, policy: &BackoffPolicy) -> Option<Duration> {
        if self.retry == 0 {
            self.retry = 1;
            return None;
        }

        let (delay, retry) = next_backoff(
            0.0,
            policy.factor,
            policy.backoff_secs,
            policy.max_backoff_secs,
            self.retry,
        );
        self.delay = delay;
        self.retry = retry;
        Some(secs_to_duration(delay))
    }
}

/// Attempt and eviction state, guarded together so an attempt can never
/// start once the task is evicted.
struct Lifecycle {
    running: bool,
    dropped: Option<DropCallback>,
}

/// Engine-side wrapper around a submitted [`Context`].
pub struct Task {
    id: TaskId,
    index: u64,
    priority: Priority,
    handler: Arc<dyn TaskHandler>,
    scope: CancellationToken,
    out: OutputSender,
    backoff: Option<BackoffPolicy>,
    lifecycle: Mutex<Lifecycle>,
    retry: tokio::sync::Mutex<BackoffState>,
    acquired: AtomicBool,
    evicted: AtomicBool,
    failures: AtomicU32,
}

impl Task {
    /// Wrap `ctx` for the lane of `priority`. The lane, not the context,
    /// decides where the task lives.
    pub(crate) fn new(index: u64, priority: Priority, ctx: Context) -> Self {
        Self {
            id: ctx.id,
            index,
            priority,
            handler: ctx.handler,
            scope: ctx.scope,
            out: ctx.out,
            backoff: ctx.backoff,
            lifecycle: Mutex::new(Lifecycle {
                running: false,
                dropped: ctx.dropped,
            }),
            retry: tokio::sync::Mutex::new(BackoffState::default()),
            acquired: AtomicBool::new(false),
            evicted: AtomicBool::new(false),
            failures: AtomicU32::new(0),
        }
    }

    /// Identifier of the originating context.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Insertion index within its lane.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Lane the task lives in.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Whether the task is checked out to a worker.
    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    pub(crate) fn set_acquired(&self, acquired: bool) {
        self.acquired.store(acquired, Ordering::Release);
    }

    /// Whether the task was evicted; an evicted task never runs again.
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    /// Number of failed attempts so far.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    pub(crate) fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flag the task evicted. Returns `false` if it already was.
    ///
    /// The drop callback is not fired here; see [`Task::release_dropped`].
    pub(crate) fn mark_evicted(&self) -> bool {
        let _lifecycle = self.lifecycle();
        !self.evicted.swap(true, Ordering::AcqRel)
    }

    /// Fire the drop callback of an evicted task.
    ///
    /// While an attempt is running the callback is deferred until
    /// [`Task::finish_attempt`], so it never fires before a handler that is
    /// still executing. Fires at most once.
    pub(crate) fn release_dropped(&self) {
        let callback = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.running || !self.is_evicted() {
                return;
            }
            lifecycle.dropped.take()
        };
        if let Some(callback) = callback {
            spawn_drop_callback(self.id.clone(), callback);
        }
    }

    /// Mark an attempt as started. Returns `false` if the task was evicted.
    pub(crate) fn begin_attempt(&self) -> bool {
        let mut lifecycle = self.lifecycle();
        if self.is_evicted() {
            return false;
        }
        lifecycle.running = true;
        true
    }

    /// Mark the running attempt as over, firing a deferred drop callback.
    pub(crate) fn finish_attempt(&self) {
        self.lifecycle().running = false;
        self.release_dropped();
    }

    /// Delay to apply before this attempt, advancing the retry state.
    ///
    /// Only retries consult the policy; tasks without one retry immediately.
    pub(crate) async fn next_delay(&self) -> Option<Duration> {
        if self.failures() == 0 {
            return None;
        }
        let policy = self.backoff.as_ref()?;
        let mut state = self.retry.lock().await;
        state.advance(policy)
    }

    /// Current retry bookkeeping.
    pub async fn backoff_state(&self) -> BackoffState {
        *self.retry.lock().await
    }

    /// Handler plus the arguments of one attempt.
    pub(crate) fn attempt(&self) -> (Arc<dyn TaskHandler>, CancellationToken, OutputSender) {
        (
            Arc::clone(&self.handler),
            self.scope.clone(),
            self.out.clone(),
        )
    }
}

/// Run a drop callback off the caller's thread.
///
/// Uses the blocking pool of the current tokio runtime when there is one and a
/// dedicated thread otherwise, so eviction works under any executor.
fn spawn_drop_callback(task_id: TaskId, callback: DropCallback) {
    let run = move || {
        tracing::debug!(task_id = %task_id, "Running drop callback");
        callback();
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(run);
        }
        Err(_) => {
            if let Err(e) = std::thread::Builder::new()
                .name("anvilq-drop".to_string())
                .spawn(run)
            {
                tracing::error!("Failed to spawn drop callback thread: {}", e);
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("priority", &self.priority)
            .field("acquired", &self.is_acquired())
            .field("evicted", &self.is_evicted())
            .field("failures", &self.failures())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn noop_context(priority: Priority) -> Context {
        Context::from_fn(priority, |_, _| async { Ok(()) }).0
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Important > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(Priority::Important.lane(), 2);
        assert_eq!(Priority::DESCENDING[0], Priority::Important);
    }

    #[test]
    fn test_priority_from_level() {
        assert_eq!(Priority::try_from(0).unwrap(), Priority::Low);
        assert_eq!(Priority::try_from(2).unwrap(), Priority::Important);
        assert!(matches!(
            Priority::try_from(3),
            Err(AnvilError::InvalidPriority { level: 3 })
        ));
        assert!(matches!(
            Priority::try_from(-1),
            Err(AnvilError::InvalidPriority { level: -1 })
        ));
    }

    #[test]
    fn test_context_builders() {
        let (ctx, _rx) = Context::from_fn(Priority::Low, |_, _| async { Ok(()) });
        assert!(ctx.backoff().is_none());
        assert!(!ctx.id().is_empty());

        let ctx = ctx
            .with_backoff(BackoffPolicy::linear(1.0, 1.0, 5.0))
            .with_dropped(|| {});
        assert_eq!(ctx.backoff().map(|b| b.max_backoff_secs), Some(5.0));
        assert!(format!("{:?}", ctx).contains("has_dropped: true"));
    }

    #[test]
    fn test_backoff_state_linear_series() {
        let policy = BackoffPolicy::linear(1.0, 1.0, 5.0);
        let mut state = BackoffState::default();

        // first retry is free
        assert_eq!(state.advance(&policy), None);
        assert_eq!(state.retry, 1);

        let delays: Vec<f64> = (0..6)
            .map(|_| state.advance(&policy).unwrap().as_secs_f64())
            .collect();
        assert_eq!(delays, vec![1.0, 2.0, 3.0, 4.0, 5.0, 5.0]);
        // the counter stopped advancing once the cap kicked in
        assert_eq!(state.retry, 6);
        assert_eq!(state.delay, 5.0);
    }

    #[test]
    fn test_backoff_state_zero_factor() {
        let policy = BackoffPolicy::none();
        let mut state = BackoffState::default();
        assert_eq!(state.advance(&policy), None);
        for expected_retry in 2..6 {
            assert_eq!(state.advance(&policy), Some(Duration::ZERO));
            assert_eq!(state.retry, expected_retry);
        }
    }

    #[tokio::test]
    async fn test_next_delay_only_on_retries() {
        let ctx = noop_context(Priority::Normal).with_backoff(BackoffPolicy::linear(0.5, 1.0, 1.0));
        let task = Task::new(1, Priority::Normal, ctx);

        assert_eq!(task.next_delay().await, None);

        task.record_failure();
        assert_eq!(task.next_delay().await, None); // free retry
        task.record_failure();
        assert_eq!(task.next_delay().await, Some(Duration::from_millis(500)));
        task.record_failure();
        assert_eq!(task.next_delay().await, Some(Duration::from_secs(1)));
        assert_eq!(task.backoff_state().await.retry, 3);
    }

    #[tokio::test]
    async fn test_next_delay_without_policy() {
        let task = Task::new(1, Priority::Normal, noop_context(Priority::Normal));
        task.record_failure();
        task.record_failure();
        assert_eq!(task.next_delay().await, None);
    }

    fn counted_drop(priority: Priority) -> (Context, Arc<AtomicUsize>, mpsc::UnboundedReceiver<()>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let counter = Arc::clone(&fired);
        let ctx = noop_context(priority).with_dropped(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        });
        (ctx, fired, rx)
    }

    #[tokio::test]
    async fn test_evict_fires_callback_once() {
        let (ctx, fired, mut rx) = counted_drop(Priority::Low);
        let task = Task::new(7, Priority::Low, ctx);

        assert!(task.mark_evicted());
        assert!(!task.mark_evicted());
        assert!(task.is_evicted());
        task.release_dropped();
        task.release_dropped();

        rx.recv().await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // sender moved into the callback is gone, so the channel closes
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_release_without_eviction_keeps_callback() {
        let (ctx, fired, mut rx) = counted_drop(Priority::Low);
        let task = Task::new(1, Priority::Low, ctx);

        task.release_dropped();
        assert!(task.begin_attempt());
        task.finish_attempt();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_callback_waits_for_running_attempt() {
        let (ctx, fired, mut rx) = counted_drop(Priority::Normal);
        let task = Task::new(1, Priority::Normal, ctx);

        assert!(task.begin_attempt());
        assert!(task.mark_evicted());
        task.release_dropped();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        task.finish_attempt();
        rx.recv().await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // no further attempt can start
        assert!(!task.begin_attempt());
    }

    #[test]
    fn test_callback_runs_without_runtime() {
        let (tx, rx) = std::sync::mpsc::channel();
        let ctx = noop_context(Priority::Low).with_dropped(move || {
            let _ = tx.send(());
        });
        let task = Task::new(1, Priority::Low, ctx);

        assert!(task.mark_evicted());
        task.release_dropped();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_task_takes_lane_priority() {
        let task = Task::new(1, Priority::Important, noop_context(Priority::Low));
        assert_eq!(task.priority(), Priority::Important);
    }

    #[tokio::test]
    async fn test_handler_streams_output() {
        let (ctx, mut rx) = Context::from_fn(Priority::Normal, |_scope, out| async move {
            out.send(serde_json::json!(1))
                .map_err(|e| AnvilError::task_error("send", e))?;
            out.send(serde_json::json!(2))
                .map_err(|e| AnvilError::task_error("send", e))?;
            Ok::<(), AnvilError>(())
        });
        let task = Task::new(1, Priority::Normal, ctx);
        let (handler, scope, out) = task.attempt();
        handler.forge(scope, out).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), serde_json::json!(1));
        assert_eq!(rx.recv().await.unwrap(), serde_json::json!(2));
    }
}
