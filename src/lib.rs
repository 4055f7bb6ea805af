//! # anvilq
//!
//! In-process named priority queues for tokio applications.
//!
//! ## Features
//!
//! - **Named queues**: assign a queue once, emit work to it by name
//! - **Three priority lanes**: important work is always picked up first
//! - **Bounded capacity**: inserts fail fast when a queue is full, or evict
//!   equal or lower priority work when overflow is enabled
//! - **Worker pools**: a fixed number of persistent workers per queue
//! - **Retries with backoff**: failed or panicking handlers are retried, with
//!   an optional linear backoff per task
//! - **Observability**: `tracing` events plus per-queue counts and rates
//!
//! ## Quick Start
//!
//! ```rust
//! use anvilq::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> AnvilResult<()> {
//!     let registry = QueueRegistry::new();
//!     registry
//!         .assign("email", Some(QueueConfig::with_workers(4).with_length(1_000)))
//!         .await?;
//!
//!     let (ctx, mut out) = Context::from_fn(Priority::Normal, |_scope, out| async move {
//!         // Your task logic here
//!         let _ = out.send(serde_json::json!({"sent": true}));
//!         Ok(())
//!     });
//!     let ctx = ctx.with_backoff(BackoffPolicy::linear(1.0, 1.0, 30.0));
//!     registry.emit("email", ctx).await?;
//!
//!     assert_eq!(out.recv().await, Some(serde_json::json!({"sent": true})));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod queue;
pub mod task;
pub mod utils;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::core::{QueueEngine, QueueRegistry, assign, emit, get_registry, state};
    pub use crate::error::{AnvilError, AnvilResult};
    pub use crate::metrics::QueueSnapshot;
    pub use crate::queue::BoundedQueue;
    pub use crate::task::{
        Context, OutputReceiver, OutputSender, Priority, TaskHandler, TaskId, handler_fn,
    };
    pub use async_trait::async_trait;
    pub use tokio_util::sync::CancellationToken;
}

pub use crate::config::*;
pub use crate::core::{QueueEngine, QueueRegistry, assign, emit, get_registry, state};
pub use crate::error::{AnvilError, AnvilResult};
pub use crate::metrics::QueueSnapshot;
pub use crate::queue::BoundedQueue;
pub use crate::task::{Context, Priority, TaskHandler, TaskId, handler_fn};
pub use async_trait::async_trait;
