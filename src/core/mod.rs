//! Queue engines, their workers and the named registry.
//!
//! The free functions [`assign`], [`emit`] and [`state`] operate on the
//! process-wide registry returned by [`get_registry`].
//!
//! # Examples
//!
//! ```rust
//! use anvilq::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> AnvilResult<()> {
//!     assign("thumbnails", Some(QueueConfig::with_workers(4).with_overflow(true))).await?;
//!
//!     let (ctx, mut out) = Context::from_fn(Priority::Important, |_scope, out| async move {
//!         let _ = out.send(serde_json::json!({"resized": true}));
//!         Ok(())
//!     });
//!     emit("thumbnails", ctx).await?;
//!
//!     assert_eq!(out.recv().await, Some(serde_json::json!({"resized": true})));
//!     Ok(())
//! }
//! ```

use crate::config::QueueConfig;
use crate::error::AnvilResult;
use crate::metrics::QueueSnapshot;
use crate::task::{Context, TaskId};

pub mod engine;
pub mod registry;
pub mod worker;

pub use engine::QueueEngine;
pub use registry::{QueueRegistry, get_registry};
pub use worker::{Worker, WorkerPool, WorkerStep};

/// Create a named queue in the global registry and start its workers.
///
/// Without a configuration the registry defaults apply.
pub async fn assign(name: &str, config: Option<QueueConfig>) -> AnvilResult<()> {
    get_registry().assign(name, config).await
}

/// Submit a context to a named queue of the global registry.
pub async fn emit(name: &str, ctx: Context) -> AnvilResult<TaskId> {
    get_registry().emit(name, ctx).await
}

/// Metrics snapshot of a named queue of the global registry.
pub async fn state(name: &str) -> Option<QueueSnapshot> {
    get_registry().state(name).await
}
