//! Named queue registry.
//!
//! The registry binds queue names to running [`QueueEngine`]s. A name is bound
//! at most once for the lifetime of the registry; there is no unassign.
//!
//! A process-wide instance is available through [`get_registry`]. It is
//! created on first access and lives until the process exits, so the workers
//! of queues assigned there run for as long as the tokio runtime does. Tests
//! and embedders that need isolation create their own [`QueueRegistry`].
//!
//! # Examples
//!
//! ```rust
//! use anvilq::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> AnvilResult<()> {
//! let registry = QueueRegistry::new();
//! registry.assign("mail", Some(QueueConfig::with_workers(2))).await?;
//!
//! let (ctx, _out) = Context::from_fn(Priority::Normal, |_, _| async { Ok(()) });
//! registry.emit("mail", ctx).await?;
//!
//! assert!(registry.state("mail").await.is_some());
//! # Ok(())
//! # }
//! ```

use crate::config::QueueConfig;
use crate::core::engine::QueueEngine;
use crate::error::{AnvilError, AnvilResult};
use crate::metrics::QueueSnapshot;
use crate::task::{Context, TaskId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

/// Registry of named queues.
pub struct QueueRegistry {
    /// Running engines by queue name
    queues: RwLock<HashMap<String, Arc<QueueEngine>>>,
    /// Configuration used when `assign` gets none
    defaults: QueueConfig,
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueRegistry {
    /// Create an empty registry with the default queue configuration.
    pub fn new() -> Self {
        Self::with_defaults(QueueConfig::default())
    }

    /// Create an empty registry that falls back to `defaults`.
    pub fn with_defaults(defaults: QueueConfig) -> Self {
        tracing::debug!("Creating new queue registry");
        Self {
            queues: RwLock::new(HashMap::new()),
            defaults,
        }
    }

    /// Configuration applied to queues assigned without one.
    pub fn defaults(&self) -> &QueueConfig {
        &self.defaults
    }

    /// Create a queue under `name` and start its workers.
    ///
    /// Fails with [`AnvilError::ConfigError`] for an invalid configuration and
    /// with [`AnvilError::QueueAlreadyExists`] if the name is taken. Neither
    /// failure touches an existing queue.
    pub async fn assign(&self, name: &str, config: Option<QueueConfig>) -> AnvilResult<()> {
        let config = config.unwrap_or_else(|| self.defaults.clone());

        let mut queues = self.queues.write().await;
        if queues.contains_key(name) {
            tracing::warn!("Queue '{}' is already assigned", name);
            return Err(AnvilError::QueueAlreadyExists {
                name: name.to_string(),
            });
        }

        let engine = QueueEngine::start(name, config)?;
        queues.insert(name.to_string(), Arc::new(engine));

        tracing::info!("Assigned queue '{}'", name);
        Ok(())
    }

    /// Submit a context to the queue bound to `name`, at the context's own
    /// priority.
    pub async fn emit(&self, name: &str, ctx: Context) -> AnvilResult<TaskId> {
        let engine = self.engine(name).await.ok_or_else(|| {
            tracing::debug!("Emit to unassigned queue '{}'", name);
            AnvilError::QueueNotFound {
                name: name.to_string(),
            }
        })?;
        engine.insert(ctx).await
    }

    /// Metrics snapshot of the queue bound to `name`.
    pub async fn state(&self, name: &str) -> Option<QueueSnapshot> {
        let engine = self.engine(name).await?;
        Some(engine.snapshot().await)
    }

    /// Running engine bound to `name`.
    pub async fn engine(&self, name: &str) -> Option<Arc<QueueEngine>> {
        self.queues.read().await.get(name).cloned()
    }

    /// Check if a queue name is bound.
    pub async fn contains(&self, name: &str) -> bool {
        self.queues.read().await.contains_key(name)
    }

    /// Get all assigned queue names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of assigned queues.
    pub async fn queue_count(&self) -> usize {
        self.queues.read().await.len()
    }
}

/// Global singleton registry instance.
static QUEUE_REGISTRY: OnceLock<QueueRegistry> = OnceLock::new();

/// Get the global queue registry instance.
///
/// The registry is initialized on first access with the default queue
/// configuration.
pub fn get_registry() -> &'static QueueRegistry {
    QUEUE_REGISTRY.get_or_init(|| {
        tracing::debug!("Initializing global queue registry");
        QueueRegistry::new()
    })
}
