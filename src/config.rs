//! Configuration types for anvilq.
//!
//! This module contains the configuration structures used throughout anvilq:
//! per-queue settings, retry backoff policies, and logging.

use crate::utils::secs_to_duration;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for any configured delay (poll interval or backoff), in seconds.
pub const MAX_DELAY_SECS: f64 = 86_400.0;

/// Main configuration for anvilq.
///
/// Holds the default settings applied to queues assigned without an explicit
/// configuration, plus logging settings.
///
/// # Examples
///
/// ```rust
/// use anvilq::config::{AnvilConfig, QueueConfig};
///
/// // Use default configuration
/// let config = AnvilConfig::default();
///
/// // Custom configuration
/// let config = AnvilConfig {
///     queue: QueueConfig {
///         workers: 8,
///         length: 10_000,
///         overflow: true,
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnvilConfig {
    /// Settings for queues assigned without their own configuration
    pub queue: QueueConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Per-queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of persistent workers draining the queue
    pub workers: usize,

    /// Maximum number of outstanding (pending + in-flight) tasks
    pub length: usize,

    /// How long an idle worker sleeps before polling again (in seconds)
    pub interval_secs: f64,

    /// Whether a full queue may evict a task of equal or lower priority
    pub overflow: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 100,
            length: 100,
            interval_secs: 1.0,
            overflow: false,
        }
    }
}

impl QueueConfig {
    /// Create a queue configuration with a specific number of workers.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Set the queue length.
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Set the idle poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_secs = interval.as_secs_f64();
        self
    }

    /// Enable or disable overflow eviction.
    pub fn with_overflow(mut self, overflow: bool) -> Self {
        self.overflow = overflow;
        self
    }

    /// Idle poll interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        secs_to_duration(self.interval_secs)
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.workers == 0 {
            errors.push("Number of workers must be greater than 0".to_string());
        }

        if self.length == 0 {
            errors.push("Queue length must be greater than 0".to_string());
        }

        if !(self.interval_secs.is_finite() && self.interval_secs > 0.0) {
            errors.push("Poll interval must be a positive number of seconds".to_string());
        } else if self.interval_secs > MAX_DELAY_SECS {
            errors.push(format!(
                "Poll interval must not exceed {MAX_DELAY_SECS} seconds"
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Linear retry backoff attached to a submitted task.
///
/// Each retry after the first waits `retry * factor * backoff_secs` seconds,
/// capped at `max_backoff_secs`. A `factor` of zero retries immediately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Base delay unit (in seconds)
    pub backoff_secs: f64,

    /// Growth factor applied per retry
    pub factor: f64,

    /// Ceiling for the delay (in seconds)
    pub max_backoff_secs: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            backoff_secs: 1.0,
            factor: 1.0,
            max_backoff_secs: 60.0,
        }
    }
}

impl BackoffPolicy {
    /// Create a linear backoff policy.
    pub fn linear(backoff_secs: f64, factor: f64, max_backoff_secs: f64) -> Self {
        Self {
            backoff_secs,
            factor,
            max_backoff_secs,
        }
    }

    /// Retry immediately, without any delay.
    pub fn none() -> Self {
        Self {
            factor: 0.0,
            ..Default::default()
        }
    }

    /// Validate the policy and return any errors.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("Backoff base delay", self.backoff_secs),
            ("Backoff factor", self.factor),
            ("Backoff max delay", self.max_backoff_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                errors.push(format!("{name} must be a non-negative number"));
            }
        }

        for (name, value) in [
            ("Backoff base delay", self.backoff_secs),
            ("Backoff max delay", self.max_backoff_secs),
        ] {
            if value > MAX_DELAY_SECS {
                errors.push(format!("{name} must not exceed {MAX_DELAY_SECS} seconds"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: LogLevel,

    /// Enable structured JSON logging
    pub json_format: bool,

    /// Enable colored output (ignored if json_format is true)
    pub colored: bool,

    /// Include timestamps in logs
    pub include_timestamps: bool,

    /// Include target module in logs
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            colored: true,
            include_timestamps: true,
            include_targets: false,
        }
    }
}

/// Log level enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl AnvilConfig {
    /// Create a new configuration optimized for development.
    pub fn development() -> Self {
        Self {
            queue: QueueConfig {
                workers: 2,
                length: 1000,
                interval_secs: 0.1,
                overflow: false,
            },
            logging: LoggingConfig {
                level: LogLevel::Debug,
                colored: true,
                include_targets: true,
                ..Default::default()
            },
        }
    }

    /// Create a new configuration optimized for production.
    pub fn production() -> Self {
        Self {
            queue: QueueConfig {
                workers: num_cpus::get() * 2,
                length: 10_000,
                interval_secs: 1.0,
                overflow: true,
            },
            logging: LoggingConfig {
                level: LogLevel::Info,
                json_format: true,
                colored: false,
                include_timestamps: true,
                include_targets: false,
            },
        }
    }

    /// Create a configuration for testing.
    pub fn testing() -> Self {
        Self {
            queue: QueueConfig {
                workers: 1,
                length: 100,
                interval_secs: 0.01,
                overflow: false,
            },
            logging: LoggingConfig {
                level: LogLevel::Debug,
                colored: false,
                include_timestamps: false,
                include_targets: true,
                ..Default::default()
            },
        }
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(queue_errors) = self.queue.validate() {
            errors.extend(queue_errors);
        }

        if self.queue.workers > 10_000 {
            errors.push("Number of workers should not exceed 10000".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
