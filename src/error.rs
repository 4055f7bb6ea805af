//! Error types for anvilq operations.

use thiserror::Error;

/// Result type used throughout anvilq.
pub type AnvilResult<T> = Result<T, AnvilError>;

/// Main error type for anvilq operations.
#[derive(Error, Debug)]
pub enum AnvilError {
    /// Priority level outside the three defined lanes
    #[error("Invalid priority level {level} (expected 0 = low, 1 = normal, 2 = important)")]
    InvalidPriority {
        /// The rejected level
        level: i64,
    },

    /// Capacity exhausted and nothing eligible for eviction
    #[error("Queue is full (capacity: {capacity})")]
    QueueFull {
        /// Configured queue length
        capacity: usize,
    },

    /// Emit or lookup against an unbound queue name
    #[error("Queue '{name}' not found")]
    QueueNotFound {
        /// The queue name that wasn't found
        name: String,
    },

    /// Assign against a name that is already bound
    #[error("Queue '{name}' already exists")]
    QueueAlreadyExists {
        /// The queue name that is already taken
        name: String,
    },

    /// Task handler reported a failure; the task will be retried
    #[error("Task execution failed: {message}")]
    TaskFailed {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Error message
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AnvilError {
    /// Create a handler failure with just a message
    pub fn task_failed(message: impl Into<String>) -> Self {
        Self::TaskFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a handler failure wrapping an underlying error
    pub fn task_error<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TaskFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AnvilError::QueueFull { capacity: 3 };
        assert_eq!(err.to_string(), "Queue is full (capacity: 3)");

        let err = AnvilError::QueueNotFound {
            name: "mail".to_string(),
        };
        assert_eq!(err.to_string(), "Queue 'mail' not found");
    }

    #[test]
    fn test_task_error_keeps_source() {
        let io = std::io::Error::other("disk on fire");
        let err = AnvilError::task_error("write failed", io);
        assert!(matches!(err, AnvilError::TaskFailed { .. }));
        assert!(std::error::Error::source(&err).is_some());

        let err = AnvilError::task_failed("nope");
        assert!(std::error::Error::source(&err).is_none());
    }
}
