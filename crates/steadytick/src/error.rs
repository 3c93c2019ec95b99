//! Error types for the interval timer.
//!
//! Only [`TimerError::Disposed`] is produced by normal use; the remaining
//! variants cover thread creation and configuration input.

use thiserror::Error;

/// Errors that can occur while configuring or controlling a timer.
#[derive(Debug, Error)]
pub enum TimerError {
    /// The timer was disposed and cannot be started again.
    #[error("Timer has been disposed")]
    Disposed,

    /// The operating system refused to create the worker thread.
    #[error("Failed to spawn timer worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl TimerError {
    /// Create a worker spawn error.
    #[must_use]
    pub fn worker_spawn(source: std::io::Error) -> Self {
        Self::WorkerSpawn(source)
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Whether this error means the timer is permanently unusable.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }
}

/// A specialized `Result` type for timer operations.
pub type TimerResult<T = ()> = std::result::Result<T, TimerError>;
