//! Error types for the queue crate.

use thiserror::Error;

/// Queue errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at its configured capacity.
    #[error("queue limit of {0} reached")]
    LimitReached(usize),

    /// A pop found nothing to return. Non-fatal; callers retry or back off.
    #[error("queue is empty")]
    Empty,
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
