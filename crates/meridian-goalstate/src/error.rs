//! Error types for the goal-state engine.

use thiserror::Error;

/// Engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The run was cancelled by engine stop or by the plan's own timeout.
    /// Retryable: the entity is rescheduled with backoff.
    #[error("entity run cancelled")]
    Canceled,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
