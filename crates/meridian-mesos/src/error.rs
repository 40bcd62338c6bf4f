//! Error types for the Mesos plugin.

use thiserror::Error;

/// Plugin errors.
#[derive(Error, Debug)]
pub enum MesosError {
    /// No offers are pooled for the requested host. The caller retries with
    /// fresh placement.
    #[error("no offer found to launch pods on {0}")]
    NoOffer(String),

    /// The scheduler client failed to reach the cluster manager.
    #[error("transport error: {0}")]
    Transport(String),

    /// A downstream event channel has been closed.
    #[error("event channel closed")]
    ChannelClosed,
}

/// Result type for plugin operations.
pub type Result<T> = std::result::Result<T, MesosError>;
