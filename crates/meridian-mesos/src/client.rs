//! Scheduler client abstraction.

use async_trait::async_trait;

use crate::error::Result;
use crate::proto::Call;

/// Transport to the cluster manager's scheduler API.
///
/// The plugin issues every accept, kill, and acknowledge call through this
/// trait; implementations own framing, sessions, and reconnection. Failures
/// surface as [`MesosError::Transport`](crate::MesosError::Transport) and are
/// retried by the callers' own policies.
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Issues a call to the cluster manager.
    async fn call(&self, call: Call) -> Result<()>;
}
