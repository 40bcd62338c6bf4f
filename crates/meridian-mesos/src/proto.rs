//! Mirror types for the cluster-manager wire surface.
//!
//! These are the calls the plugin emits and the events it consumes, kept as
//! plain data. The actual codec and transport live behind
//! [`SchedulerClient`](crate::client::SchedulerClient).

use serde::{Deserialize, Serialize};

/// A resource entry on an offer or task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name: `cpus`, `mem`, `disk`, `gpus`, `ports`.
    pub name: String,
    /// Scalar amount or port ranges.
    pub value: ResourceValue,
}

impl Resource {
    /// Creates a scalar resource.
    #[must_use]
    pub fn scalar(name: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Scalar(amount),
        }
    }
}

/// Value carried by a [`Resource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceValue {
    /// A scalar amount (cpus, mem in MB, disk in MB, gpus).
    Scalar(f64),
    /// Inclusive `[begin, end]` ranges (ports).
    Ranges(Vec<(u64, u64)>),
}

/// A resource offer on a specific host, valid until consumed, rescinded, or
/// aged out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Offer identifier, unique cluster-wide.
    pub id: String,
    /// Agent the offer originates from.
    pub agent_id: String,
    /// Hostname the agent runs on.
    pub hostname: String,
    /// Resources granted by the offer.
    pub resources: Vec<Resource>,
}

/// Task description submitted with a launch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Human-readable task name.
    pub name: String,
    /// Task identifier; the pod id it was built from.
    pub task_id: String,
    /// Agent the task is bound to.
    pub agent_id: String,
    /// Resources the task claims.
    pub resources: Vec<Resource>,
}

/// One launch operation carried by an accept call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    /// Tasks to launch against the accepted offers.
    pub task_infos: Vec<TaskInfo>,
}

/// Calls the plugin issues to the cluster manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Call {
    /// Accept offers and launch tasks against them.
    Accept {
        /// Every offer id being consumed; all must be on the same host.
        offer_ids: Vec<String>,
        /// The single launch operation.
        launch: Launch,
    },
    /// Kill a running task.
    Kill {
        /// Task to kill.
        task_id: String,
    },
    /// Acknowledge a task status update.
    Acknowledge {
        /// Agent that reported the update.
        agent_id: String,
        /// Task the update refers to.
        task_id: String,
        /// Opaque update identifier being acknowledged.
        uuid: String,
    },
}

/// Events the cluster manager delivers to the plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// New resource offers.
    Offers { offers: Vec<Offer> },
    /// A previously sent offer is no longer valid.
    Rescind { offer_id: String },
    /// A task changed state.
    Update { status: TaskStatus },
}

/// Task state as reported by the cluster manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
    Error,
}

impl TaskState {
    /// Maps the cluster-manager task state onto the pod state vocabulary
    /// published on the pod-event channel.
    #[must_use]
    pub const fn pod_state(self) -> &'static str {
        match self {
            Self::Staging => "LAUNCHED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Finished => "SUCCEEDED",
            Self::Failed | Self::Error => "FAILED",
            Self::Killed => "KILLED",
            Self::Lost => "LOST",
        }
    }
}

/// A task status update delivered with [`Event::Update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Task the update refers to.
    pub task_id: String,
    /// Agent that reported the update.
    pub agent_id: String,
    /// Reported state.
    pub state: TaskState,
    /// Health check result, when the task has one configured.
    pub healthy: Option<bool>,
    /// Free-form status message.
    pub message: String,
    /// Machine-readable reason.
    pub reason: String,
    /// Unix timestamp of the update, fractional seconds.
    pub timestamp: Option<f64>,
    /// Identifier to acknowledge the update with. Empty when the update does
    /// not require an acknowledgement.
    pub uuid: String,
}

/// A pod ready to be launched on a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchablePod {
    /// Pod identifier; becomes the task id.
    pub pod_id: String,
    /// The pod's spec.
    pub spec: PodSpec,
}

/// Minimal pod spec the launch path consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    /// Pod name.
    pub name: String,
    /// CPUs requested.
    pub cpu: f64,
    /// Memory requested, MB.
    pub mem_mb: f64,
    /// Disk requested, MB.
    pub disk_mb: f64,
    /// GPUs requested.
    pub gpu: f64,
}

impl PodSpec {
    /// Creates a spec with the given name and cpu/mem demand and no disk or
    /// gpu requirement.
    #[must_use]
    pub fn new(name: impl Into<String>, cpu: f64, mem_mb: f64) -> Self {
        Self {
            name: name.into(),
            cpu,
            mem_mb,
            disk_mb: 0.0,
            gpu: 0.0,
        }
    }
}
