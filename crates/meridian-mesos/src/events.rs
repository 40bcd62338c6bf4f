//! Events published downstream by the plugin.

use chrono::{SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::proto::TaskStatus;
use crate::resources::Resources;

/// Pod health as reported by the cluster manager's health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodHealth {
    Healthy,
    Unhealthy,
}

impl PodHealth {
    /// Wire representation of the health state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Unhealthy => "UNHEALTHY",
        }
    }
}

/// A pod status change forwarded on the pod-event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodEvent {
    /// Pod the event refers to.
    pub pod_id: String,
    /// Observed pod state.
    pub actual_state: String,
    /// Declared goal state, when known to the sender.
    pub desired_state: String,
    /// RFC 3339 timestamp with nanoseconds, UTC.
    pub timestamp: String,
    /// Agent that reported the event.
    pub agent_id: String,
    /// Hostname the pod runs on.
    pub hostname: String,
    /// Free-form message.
    pub message: String,
    /// Machine-readable reason.
    pub reason: String,
    /// Health check verdict.
    pub healthy: PodHealth,
    /// Identifier the cluster manager expects an acknowledgement for. Empty
    /// when no acknowledgement is due.
    pub event_id: String,
}

impl PodEvent {
    /// Builds a pod event from a task status update.
    ///
    /// A missing health report counts as unhealthy, and a missing timestamp
    /// is replaced with the receive time.
    #[must_use]
    pub fn from_task_status(status: &TaskStatus) -> Self {
        let healthy = if status.healthy == Some(true) {
            PodHealth::Healthy
        } else {
            PodHealth::Unhealthy
        };

        let timestamp = status
            .timestamp
            .map_or_else(now_rfc3339_nanos, format_timestamp);

        Self {
            pod_id: status.task_id.clone(),
            actual_state: status.state.pod_state().to_owned(),
            desired_state: String::new(),
            timestamp,
            agent_id: status.agent_id.clone(),
            hostname: status.agent_id.clone(),
            message: status.message.clone(),
            reason: status.reason.clone(),
            healthy,
            event_id: status.uuid.clone(),
        }
    }
}

/// Kind of a host event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostEventKind {
    /// The host's available resources changed.
    UpdateHostAvailableRes,
}

/// A host availability change forwarded on the host-event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEvent {
    /// Host the event refers to.
    pub hostname: String,
    /// Aggregate resources currently pooled for the host.
    pub resources: Resources,
    /// Event kind.
    pub kind: HostEventKind,
}

impl HostEvent {
    /// Builds an available-resources event for a host.
    #[must_use]
    pub fn available_resources(hostname: impl Into<String>, resources: Resources) -> Self {
        Self {
            hostname: hostname.into(),
            resources,
            kind: HostEventKind::UpdateHostAvailableRes,
        }
    }
}

/// Formats a fractional Unix timestamp as RFC 3339 with nanoseconds in UTC,
/// e.g. `2017-01-02T11:00:00.123456789Z`.
fn format_timestamp(unix_secs: f64) -> String {
    let secs = unix_secs.trunc() as i64;
    let nanos = ((unix_secs - unix_secs.trunc()) * 1_000_000_000.0).round() as u32;
    let nanos = nanos.min(999_999_999);
    match Utc.timestamp_opt(secs, nanos).single() {
        Some(instant) => instant.to_rfc3339_opts(SecondsFormat::Nanos, true),
        None => now_rfc3339_nanos(),
    }
}

fn now_rfc3339_nanos() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}
