//! Test fixtures for plugin integration tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use meridian_mesos::{
    Call, MesosConfig, MesosError, MesosManager, Offer, SchedulerClient,
};
use meridian_mesos::events::{HostEvent, PodEvent};
use meridian_mesos::proto::Resource;

/// Client that records every call and succeeds.
#[derive(Default)]
pub struct RecordingClient {
    calls: Mutex<Vec<Call>>,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl SchedulerClient for RecordingClient {
    async fn call(&self, call: Call) -> meridian_mesos::Result<()> {
        self.calls.lock().push(call);
        Ok(())
    }
}

/// Client that fails every call with a transport error.
pub struct FailingClient;

#[async_trait]
impl SchedulerClient for FailingClient {
    async fn call(&self, _call: Call) -> meridian_mesos::Result<()> {
        Err(MesosError::Transport("injected failure".to_owned()))
    }
}

/// Client that records the call, then parks until released. Used to hold an
/// acknowledgement in flight.
pub struct GatedClient {
    calls: Mutex<Vec<Call>>,
    release: Notify,
}

impl GatedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            release: Notify::new(),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn release_one(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl SchedulerClient for GatedClient {
    async fn call(&self, call: Call) -> meridian_mesos::Result<()> {
        self.calls.lock().push(call);
        self.release.notified().await;
        Ok(())
    }
}

/// A plugin wired to fresh event channels and the given client.
pub struct TestPlugin {
    pub manager: MesosManager,
    pub pod_events: mpsc::Receiver<PodEvent>,
    pub host_events: mpsc::Receiver<HostEvent>,
}

impl TestPlugin {
    pub fn new(config: MesosConfig, client: Arc<dyn SchedulerClient>) -> Self {
        let (pod_tx, pod_rx) = mpsc::channel(64);
        let (host_tx, host_rx) = mpsc::channel(64);
        Self {
            manager: MesosManager::new(config, client, pod_tx, host_tx),
            pod_events: pod_rx,
            host_events: host_rx,
        }
    }

    pub fn with_client(client: Arc<dyn SchedulerClient>) -> Self {
        Self::new(MesosConfig::default(), client)
    }
}

/// Builds an offer with cpu/mem resources.
pub fn offer(id: &str, hostname: &str, cpu: f64, mem_mb: f64) -> Offer {
    Offer {
        id: id.to_owned(),
        agent_id: format!("agent-{hostname}"),
        hostname: hostname.to_owned(),
        resources: vec![
            Resource::scalar("cpus", cpu),
            Resource::scalar("mem", mem_mb),
        ],
    }
}

/// Builds a pod event carrying only the fields the ack path reads.
pub fn ack_event(event_id: &str) -> PodEvent {
    PodEvent {
        pod_id: format!("pod-for-{event_id}"),
        actual_state: "RUNNING".to_owned(),
        desired_state: String::new(),
        timestamp: String::new(),
        agent_id: "agent-1".to_owned(),
        hostname: "agent-1".to_owned(),
        message: String::new(),
        reason: String::new(),
        healthy: meridian_mesos::PodHealth::Healthy,
        event_id: event_id.to_owned(),
    }
}

/// Polls `cond` until it holds or `timeout` elapses.
pub async fn wait_for<F>(what: &str, timeout: Duration, cond: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
