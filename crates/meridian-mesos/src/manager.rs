//! The plugin itself: event ingress, launch/kill/ack egress.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::SchedulerClient;
use crate::config::MesosConfig;
use crate::error::{MesosError, Result};
use crate::events::{HostEvent, PodEvent};
use crate::offers::OfferManager;
use crate::proto::{Call, Event, Launch, LaunchablePod, Resource, TaskInfo};
use crate::resources::HostOfferSummary;

struct Lifecycle {
    stop: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

/// Plugin for a Mesos-style cluster manager.
///
/// Owns the offer pool and the acknowledgement pipeline; pod and host events
/// are published on the channels supplied at construction. Background tasks
/// (offer pruner, ack workers) run between [`MesosManager::start`] and
/// [`MesosManager::stop`].
pub struct MesosManager {
    config: MesosConfig,
    client: Arc<dyn SchedulerClient>,
    offers: Arc<OfferManager>,
    pod_events: mpsc::Sender<PodEvent>,
    host_events: mpsc::Sender<HostEvent>,
    ack_tx: mpsc::Sender<PodEvent>,
    // Shared by the ack workers; receives are serialised through the mutex,
    // the acknowledge calls themselves run in parallel.
    ack_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PodEvent>>>,
    // Event ids with an acknowledgement currently in flight.
    in_flight_acks: Arc<DashSet<String>>,
    lifecycle: Mutex<Lifecycle>,
}

impl MesosManager {
    /// Creates the plugin. Pod and host events are published on the given
    /// channels.
    #[must_use]
    pub fn new(
        config: MesosConfig,
        client: Arc<dyn SchedulerClient>,
        pod_events: mpsc::Sender<PodEvent>,
        host_events: mpsc::Sender<HostEvent>,
    ) -> Self {
        let (ack_tx, ack_rx) = mpsc::channel(config.ack_channel_size);
        let offers = Arc::new(OfferManager::new(config.offer_hold_time));
        Self {
            config,
            client,
            offers,
            pod_events,
            host_events,
            ack_tx,
            ack_rx: Arc::new(tokio::sync::Mutex::new(ack_rx)),
            in_flight_acks: Arc::new(DashSet::new()),
            lifecycle: Mutex::new(Lifecycle {
                stop: None,
                tasks: Vec::new(),
            }),
        }
    }

    /// Spawns the offer pruner and the ack workers. A second call on a
    /// running plugin is a no-op.
    pub fn start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.stop.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(run_offer_pruner(
            Arc::clone(&self.offers),
            self.host_events.clone(),
            self.config.offer_pruning_period,
            token.clone(),
        )));

        for _ in 0..self.config.ack_concurrency.max(1) {
            tasks.push(tokio::spawn(run_ack_worker(
                Arc::clone(&self.ack_rx),
                Arc::clone(&self.in_flight_acks),
                Arc::clone(&self.client),
                token.clone(),
            )));
        }

        lifecycle.tasks = tasks;
        lifecycle.stop = Some(token);
        info!(
            ack_workers = self.config.ack_concurrency.max(1),
            "mesos plugin started"
        );
    }

    /// Stops background tasks and drops pooled offers. A second call on a
    /// stopped plugin is a no-op; `start` may be called again afterwards.
    pub async fn stop(&self) {
        let (token, tasks) = {
            let mut lifecycle = self.lifecycle.lock();
            (
                lifecycle.stop.take(),
                std::mem::take(&mut lifecycle.tasks),
            )
        };
        let Some(token) = token else {
            return;
        };

        token.cancel();
        for task in tasks {
            let _ = task.await;
        }
        self.offers.clear();
        info!("mesos plugin stopped");
    }

    /// Applies one cluster-manager event.
    ///
    /// Offers and rescinds mutate the offer pool and publish host events;
    /// status updates publish pod events.
    pub async fn handle_event(&self, event: Event) -> Result<()> {
        match event {
            Event::Offers { offers } => {
                debug!(count = offers.len(), "processing offer event");
                let hosts = self.offers.add_offers(offers);
                for hostname in hosts {
                    self.publish_host_resources(hostname).await?;
                }
            }
            Event::Rescind { offer_id } => {
                debug!(offer_id = %offer_id, "processing rescind event");
                if let Some(hostname) = self.offers.remove_offer(&offer_id) {
                    self.publish_host_resources(hostname).await?;
                }
            }
            Event::Update { status } => {
                counter!("meridian.mesos.task_updates").increment(1);
                counter!(
                    "meridian.mesos.task_state",
                    "state" => status.state.pod_state()
                )
                .increment(1);
                let event = PodEvent::from_task_status(&status);
                self.pod_events
                    .send(event)
                    .await
                    .map_err(|_| MesosError::ChannelClosed)?;
            }
        }
        Ok(())
    }

    /// Launches pods on a host by consuming every offer pooled for it.
    ///
    /// All offer ids go into a single accept call carrying one launch
    /// operation; the offers are dropped from the pool only after the call
    /// succeeds. Fails with [`MesosError::NoOffer`] when the host has no
    /// pooled offers.
    pub async fn launch_pods(
        &self,
        hostname: &str,
        pods: Vec<LaunchablePod>,
    ) -> Result<Vec<LaunchablePod>> {
        let offers = self.offers.offers_for_host(hostname);
        // One agent serves a host, so every offer shares its agent id.
        let Some(first) = offers.values().next() else {
            return Err(MesosError::NoOffer(hostname.to_owned()));
        };
        let agent_id = first.agent_id.clone();
        let offer_ids: Vec<String> = offers.keys().cloned().collect();

        let task_infos: Vec<TaskInfo> = pods
            .iter()
            .map(|pod| build_task_info(pod, &agent_id))
            .collect();

        let call = Call::Accept {
            offer_ids,
            launch: Launch { task_infos },
        };

        match self.client.call(call).await {
            Ok(()) => {
                // The offers are consumed; nothing further may be placed on
                // them.
                self.offers.remove_offers_for_host(hostname);
                counter!("meridian.mesos.launch_pod").increment(pods.len() as u64);
                Ok(pods)
            }
            Err(err) => {
                counter!("meridian.mesos.launch_pod_fail").increment(pods.len() as u64);
                Err(err)
            }
        }
    }

    /// Issues a best-effort kill for a pod.
    pub async fn kill_pod(&self, pod_id: &str) -> Result<()> {
        let result = self
            .client
            .call(Call::Kill {
                task_id: pod_id.to_owned(),
            })
            .await;

        match &result {
            Ok(()) => counter!("meridian.mesos.kill_pod").increment(1),
            Err(_) => counter!("meridian.mesos.kill_pod_fail").increment(1),
        }
        result
    }

    /// Queues a pod event for asynchronous acknowledgement.
    ///
    /// Blocks while the acknowledgement channel is full.
    pub async fn ack_pod_event(&self, event: PodEvent) {
        if self.ack_tx.send(event).await.is_err() {
            warn!("ack channel closed, dropping acknowledgement");
        }
    }

    /// Snapshot of current host availability, built from the offer pool.
    #[must_use]
    pub fn reconcile_hosts(&self) -> Vec<HostOfferSummary> {
        self.offers.snapshot()
    }

    /// The underlying offer pool.
    #[must_use]
    pub fn offer_manager(&self) -> &OfferManager {
        &self.offers
    }

    async fn publish_host_resources(&self, hostname: String) -> Result<()> {
        let resources = self.offers.resources_for_host(&hostname);
        self.host_events
            .send(HostEvent::available_resources(hostname, resources))
            .await
            .map_err(|_| MesosError::ChannelClosed)
    }
}

fn build_task_info(pod: &LaunchablePod, agent_id: &str) -> TaskInfo {
    let spec = &pod.spec;
    let mut resources = vec![
        Resource::scalar("cpus", spec.cpu),
        Resource::scalar("mem", spec.mem_mb),
    ];
    if spec.disk_mb > 0.0 {
        resources.push(Resource::scalar("disk", spec.disk_mb));
    }
    if spec.gpu > 0.0 {
        resources.push(Resource::scalar("gpus", spec.gpu));
    }
    TaskInfo {
        name: spec.name.clone(),
        task_id: pod.pod_id.clone(),
        agent_id: agent_id.to_owned(),
        resources,
    }
}

async fn run_offer_pruner(
    offers: Arc<OfferManager>,
    host_events: mpsc::Sender<HostEvent>,
    period: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    // The first tick fires immediately; skip it so a fresh pool is not
    // pruned at startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            _ = ticker.tick() => {}
        }

        for hostname in offers.prune_expired() {
            let resources = offers.resources_for_host(&hostname);
            if host_events
                .send(HostEvent::available_resources(hostname, resources))
                .await
                .is_err()
            {
                warn!("host event channel closed, stopping offer pruner");
                return;
            }
        }
    }
}

async fn run_ack_worker(
    ack_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PodEvent>>>,
    in_flight: Arc<DashSet<String>>,
    client: Arc<dyn SchedulerClient>,
    stop: CancellationToken,
) {
    loop {
        let event = {
            let mut rx = ack_rx.lock().await;
            tokio::select! {
                () = stop.cancelled() => return,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => return,
                },
            }
        };

        // Updates without an id need no acknowledgement.
        if event.event_id.is_empty() {
            continue;
        }

        // At most one in-flight acknowledgement per event id.
        if !in_flight.insert(event.event_id.clone()) {
            counter!("meridian.mesos.ack.deduped").increment(1);
            continue;
        }

        let call = Call::Acknowledge {
            agent_id: event.agent_id.clone(),
            task_id: event.pod_id.clone(),
            uuid: event.event_id.clone(),
        };
        counter!("meridian.mesos.ack").increment(1);
        if let Err(err) = client.call(call).await {
            // The agent re-sends unacknowledged updates, so log and move on.
            warn!(
                pod_id = %event.pod_id,
                error = %err,
                "failed to acknowledge pod event"
            );
        }
        in_flight.remove(&event.event_id);
    }
}
