//! Mesos cluster-manager plugin for the meridian orchestrator.
//!
//! The plugin sits between the goal-state layer and a Mesos-style resource
//! offer cluster manager:
//!
//! - **Ingress**: offer, rescind, and task status update events arrive via
//!   [`MesosManager::handle_event`]. Offers land in the [`OfferManager`] and
//!   surface as host events; status updates surface as pod events.
//! - **Egress**: [`MesosManager::launch_pods`] consumes a host's offers with
//!   one accept-and-launch call, [`MesosManager::kill_pod`] issues kills, and
//!   acknowledgements flow through a bounded channel drained by deduplicating
//!   ack workers.
//!
//! The wire transport itself is external: callers supply a
//! [`SchedulerClient`] implementation.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod offers;
pub mod proto;
pub mod resources;

pub use client::SchedulerClient;
pub use config::MesosConfig;
pub use error::{MesosError, Result};
pub use events::{HostEvent, HostEventKind, PodEvent, PodHealth};
pub use manager::MesosManager;
pub use offers::OfferManager;
pub use proto::{Call, Event, Launch, LaunchablePod, Offer, PodSpec, TaskInfo, TaskState, TaskStatus};
pub use resources::{HostOfferSummary, Resources};
