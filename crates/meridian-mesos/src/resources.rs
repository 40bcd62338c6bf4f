//! Scalar resource aggregation over offers.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::proto::{Offer, Resource, ResourceValue};

/// Aggregate scalar resources of one or more offers.
///
/// Port ranges are not aggregated here; they stay on the individual offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    /// CPUs.
    pub cpu: f64,
    /// Memory, MB.
    pub mem_mb: f64,
    /// Disk, MB.
    pub disk_mb: f64,
    /// GPUs.
    pub gpu: f64,
}

impl Resources {
    /// Sums the scalar entries of a resource list.
    #[must_use]
    pub fn from_resources(resources: &[Resource]) -> Self {
        let mut total = Self::default();
        for resource in resources {
            let ResourceValue::Scalar(amount) = resource.value else {
                continue;
            };
            match resource.name.as_str() {
                "cpus" => total.cpu += amount,
                "mem" => total.mem_mb += amount,
                "disk" => total.disk_mb += amount,
                "gpus" => total.gpu += amount,
                _ => {}
            }
        }
        total
    }

    /// Sums the resources of a set of offers.
    #[must_use]
    pub fn from_offers<'a, I>(offers: I) -> Self
    where
        I: IntoIterator<Item = &'a Offer>,
    {
        offers
            .into_iter()
            .fold(Self::default(), |acc, offer| acc + Self::from_resources(&offer.resources))
    }

    /// Returns true if every dimension is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cpu == 0.0 && self.mem_mb == 0.0 && self.disk_mb == 0.0 && self.gpu == 0.0
    }
}

impl Add for Resources {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            cpu: self.cpu + other.cpu,
            mem_mb: self.mem_mb + other.mem_mb,
            disk_mb: self.disk_mb + other.disk_mb,
            gpu: self.gpu + other.gpu,
        }
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Combined view of one host's pooled offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostOfferSummary {
    /// Hostname the offers are for.
    pub hostname: String,
    /// The single agent behind this host's offers.
    pub agent_id: String,
    /// Aggregate resources across the host's offers.
    pub resources: Resources,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(id: &str, host: &str, cpu: f64, mem: f64) -> Offer {
        Offer {
            id: id.into(),
            agent_id: format!("agent-{host}"),
            hostname: host.into(),
            resources: vec![
                Resource::scalar("cpus", cpu),
                Resource::scalar("mem", mem),
            ],
        }
    }

    #[test]
    fn sums_known_scalar_names() {
        let resources = vec![
            Resource::scalar("cpus", 2.0),
            Resource::scalar("mem", 1024.0),
            Resource::scalar("disk", 2048.0),
            Resource::scalar("gpus", 1.0),
            Resource::scalar("cpus", 0.5),
        ];

        let total = Resources::from_resources(&resources);
        assert_eq!(total.cpu, 2.5);
        assert_eq!(total.mem_mb, 1024.0);
        assert_eq!(total.disk_mb, 2048.0);
        assert_eq!(total.gpu, 1.0);
    }

    #[test]
    fn ignores_ranges_and_unknown_names() {
        let resources = vec![
            Resource {
                name: "ports".into(),
                value: ResourceValue::Ranges(vec![(31000, 32000)]),
            },
            Resource::scalar("tape", 7.0),
        ];

        assert!(Resources::from_resources(&resources).is_empty());
    }

    #[test]
    fn sums_across_offers() {
        let offers = vec![offer("o1", "h1", 1.0, 512.0), offer("o2", "h1", 3.0, 1536.0)];

        let total = Resources::from_offers(&offers);
        assert_eq!(total.cpu, 4.0);
        assert_eq!(total.mem_mb, 2048.0);
    }

    #[test]
    fn add_assign_accumulates() {
        let mut total = Resources::default();
        total += Resources {
            cpu: 1.0,
            mem_mb: 100.0,
            disk_mb: 0.0,
            gpu: 0.0,
        };
        total += Resources {
            cpu: 0.5,
            mem_mb: 28.0,
            disk_mb: 0.0,
            gpu: 0.0,
        };

        assert_eq!(total.cpu, 1.5);
        assert_eq!(total.mem_mb, 128.0);
        assert!(!total.is_empty());
    }
}
