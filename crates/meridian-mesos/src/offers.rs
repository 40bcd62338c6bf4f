//! Per-host offer pool with TTL pruning and an aggregate resource view.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use tracing::debug;

use crate::proto::Offer;
use crate::resources::{HostOfferSummary, Resources};

struct HeldOffer {
    offer: Offer,
    received_at: Instant,
}

#[derive(Default)]
struct HostBucket {
    offers: HashMap<String, HeldOffer>,
    aggregate: Resources,
}

impl HostBucket {
    fn recompute(&mut self) {
        self.aggregate = Resources::from_offers(self.offers.values().map(|held| &held.offer));
    }
}

#[derive(Default)]
struct Inner {
    buckets: HashMap<String, HostBucket>,
    // offer id -> hostname; an offer lives in exactly one bucket.
    by_id: HashMap<String, String>,
}

impl Inner {
    fn detach(&mut self, offer_id: &str) -> Option<String> {
        let hostname = self.by_id.remove(offer_id)?;
        if let Some(bucket) = self.buckets.get_mut(&hostname) {
            bucket.offers.remove(offer_id);
            if bucket.offers.is_empty() {
                self.buckets.remove(&hostname);
            } else {
                bucket.recompute();
            }
        }
        Some(hostname)
    }
}

/// Pool of live offers bucketed by host.
///
/// A single mutex guards the bucket map; every aggregate is recomputed on the
/// mutation that touches it, so reads are always consistent with the pooled
/// offers.
pub struct OfferManager {
    hold_time: Duration,
    inner: Mutex<Inner>,
}

impl OfferManager {
    /// Creates a pool that ages offers out after `hold_time`.
    #[must_use]
    pub fn new(hold_time: Duration) -> Self {
        Self {
            hold_time,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Ingests offers, stamping their receive time.
    ///
    /// Duplicate offer ids are replaced in place (the newest fields win).
    /// Returns the set of hosts whose bucket changed.
    pub fn add_offers(&self, offers: Vec<Offer>) -> HashSet<String> {
        let now = Instant::now();
        let mut changed = HashSet::new();
        let mut inner = self.inner.lock();

        for offer in offers {
            // If the id is already pooled, possibly under another host,
            // detach it first so it lives in exactly one bucket.
            if let Some(previous_host) = inner.detach(&offer.id) {
                changed.insert(previous_host);
            }

            let hostname = offer.hostname.clone();
            inner.by_id.insert(offer.id.clone(), hostname.clone());
            let bucket = inner.buckets.entry(hostname.clone()).or_default();
            bucket.offers.insert(
                offer.id.clone(),
                HeldOffer {
                    offer,
                    received_at: now,
                },
            );
            bucket.recompute();
            changed.insert(hostname);
        }

        changed
    }

    /// Removes a rescinded offer. Returns the host it was pooled on, if any.
    pub fn remove_offer(&self, offer_id: &str) -> Option<String> {
        self.inner.lock().detach(offer_id)
    }

    /// Drops every offer pooled for a host, typically after a launch consumed
    /// them.
    pub fn remove_offers_for_host(&self, hostname: &str) {
        let mut inner = self.inner.lock();
        if let Some(bucket) = inner.buckets.remove(hostname) {
            for offer_id in bucket.offers.keys() {
                inner.by_id.remove(offer_id);
            }
            debug!(hostname, removed = bucket.offers.len(), "host offers removed");
        }
    }

    /// Snapshot of a host's pooled offers, keyed by offer id.
    #[must_use]
    pub fn offers_for_host(&self, hostname: &str) -> HashMap<String, Offer> {
        let inner = self.inner.lock();
        inner.buckets.get(hostname).map_or_else(HashMap::new, |bucket| {
            bucket
                .offers
                .iter()
                .map(|(id, held)| (id.clone(), held.offer.clone()))
                .collect()
        })
    }

    /// Aggregate resources pooled for a host; empty when the host has no
    /// bucket.
    #[must_use]
    pub fn resources_for_host(&self, hostname: &str) -> Resources {
        let inner = self.inner.lock();
        inner
            .buckets
            .get(hostname)
            .map_or_else(Resources::default, |bucket| bucket.aggregate)
    }

    /// Combined per-host view of every pooled offer.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HostOfferSummary> {
        let inner = self.inner.lock();
        inner
            .buckets
            .iter()
            .map(|(hostname, bucket)| {
                let agent_id = bucket
                    .offers
                    .values()
                    .next()
                    .map(|held| held.offer.agent_id.clone())
                    .unwrap_or_default();
                HostOfferSummary {
                    hostname: hostname.clone(),
                    agent_id,
                    resources: bucket.aggregate,
                }
            })
            .collect()
    }

    /// Removes offers older than the hold time. Returns the hosts that lost
    /// offers.
    pub fn prune_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let mut affected = Vec::new();
        let mut pruned = 0u64;
        let mut inner = self.inner.lock();

        let expired: Vec<String> = inner
            .buckets
            .values()
            .flat_map(|bucket| bucket.offers.values())
            .filter(|held| now.duration_since(held.received_at) >= self.hold_time)
            .map(|held| held.offer.id.clone())
            .collect();

        for offer_id in expired {
            if let Some(hostname) = inner.detach(&offer_id) {
                pruned += 1;
                if !affected.contains(&hostname) {
                    affected.push(hostname);
                }
            }
        }

        if pruned > 0 {
            counter!("meridian.mesos.offers.pruned").increment(pruned);
            debug!(pruned, "expired offers pruned");
        }
        affected
    }

    /// Drops all pooled state.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.buckets.clear();
        inner.by_id.clear();
    }

    /// Number of hosts with at least one pooled offer.
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    /// Total number of pooled offers.
    #[must_use]
    pub fn offer_count(&self) -> usize {
        self.inner.lock().by_id.len()
    }
}
