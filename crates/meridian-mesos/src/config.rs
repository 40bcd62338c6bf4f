//! Configuration for the Mesos plugin.

use std::time::Duration;

use serde::Deserialize;

/// Plugin configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MesosConfig {
    /// Maximum age of a pooled offer before the pruner drops it.
    #[serde(with = "serde_duration_secs")]
    pub offer_hold_time: Duration,
    /// How often the offer pruner runs.
    #[serde(with = "serde_duration_secs")]
    pub offer_pruning_period: Duration,
    /// Number of workers draining the acknowledgement channel.
    pub ack_concurrency: usize,
    /// Buffered depth of the acknowledgement channel.
    pub ack_channel_size: usize,
}

impl Default for MesosConfig {
    fn default() -> Self {
        Self {
            offer_hold_time: Duration::from_secs(5 * 60),
            offer_pruning_period: Duration::from_secs(30),
            ack_concurrency: 10,
            ack_channel_size: 1000,
        }
    }
}

/// Serde helper for Duration as seconds.
mod serde_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
