//! Configuration for the goal-state engine.

use std::time::Duration;

use serde::Deserialize;

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target concurrency of the action worker pool. Zero selects the pool's
    /// default of 4.
    pub max_workers: usize,
    /// Initial and floor backoff applied after a failed action list.
    #[serde(with = "serde_duration_secs")]
    pub failure_retry_delay: Duration,
    /// Ceiling on the backoff delay.
    #[serde(with = "serde_duration_secs")]
    pub max_retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            failure_retry_delay: Duration::from_secs(5),
            max_retry_delay: Duration::from_secs(60 * 60),
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
