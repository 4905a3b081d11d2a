//! Adaptive probe scheduling
//!
//! Healthy nodes get probed less often, struggling nodes more often. Intervals
//! are derived from the health class alone and clamped to configured bounds.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::ProbeConfig;
use crate::models::{HealthClass, HealthRecord};

/// Computes per-node probe intervals and picks the nodes due for probing
#[derive(Debug, Clone)]
pub struct AdaptiveScheduler {
    base: Duration,
    min: Duration,
    max: Duration,
}

impl AdaptiveScheduler {
    pub fn new(base: Duration, min: Duration, max: Duration) -> Self {
        Self { base, min, max }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(
            config.base_interval(),
            config.min_interval(),
            config.max_interval(),
        )
    }

    /// Interval multiplier per class
    ///
    /// Unknown nodes use the same short interval as poor ones so newcomers get
    /// classified quickly.
    fn multiplier(class: HealthClass) -> f64 {
        match class {
            HealthClass::Excellent => 2.0,
            HealthClass::Good => 1.5,
            HealthClass::Fair => 1.0,
            HealthClass::Poor => 0.5,
            HealthClass::Critical => 0.25,
            HealthClass::Unknown => 0.5,
        }
    }

    /// Probe interval for a class, clamped to [min, max]
    pub fn interval_for(&self, class: HealthClass) -> Duration {
        let scaled = self.base.mul_f64(Self::multiplier(class));
        scaled.clamp(self.min, self.max)
    }

    /// Nodes due for a probe at `now`, at most `limit` of them
    ///
    /// Never-probed nodes come first, the rest ordered by how long ago they
    /// were last probed.
    pub fn due_nodes(
        &self,
        snapshot: &[(String, HealthRecord)],
        now: DateTime<Utc>,
        limit: usize,
    ) -> Vec<String> {
        let mut due: Vec<&(String, HealthRecord)> = snapshot
            .iter()
            .filter(|(_, record)| record.next_probe_at <= now)
            .collect();

        due.sort_by_key(|(_, record)| match record.last_probe_at {
            None => (0, DateTime::<Utc>::MIN_UTC),
            Some(at) => (1, at),
        });

        due.into_iter()
            .take(limit)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
