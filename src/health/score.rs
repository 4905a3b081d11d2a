//! Scoring model for probe outcomes
//!
//! Pure functions: raw probe results in, bounded score and discrete health
//! class out. No I/O, no clocks beyond the timestamp carried by the result.

use crate::models::{HealthClass, HealthRecord, ProbeResult};

/// Score band thresholds, highest class first
const EXCELLENT_THRESHOLD: f64 = 0.85;
const GOOD_THRESHOLD: f64 = 0.65;
const FAIR_THRESHOLD: f64 = 0.4;
const POOR_THRESHOLD: f64 = 0.2;

/// Turns probe outcomes into score/class updates
///
/// The success-ratio floor is a hard floor: a node whose lifetime success
/// ratio falls below `min_success_ratio` is classified critical no matter how
/// its smoothed score looks.
#[derive(Debug, Clone)]
pub struct ScoreModel {
    /// EMA smoothing factor for both score and latency
    alpha: f64,
    /// Latency at or above which the multiplicative penalty bottoms out
    latency_ceiling_ms: f64,
    /// Hard floor on success ratio
    min_success_ratio: f64,
}

impl ScoreModel {
    pub fn new(alpha: f64, latency_ceiling_ms: f64, min_success_ratio: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            latency_ceiling_ms: latency_ceiling_ms.max(1.0),
            min_success_ratio: min_success_ratio.clamp(0.0, 1.0),
        }
    }

    /// Apply one probe result to a record, updating score, counters, latency
    /// and the derived class
    pub fn apply(&self, record: &mut HealthRecord, result: &ProbeResult) {
        if result.success {
            record.score = (record.score * (1.0 - self.alpha) + self.alpha).clamp(0.0, 1.0);
            record.success_count += 1;
            record.consecutive_failures = 0;
            record.avg_latency_ms = if record.success_count == 1 {
                result.latency_ms
            } else {
                record.avg_latency_ms * (1.0 - self.alpha) + result.latency_ms * self.alpha
            };
        } else {
            record.score = (record.score * (1.0 - self.alpha)).clamp(0.0, 1.0);
            record.failure_count += 1;
            record.consecutive_failures += 1;
        }

        record.last_probe_at = Some(result.timestamp);
        record.class = self.classify(record);
    }

    /// Derive the health class from the record's own fields
    ///
    /// A node that has never succeeded stays `unknown`; it never graduates to
    /// a scored band on failures alone.
    pub fn classify(&self, record: &HealthRecord) -> HealthClass {
        if record.success_count == 0 {
            return HealthClass::Unknown;
        }

        if record.success_ratio() < self.min_success_ratio {
            return HealthClass::Critical;
        }

        let effective = record.score * self.latency_factor(record.avg_latency_ms);
        if effective >= EXCELLENT_THRESHOLD {
            HealthClass::Excellent
        } else if effective >= GOOD_THRESHOLD {
            HealthClass::Good
        } else if effective >= FAIR_THRESHOLD {
            HealthClass::Fair
        } else if effective >= POOR_THRESHOLD {
            HealthClass::Poor
        } else {
            HealthClass::Critical
        }
    }

    /// Multiplicative latency penalty in [0.5, 1.0]
    fn latency_factor(&self, avg_latency_ms: f64) -> f64 {
        let ratio = (avg_latency_ms / self.latency_ceiling_ms).clamp(0.0, 1.0);
        1.0 - 0.5 * ratio
    }
}

impl Default for ScoreModel {
    fn default() -> Self {
        Self::new(0.3, 2000.0, 0.25)
    }
}
