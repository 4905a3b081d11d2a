use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete health bucket derived from a node's continuous score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthClass {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
    #[default]
    Unknown,
}

impl HealthClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthClass::Excellent => "excellent",
            HealthClass::Good => "good",
            HealthClass::Fair => "fair",
            HealthClass::Poor => "poor",
            HealthClass::Critical => "critical",
            HealthClass::Unknown => "unknown",
        }
    }

    /// Whether nodes of this class participate in normal selection
    pub fn is_eligible(&self) -> bool {
        !matches!(self, HealthClass::Critical | HealthClass::Unknown)
    }

    /// Ordering rank, best first (used to assert band drops in tests)
    pub fn rank(&self) -> u8 {
        match self {
            HealthClass::Excellent => 0,
            HealthClass::Good => 1,
            HealthClass::Fair => 2,
            HealthClass::Poor => 3,
            HealthClass::Critical => 4,
            HealthClass::Unknown => 5,
        }
    }
}

impl std::fmt::Display for HealthClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-node health state, one record per registered node
///
/// `class` is always a pure function of the other fields and is recomputed by
/// the score model on every applied probe; nothing else sets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Continuous health score in [0, 1]
    pub score: f64,
    pub class: HealthClass,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    /// Exponentially smoothed probe latency
    pub avg_latency_ms: f64,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub next_probe_at: DateTime<Utc>,
}

impl HealthRecord {
    /// Fresh record for a node that just appeared: unknown, due immediately
    pub fn new() -> Self {
        Self {
            score: 0.0,
            class: HealthClass::Unknown,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            avg_latency_ms: 0.0,
            last_probe_at: None,
            next_probe_at: Utc::now(),
        }
    }

    pub fn total_probes(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Success ratio over the full counter window; 0 when never probed
    pub fn success_ratio(&self) -> f64 {
        let total = self.total_probes();
        if total == 0 {
            0.0
        } else {
            self.success_count as f64 / total as f64
        }
    }
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one probe of one node
///
/// Transient: produced by the prober, consumed once by the score model.
/// Carries the configuration fingerprint that was active when the probe was
/// dispatched so results from before a reload can be discarded.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub node: String,
    pub success: bool,
    pub latency_ms: f64,
    /// Test URL that answered fastest, when the probe succeeded
    pub url: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub fingerprint: String,
}

impl ProbeResult {
    pub fn success(node: &str, latency_ms: f64, url: &str, fingerprint: &str) -> Self {
        Self {
            node: node.to_string(),
            success: true,
            latency_ms,
            url: Some(url.to_string()),
            error: None,
            timestamp: Utc::now(),
            fingerprint: fingerprint.to_string(),
        }
    }

    pub fn failure(node: &str, error: impl Into<String>, fingerprint: &str) -> Self {
        Self {
            node: node.to_string(),
            success: false,
            latency_ms: 0.0,
            url: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
            fingerprint: fingerprint.to_string(),
        }
    }
}

/// Result of an on-demand, caller-triggered proxy test
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub node: String,
    pub success: bool,
    pub latency_ms: f64,
    /// Egress IP observed through the proxy, when the test endpoint reports one
    pub ip: Option<String>,
}
