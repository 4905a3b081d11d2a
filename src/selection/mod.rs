//! Node selection strategies
//!
//! Four interchangeable strategies behind one trait. Selection works on a
//! point-in-time snapshot of the health registry and never blocks on probing.

mod health_weighted;
mod least_used;
mod random;
mod round_robin;

pub use health_weighted::HealthWeightedSelector;
pub use least_used::LeastUsedSelector;
pub use random::RandomSelector;
pub use round_robin::RoundRobinSelector;

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::{HealthClass, HealthRecord};

/// Strategy names accepted from configuration and callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    #[default]
    HealthWeighted,
    RoundRobin,
    LeastUsed,
    Random,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::HealthWeighted => "health_weighted",
            SelectionStrategy::RoundRobin => "round_robin",
            SelectionStrategy::LeastUsed => "least_used",
            SelectionStrategy::Random => "random",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "health_weighted" | "health-weighted" => Some(SelectionStrategy::HealthWeighted),
            "round_robin" | "round-robin" => Some(SelectionStrategy::RoundRobin),
            "least_used" | "least-used" => Some(SelectionStrategy::LeastUsed),
            "random" => Some(SelectionStrategy::Random),
            _ => None,
        }
    }
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a selector sees of one candidate node
#[derive(Debug, Clone)]
pub struct NodeScore {
    pub name: String,
    pub score: f64,
    pub class: HealthClass,
}

/// A selection strategy over a candidate slice
pub trait NodeSelector: Send + Sync {
    fn select(&self, candidates: &[NodeScore]) -> Option<String>;
}

/// Per-node selection counters, shared with the least-used strategy
#[derive(Debug, Default)]
pub struct UsageTracker {
    counts: DashMap<String, u64>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            counts: DashMap::new(),
        }
    }

    pub fn record(&self, name: &str) {
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn usage(&self, name: &str) -> u64 {
        self.counts.get(name).map(|entry| *entry.value()).unwrap_or(0)
    }

    pub fn reset(&self) {
        self.counts.clear();
    }
}

/// Build the candidate list from a registry snapshot
///
/// Eligible classes only; when nothing is eligible the single best-scoring
/// node is offered so the pool degrades instead of going dark.
pub fn eligible_candidates(snapshot: &[(String, HealthRecord)]) -> Vec<NodeScore> {
    let eligible: Vec<NodeScore> = snapshot
        .iter()
        .filter(|(_, record)| record.class.is_eligible())
        .map(|(name, record)| NodeScore {
            name: name.clone(),
            score: record.score,
            class: record.class,
        })
        .collect();

    if !eligible.is_empty() {
        return eligible;
    }

    snapshot
        .iter()
        .max_by(|a, b| {
            a.1.score
                .partial_cmp(&b.1.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        })
        .map(|(name, record)| {
            vec![NodeScore {
                name: name.clone(),
                score: record.score,
                class: record.class,
            }]
        })
        .unwrap_or_default()
}

/// All strategies wired up and sharing one usage tracker
pub struct SelectorSet {
    health_weighted: HealthWeightedSelector,
    round_robin: RoundRobinSelector,
    least_used: LeastUsedSelector,
    random: RandomSelector,
    usage: Arc<UsageTracker>,
}

impl SelectorSet {
    pub fn new() -> Self {
        let usage = Arc::new(UsageTracker::new());
        Self {
            health_weighted: HealthWeightedSelector::new(),
            round_robin: RoundRobinSelector::new(),
            least_used: LeastUsedSelector::new(Arc::clone(&usage)),
            random: RandomSelector::new(),
            usage,
        }
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// Run one selection over a registry snapshot
    pub fn select(
        &self,
        strategy: SelectionStrategy,
        snapshot: &[(String, HealthRecord)],
    ) -> Option<String> {
        let candidates = eligible_candidates(snapshot);
        if candidates.is_empty() {
            debug!(%strategy, "no candidates available");
            return None;
        }

        let picked = match strategy {
            SelectionStrategy::HealthWeighted => self.health_weighted.select(&candidates),
            SelectionStrategy::RoundRobin => self.round_robin.select(&candidates),
            SelectionStrategy::LeastUsed => self.least_used.select(&candidates),
            SelectionStrategy::Random => self.random.select(&candidates),
        };

        if let Some(name) = &picked {
            self.usage.record(name);
            debug!(%strategy, node = %name, "node selected");
        }
        picked
    }
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) fn candidate(name: &str, score: f64, class: HealthClass) -> NodeScore {
    NodeScore {
        name: name.to_string(),
        score,
        class,
    }
}
