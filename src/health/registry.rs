//! In-memory health registry
//!
//! One record per registered node, keyed by node name. All mutation goes
//! through [`HealthRegistry::apply`] so the score, counters and next probe
//! time always change together.

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use crate::health::{AdaptiveScheduler, ScoreModel};
use crate::models::{HealthClass, HealthRecord, ProbeResult, ProxyNode};

#[derive(Debug, Default)]
pub struct HealthRegistry {
    records: DashMap<String, HealthRecord>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Align the registry with a new node set
    ///
    /// New names get fresh records, surviving names keep their history, names
    /// no longer present are dropped.
    pub fn seed(&self, nodes: &[ProxyNode]) {
        for node in nodes {
            self.records
                .entry(node.name.clone())
                .or_insert_with(HealthRecord::new);
        }

        let keep: std::collections::HashSet<&str> =
            nodes.iter().map(|n| n.name.as_str()).collect();
        self.records.retain(|name, _| keep.contains(name.as_str()));

        debug!(nodes = self.records.len(), "registry seeded");
    }

    /// Apply a probe result atomically under the entry lock
    ///
    /// Returns the new class, or `None` when the node is no longer registered
    /// (it may have been dropped by a reseed while the probe was in flight).
    pub fn apply(
        &self,
        model: &ScoreModel,
        scheduler: &AdaptiveScheduler,
        result: &ProbeResult,
    ) -> Option<HealthClass> {
        let mut entry = self.records.get_mut(&result.node)?;
        let record = entry.value_mut();

        model.apply(record, result);
        let interval = scheduler.interval_for(record.class);
        record.next_probe_at = result.timestamp
            + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::seconds(300));

        Some(record.class)
    }

    pub fn get(&self, name: &str) -> Option<HealthRecord> {
        self.records.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Point-in-time copy of every record, sorted by node name
    pub fn snapshot(&self) -> Vec<(String, HealthRecord)> {
        let mut all: Vec<(String, HealthRecord)> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Names of nodes currently eligible for selection
    pub fn eligible_count(&self) -> usize {
        self.records
            .iter()
            .filter(|entry| entry.value().class.is_eligible())
            .count()
    }

    /// Mark a node due for probing right now
    pub fn mark_due(&self, name: &str) {
        if let Some(mut entry) = self.records.get_mut(name) {
            entry.value_mut().next_probe_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyProtocol;
    use std::time::Duration;

    fn node(name: &str) -> ProxyNode {
        ProxyNode::new(name, "proxy.example", 443, ProxyProtocol::Vmess)
    }

    fn fixtures() -> (ScoreModel, AdaptiveScheduler) {
        (
            ScoreModel::default(),
            AdaptiveScheduler::new(
                Duration::from_secs(300),
                Duration::from_secs(60),
                Duration::from_secs(1800),
            ),
        )
    }

    #[test]
    fn test_seed_creates_fresh_records() {
        let registry = HealthRegistry::new();
        registry.seed(&[node("a"), node("b")]);

        assert_eq!(registry.len(), 2);
        let record = registry.get("a").unwrap();
        assert_eq!(record.class, HealthClass::Unknown);
    }

    #[test]
    fn test_reseed_preserves_survivors_and_drops_removed() {
        let (model, scheduler) = fixtures();
        let registry = HealthRegistry::new();
        registry.seed(&[node("a"), node("b")]);

        let result = ProbeResult::success("a", 80.0, "http://t.example/204", "fp");
        registry.apply(&model, &scheduler, &result);
        let before = registry.get("a").unwrap();
        assert_eq!(before.success_count, 1);

        registry.seed(&[node("a"), node("c")]);

        assert_eq!(registry.len(), 2);
        assert!(!registry.contains("b"));
        // "a" keeps its history, "c" starts fresh.
        assert_eq!(registry.get("a").unwrap().success_count, 1);
        assert_eq!(registry.get("c").unwrap().class, HealthClass::Unknown);
    }

    #[test]
    fn test_apply_updates_score_and_reschedules() {
        let (model, scheduler) = fixtures();
        let registry = HealthRegistry::new();
        registry.seed(&[node("a")]);

        let result = ProbeResult::success("a", 80.0, "http://t.example/204", "fp");
        let class = registry.apply(&model, &scheduler, &result);

        assert!(class.is_some());
        let record = registry.get("a").unwrap();
        assert!(record.score > 0.0);
        assert_eq!(record.last_probe_at, Some(result.timestamp));

        let expected = result.timestamp
            + chrono::Duration::from_std(scheduler.interval_for(record.class)).unwrap();
        assert_eq!(record.next_probe_at, expected);
    }

    #[test]
    fn test_apply_ignores_unregistered_node() {
        let (model, scheduler) = fixtures();
        let registry = HealthRegistry::new();
        registry.seed(&[node("a")]);

        let result = ProbeResult::success("ghost", 80.0, "http://t.example/204", "fp");
        assert!(registry.apply(&model, &scheduler, &result).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_sorted_by_name() {
        let registry = HealthRegistry::new();
        registry.seed(&[node("charlie"), node("alpha"), node("bravo")]);

        let names: Vec<String> = registry.snapshot().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn test_eligible_count() {
        let (model, scheduler) = fixtures();
        let registry = HealthRegistry::new();
        registry.seed(&[node("a"), node("b")]);
        assert_eq!(registry.eligible_count(), 0);

        let result = ProbeResult::success("a", 80.0, "http://t.example/204", "fp");
        registry.apply(&model, &scheduler, &result);
        assert_eq!(registry.eligible_count(), 1);
    }

    #[test]
    fn test_mark_due() {
        let (model, scheduler) = fixtures();
        let registry = HealthRegistry::new();
        registry.seed(&[node("a")]);

        let result = ProbeResult::success("a", 80.0, "http://t.example/204", "fp");
        registry.apply(&model, &scheduler, &result);
        assert!(registry.get("a").unwrap().next_probe_at > Utc::now());

        registry.mark_due("a");
        assert!(registry.get("a").unwrap().next_probe_at <= Utc::now());
    }
}
