//! Least-used selection
//!
//! Picks the candidate with the fewest recorded selections, spreading load
//! evenly over the pool. Ties break towards the higher score, then the name.

use std::sync::Arc;

use super::{NodeScore, NodeSelector, UsageTracker};

pub struct LeastUsedSelector {
    usage: Arc<UsageTracker>,
}

impl LeastUsedSelector {
    pub fn new(usage: Arc<UsageTracker>) -> Self {
        Self { usage }
    }
}

impl NodeSelector for LeastUsedSelector {
    fn select(&self, candidates: &[NodeScore]) -> Option<String> {
        candidates
            .iter()
            .min_by(|a, b| {
                self.usage
                    .usage(&a.name)
                    .cmp(&self.usage.usage(&b.name))
                    .then_with(|| {
                        b.score
                            .partial_cmp(&a.score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.name.cmp(&b.name))
            })
            .map(|c| c.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthClass;
    use crate::selection::candidate;

    #[test]
    fn test_empty_candidates() {
        let selector = LeastUsedSelector::new(Arc::new(UsageTracker::new()));
        assert!(selector.select(&[]).is_none());
    }

    #[test]
    fn test_picks_least_used() {
        let usage = Arc::new(UsageTracker::new());
        usage.record("a");
        usage.record("a");
        usage.record("b");

        let selector = LeastUsedSelector::new(Arc::clone(&usage));
        let candidates = vec![
            candidate("a", 0.9, HealthClass::Excellent),
            candidate("b", 0.5, HealthClass::Good),
            candidate("c", 0.4, HealthClass::Fair),
        ];

        assert_eq!(selector.select(&candidates).as_deref(), Some("c"));
    }

    #[test]
    fn test_tie_breaks_on_score() {
        let selector = LeastUsedSelector::new(Arc::new(UsageTracker::new()));
        let candidates = vec![
            candidate("low", 0.3, HealthClass::Fair),
            candidate("high", 0.9, HealthClass::Excellent),
        ];

        assert_eq!(selector.select(&candidates).as_deref(), Some("high"));
    }

    #[test]
    fn test_critical_node_filtered_even_when_least_used() {
        use crate::models::HealthRecord;
        use crate::selection::{SelectionStrategy, SelectorSet};

        let set = SelectorSet::new();
        // "a" was already picked twice; "b" has never been used but is
        // critical, so it must not win on the usage counter.
        set.usage().record("a");
        set.usage().record("a");

        let snapshot = vec![
            (
                "a".to_string(),
                HealthRecord {
                    score: 0.9,
                    class: HealthClass::Excellent,
                    ..HealthRecord::new()
                },
            ),
            (
                "b".to_string(),
                HealthRecord {
                    score: 0.1,
                    class: HealthClass::Critical,
                    ..HealthRecord::new()
                },
            ),
        ];

        assert_eq!(
            set.select(SelectionStrategy::LeastUsed, &snapshot).as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_sole_critical_node_served_as_fallback() {
        use crate::models::HealthRecord;
        use crate::selection::{SelectionStrategy, SelectorSet};

        let set = SelectorSet::new();
        let snapshot = vec![(
            "b".to_string(),
            HealthRecord {
                score: 0.1,
                class: HealthClass::Critical,
                ..HealthRecord::new()
            },
        )];

        assert_eq!(
            set.select(SelectionStrategy::LeastUsed, &snapshot).as_deref(),
            Some("b")
        );
    }

    #[test]
    fn test_spreads_load_as_usage_accumulates() {
        let usage = Arc::new(UsageTracker::new());
        let selector = LeastUsedSelector::new(Arc::clone(&usage));
        let candidates = vec![
            candidate("a", 0.5, HealthClass::Good),
            candidate("b", 0.5, HealthClass::Good),
        ];

        for _ in 0..4 {
            let picked = selector.select(&candidates).unwrap();
            usage.record(&picked);
        }
        assert_eq!(usage.usage("a"), 2);
        assert_eq!(usage.usage("b"), 2);
    }
}
