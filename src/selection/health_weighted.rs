//! Health-weighted selection
//!
//! Draws a candidate with probability proportional to its score. Healthier
//! nodes get picked more often without starving the rest of the pool.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{NodeScore, NodeSelector};

pub struct HealthWeightedSelector {
    rng: Mutex<StdRng>,
}

impl HealthWeightedSelector {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    #[cfg(test)]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl NodeSelector for HealthWeightedSelector {
    fn select(&self, candidates: &[NodeScore]) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }

        let total: f64 = candidates.iter().map(|c| c.score.max(0.0)).sum();
        let mut rng = self.rng.lock();

        // All-zero weights degenerate to a uniform draw.
        if total <= f64::EPSILON {
            let index = rng.gen_range(0..candidates.len());
            return Some(candidates[index].name.clone());
        }

        let draw = rng.gen_range(0.0..total);
        let mut cumulative = 0.0;
        for candidate in candidates {
            cumulative += candidate.score.max(0.0);
            if draw < cumulative {
                return Some(candidate.name.clone());
            }
        }

        // Floating point slack: the draw landed on the upper edge.
        candidates.last().map(|c| c.name.clone())
    }
}

impl Default for HealthWeightedSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthClass;
    use crate::selection::candidate;
    use std::collections::HashMap;

    #[test]
    fn test_empty_candidates() {
        let selector = HealthWeightedSelector::with_seed(7);
        assert!(selector.select(&[]).is_none());
    }

    #[test]
    fn test_single_candidate_always_wins() {
        let selector = HealthWeightedSelector::with_seed(7);
        let candidates = vec![candidate("only", 0.5, HealthClass::Fair)];
        for _ in 0..10 {
            assert_eq!(selector.select(&candidates).as_deref(), Some("only"));
        }
    }

    #[test]
    fn test_distribution_tracks_scores() {
        let selector = HealthWeightedSelector::with_seed(42);
        let candidates = vec![
            candidate("strong", 0.9, HealthClass::Excellent),
            candidate("weak", 0.1, HealthClass::Poor),
        ];

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..2000 {
            let picked = selector.select(&candidates).unwrap();
            *counts.entry(picked).or_insert(0) += 1;
        }

        let strong = counts.get("strong").copied().unwrap_or(0);
        let weak = counts.get("weak").copied().unwrap_or(0);
        assert!(weak > 0, "weak node should still be drawn sometimes");
        assert!(
            strong > weak * 4,
            "expected roughly 9:1 split, got {strong}:{weak}"
        );
    }

    #[test]
    fn test_full_score_node_among_zeros_always_wins() {
        let selector = HealthWeightedSelector::with_seed(9);
        let candidates = vec![
            candidate("dead-a", 0.0, HealthClass::Poor),
            candidate("alive", 1.0, HealthClass::Excellent),
            candidate("dead-b", 0.0, HealthClass::Poor),
        ];

        for _ in 0..200 {
            assert_eq!(selector.select(&candidates).as_deref(), Some("alive"));
        }
    }

    #[test]
    fn test_zero_scores_fall_back_to_uniform() {
        let selector = HealthWeightedSelector::with_seed(1);
        let candidates = vec![
            candidate("a", 0.0, HealthClass::Poor),
            candidate("b", 0.0, HealthClass::Poor),
        ];

        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(selector.select(&candidates).unwrap());
        }
        assert_eq!(seen.len(), 2);
    }
}
