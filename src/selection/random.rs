//! Uniform random selection

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{NodeScore, NodeSelector};

pub struct RandomSelector {
    rng: Mutex<StdRng>,
}

impl RandomSelector {
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

impl NodeSelector for RandomSelector {
    fn select(&self, candidates: &[NodeScore]) -> Option<String> {
        let mut rng = self.rng.lock();
        candidates.choose(&mut *rng).map(|c| c.name.clone())
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthClass;
    use crate::selection::candidate;

    #[test]
    fn test_empty_candidates() {
        let selector = RandomSelector::with_seed(3);
        assert!(selector.select(&[]).is_none());
    }

    #[test]
    fn test_eventually_covers_all_candidates() {
        let selector = RandomSelector::with_seed(3);
        let candidates = vec![
            candidate("a", 0.5, HealthClass::Good),
            candidate("b", 0.5, HealthClass::Good),
            candidate("c", 0.5, HealthClass::Good),
        ];

        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(selector.select(&candidates).unwrap());
        }
        assert_eq!(seen.len(), 3);
    }
}
