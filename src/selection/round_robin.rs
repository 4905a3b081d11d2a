//! Round-robin selection
//!
//! Cycles through candidates in name order with an atomic cursor. The cursor
//! survives candidate-set changes; it simply wraps over whatever list it is
//! given.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{NodeScore, NodeSelector};

pub struct RoundRobinSelector {
    cursor: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl NodeSelector for RoundRobinSelector {
    fn select(&self, candidates: &[NodeScore]) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }

        let mut ordered: Vec<&NodeScore> = candidates.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % ordered.len();
        Some(ordered[index].name.clone())
    }
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}
