//! Routing Policy Module
//!
//! Routers pick one successor per item from a weighted candidate list.
//! Selection here is pure: the caller supplies the candidates, a readiness
//! flag for each, and the network's RNG. Readiness is decided by the network
//! (a candidate is ready when it has no pending event).
//!
//! # Policies
//!
//! 1. **Priority**: highest-weight ready candidate; ties go to the candidate
//!    added last
//! 2. **Probability**: weighted random draw among ready candidates
//! 3. **ProbabilityIgnoringReadiness**: weighted random draw among all
//!    candidates; the chosen one may refuse the item
//!
//! ```rust
//! use queueing_sim_core::policy::{Candidate, SelectionPolicy};
//! use queueing_sim_core::{NodeId, SimRng};
//!
//! let candidates = [
//!     Candidate { node: NodeId(1), weight: 1 },
//!     Candidate { node: NodeId(2), weight: 2 },
//! ];
//! let mut rng = SimRng::new(7);
//! let chosen = SelectionPolicy::Priority.select(&candidates, &[true, true], &mut rng);
//! assert_eq!(chosen, Some(NodeId(2)));
//! ```

pub mod condition;

pub use condition::{
    Condition, ConditionContext, ConditionError, NetworkSnapshot, NodeAttribute, NodeState,
    Operand,
};

use crate::network::NodeId;
use crate::rng::SimRng;
use serde::{Deserialize, Serialize};

/// Weighted routing target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub node: NodeId,
    pub weight: u32,
}

/// How a router chooses among its candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    Priority,
    Probability,
    ProbabilityIgnoringReadiness,
}

impl SelectionPolicy {
    /// Whether candidate readiness filters the pool.
    pub fn considers_readiness(&self) -> bool {
        !matches!(self, SelectionPolicy::ProbabilityIgnoringReadiness)
    }

    /// Choose a candidate.
    ///
    /// `ready[i]` is the readiness of `candidates[i]`; it is ignored by
    /// `ProbabilityIgnoringReadiness`. The RNG is consumed only by the
    /// probability policies and only when the pool is non-empty.
    pub fn select(
        &self,
        candidates: &[Candidate],
        ready: &[bool],
        rng: &mut SimRng,
    ) -> Option<NodeId> {
        debug_assert_eq!(candidates.len(), ready.len());
        match self {
            SelectionPolicy::Priority => select_priority(candidates, ready),
            SelectionPolicy::Probability => {
                let pool: Vec<Candidate> = candidates
                    .iter()
                    .zip(ready)
                    .filter(|(_, r)| **r)
                    .map(|(c, _)| *c)
                    .collect();
                select_weighted(&pool, rng)
            }
            SelectionPolicy::ProbabilityIgnoringReadiness => select_weighted(candidates, rng),
        }
    }
}

fn select_priority(candidates: &[Candidate], ready: &[bool]) -> Option<NodeId> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    // stable: equal weights keep insertion order, so the last one wins
    order.sort_by_key(|&i| candidates[i].weight);
    order
        .into_iter()
        .filter(|&i| ready.get(i).copied().unwrap_or(false))
        .last()
        .map(|i| candidates[i].node)
}

fn select_weighted(pool: &[Candidate], rng: &mut SimRng) -> Option<NodeId> {
    let last = pool.last()?;
    let total: u64 = pool.iter().map(|c| u64::from(c.weight)).sum();
    let target = rng.next_f64() * total as f64;

    let mut cumulative = 0u64;
    for candidate in pool {
        cumulative += u64::from(candidate.weight);
        if target <= cumulative as f64 {
            return Some(candidate.node);
        }
    }
    Some(last.node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cands(weights: &[u32]) -> Vec<Candidate> {
        weights
            .iter()
            .enumerate()
            .map(|(i, &weight)| Candidate {
                node: NodeId(i),
                weight,
            })
            .collect()
    }

    #[test]
    fn test_priority_picks_highest_ready_weight() {
        let c = cands(&[1, 5, 3]);
        let mut rng = SimRng::new(1);
        assert_eq!(
            SelectionPolicy::Priority.select(&c, &[true, true, true], &mut rng),
            Some(NodeId(1))
        );
        assert_eq!(
            SelectionPolicy::Priority.select(&c, &[true, false, true], &mut rng),
            Some(NodeId(2))
        );
        assert_eq!(
            SelectionPolicy::Priority.select(&c, &[false, false, false], &mut rng),
            None
        );
    }

    #[test]
    fn test_priority_tie_goes_to_last_added() {
        let c = cands(&[2, 2, 1]);
        let mut rng = SimRng::new(1);
        assert_eq!(
            SelectionPolicy::Priority.select(&c, &[true, true, true], &mut rng),
            Some(NodeId(1))
        );
    }

    #[test]
    fn test_priority_does_not_touch_rng() {
        let c = cands(&[1, 2]);
        let mut rng = SimRng::new(9);
        SelectionPolicy::Priority.select(&c, &[true, true], &mut rng);
        assert_eq!(rng.state(), SimRng::new(9).state());
    }

    #[test]
    fn test_probability_respects_readiness() {
        let c = cands(&[10, 1]);
        let mut rng = SimRng::new(3);
        for _ in 0..100 {
            assert_eq!(
                SelectionPolicy::Probability.select(&c, &[false, true], &mut rng),
                Some(NodeId(1))
            );
        }
    }

    #[test]
    fn test_probability_empty_pool_skips_draw() {
        let c = cands(&[1, 1]);
        let mut rng = SimRng::new(3);
        assert_eq!(
            SelectionPolicy::Probability.select(&c, &[false, false], &mut rng),
            None
        );
        assert_eq!(rng.state(), SimRng::new(3).state());
    }

    #[test]
    fn test_ignoring_readiness_can_pick_busy_candidate() {
        let c = cands(&[1]);
        let mut rng = SimRng::new(3);
        assert_eq!(
            SelectionPolicy::ProbabilityIgnoringReadiness.select(&c, &[false], &mut rng),
            Some(NodeId(0))
        );
    }

    #[test]
    fn test_probability_follows_weights() {
        let c = cands(&[1, 3]);
        let mut rng = SimRng::new(12345);
        let n = 20_000;
        let heavy = (0..n)
            .filter(|_| {
                SelectionPolicy::Probability.select(&c, &[true, true], &mut rng) == Some(NodeId(1))
            })
            .count();
        let share = heavy as f64 / n as f64;
        assert!((share - 0.75).abs() < 0.02, "share was {}", share);
    }
}
