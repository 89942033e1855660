//! Multi-dimensional fitness and the three-tier dominance relation that
//! drives archive maintenance and NSGA-II selection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One signed score per configured analyzer: `-(targeted detection count)`.
pub type HardValues = Vec<i64>;
/// Currently a single element: `-len(mutationSeq)`.
pub type SoftValues = Vec<i64>;
/// Execution-path identifier to integer cost, as reported by the gas ranker.
pub type GasMap = BTreeMap<String, i64>;

/// An individual's multi-dimensional fitness, compared lexicographically by
/// tier: hard values, then soft values, then gas map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fitness {
  pub hard: HardValues,
  pub soft: SoftValues,
  pub gas: GasMap,
}

impl Fitness {
  pub fn new(hard: HardValues, soft: SoftValues, gas: GasMap) -> Self {
    Self { hard, soft, gas }
  }

  /// Whether `self` Pareto-dominates `other` under the tiered relation of
  /// the data model: hard values first (elementwise `>=`, at least one
  /// `>`), falling through to soft values on an exact hard tie, falling
  /// through to the gas map on an exact soft tie.
  pub fn dominates(&self, other: &Fitness) -> bool {
    if dominates_max(&self.hard, &other.hard) {
      return true;
    }
    if self.hard != other.hard {
      return false;
    }
    if dominates_max(&self.soft, &other.soft) {
      return true;
    }
    if self.soft != other.soft {
      return false;
    }
    gas_dominates(&self.gas, &other.gas)
  }

  /// Neither dominates the other: required for archive anti-chain checks
  /// and NSGA-II front assignment.
  pub fn mutually_non_dominated(&self, other: &Fitness) -> bool {
    !self.dominates(other) && !other.dominates(self)
  }
}

/// Elementwise `>=` with at least one strict `>`, over equal-length vectors
/// maximized in the same sense (used for both hard and soft tiers).
fn dominates_max(a: &[i64], b: &[i64]) -> bool {
  debug_assert_eq!(a.len(), b.len(), "fitness components must have matching arity");
  a.iter().zip(b).all(|(x, y)| x >= y) && a.iter().zip(b).any(|(x, y)| x > y)
}

/// Elementwise `<=` with at least one strict `<`, over identical key sets
/// only; non-identical key sets mean neither gas-dominates the other.
fn gas_dominates(a: &GasMap, b: &GasMap) -> bool {
  if a.len() != b.len() || a.keys().ne(b.keys()) {
    return false;
  }
  a.iter().all(|(k, v)| *v <= b[k]) && a.iter().any(|(k, v)| *v < b[k])
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gas(pairs: &[(&str, i64)]) -> GasMap {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
  }

  #[test]
  fn test_hard_dominance_short_circuits() {
    let a = Fitness::new(vec![-1], vec![-5], gas(&[("p0", 100)]));
    let b = Fitness::new(vec![-2], vec![-1], gas(&[("p0", 1)]));
    assert!(a.dominates(&b));
    assert!(!b.dominates(&a));
  }

  #[test]
  fn test_soft_tiebreak_on_hard_equal() {
    let a = Fitness::new(vec![-1], vec![-2], gas(&[("p0", 50)]));
    let b = Fitness::new(vec![-1], vec![-4], gas(&[("p0", 1)]));
    assert!(a.dominates(&b));
  }

  #[test]
  fn test_gas_tiebreak_on_hard_and_soft_equal() {
    let a = Fitness::new(vec![-1], vec![-2], gas(&[("p0", 10), ("p1", 20)]));
    let b = Fitness::new(vec![-1], vec![-2], gas(&[("p0", 10), ("p1", 30)]));
    assert!(a.dominates(&b));
    assert!(!b.dominates(&a));
  }

  #[test]
  fn test_gas_key_mismatch_dominates_neither() {
    let a = Fitness::new(vec![-1], vec![-2], gas(&[("p0", 10)]));
    let b = Fitness::new(vec![-1], vec![-2], gas(&[("p1", 10)]));
    assert!(!a.dominates(&b));
    assert!(!b.dominates(&a));
    assert!(a.mutually_non_dominated(&b));
  }

  #[test]
  fn test_identical_fitness_mutually_non_dominated() {
    let a = Fitness::new(vec![-1], vec![-2], gas(&[("p0", 10)]));
    let b = a.clone();
    assert!(a.mutually_non_dominated(&b));
  }

  #[test]
  fn test_non_dominance_when_mixed_better_worse() {
    let a = Fitness::new(vec![-1, -3], vec![-2], gas(&[]));
    let b = Fitness::new(vec![-2, -1], vec![-2], gas(&[]));
    assert!(a.mutually_non_dominated(&b));
  }
}
