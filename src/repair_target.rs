//! The stop condition a repair run is judged against: how many targeted
//! detections are still tolerated, per analyzer.

use std::collections::BTreeMap;

use crate::location::CodeRange;
use crate::vulnerability::AnalyzerResults;

/// A per-analyzer condition on the number of remaining targeted detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetCondition {
  /// Fulfilled once at most `num_remaining` targeted detections remain.
  Remaining { num_remaining: u32 },
  /// Equivalent to `Remaining(original_count - num_repaired)`, floored at
  /// zero when `num_repaired` is unbounded (`None` stands in for infinity).
  Repaired { original_count: u32, num_repaired: Option<u32> },
}

impl TargetCondition {
  /// The default target for an analyzer with no explicit condition: every
  /// targeted detection must be gone.
  pub fn default_remaining() -> Self {
    Self::Remaining { num_remaining: 0 }
  }

  /// Normalizes to the equivalent remaining-count threshold.
  fn threshold(&self) -> u32 {
    match *self {
      Self::Remaining { num_remaining } => num_remaining,
      Self::Repaired { original_count: _, num_repaired: None } => 0,
      Self::Repaired { original_count, num_repaired: Some(n) } => {
        original_count.saturating_sub(n)
      }
    }
  }

  /// Fulfilled when the observed count of targeted detections is at or
  /// below this condition's threshold.
  pub fn is_fulfilled(&self, targeted_detection_count: u32) -> bool {
    targeted_detection_count <= self.threshold()
  }
}

/// A per-analyzer mapping of conditions; analyzers absent from the map use
/// `TargetCondition::default_remaining()`.
#[derive(Debug, Clone, Default)]
pub struct RepairTarget {
  conditions: BTreeMap<String, TargetCondition>,
}

impl RepairTarget {
  pub fn new(conditions: BTreeMap<String, TargetCondition>) -> Self {
    Self { conditions }
  }

  fn condition_for(&self, analyzer_name: &str) -> TargetCondition {
    self.conditions.get(analyzer_name).copied().unwrap_or_else(TargetCondition::default_remaining)
  }

  /// Whether every configured analyzer's condition is fulfilled by the
  /// given vulnerability findings.
  pub fn is_fulfilled(
    &self,
    vulnerability: &AnalyzerResults,
    analyzer_names: &[String],
    targeted_names: Option<&[String]>,
    targeted_ranges: Option<&[CodeRange]>,
  ) -> bool {
    analyzer_names.iter().all(|name| {
      let count =
        vulnerability.targeted_count(name, targeted_names, targeted_ranges) as u32;
      self.condition_for(name).is_fulfilled(count)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_remaining_threshold() {
    let c = TargetCondition::Remaining { num_remaining: 2 };
    assert!(c.is_fulfilled(2));
    assert!(c.is_fulfilled(0));
    assert!(!c.is_fulfilled(3));
  }

  #[test]
  fn test_repaired_equivalence() {
    let c = TargetCondition::Repaired { original_count: 5, num_repaired: Some(3) };
    assert_eq!(c.threshold(), 2);
    assert!(c.is_fulfilled(2));
    assert!(!c.is_fulfilled(3));
  }

  #[test]
  fn test_repaired_unbounded_means_zero_remaining() {
    let c = TargetCondition::Repaired { original_count: 5, num_repaired: None };
    assert!(c.is_fulfilled(0));
    assert!(!c.is_fulfilled(1));
  }

  #[test]
  fn test_default_condition_requires_zero_remaining() {
    let target = RepairTarget::default();
    let vulnerability = AnalyzerResults::new();
    assert!(target.is_fulfilled(&vulnerability, &["slither".to_string()], None, None));
  }

  #[test]
  fn test_all_analyzers_must_be_fulfilled() {
    let mut conditions = BTreeMap::new();
    conditions.insert("a".to_string(), TargetCondition::Remaining { num_remaining: 5 });
    let target = RepairTarget::new(conditions);
    let vulnerability = AnalyzerResults::new();
    // "b" has no explicit condition, defaults to Remaining(0), which is
    // trivially fulfilled with no findings.
    assert!(target.is_fulfilled(
      &vulnerability,
      &["a".to_string(), "b".to_string()],
      None,
      None
    ));
  }
}
