//! Vulnerability records, as reported by a static analyzer or the dynamic
//! test runner, and the targeting predicate used to decide which of them
//! count toward an individual's fitness.

use serde::{Deserialize, Serialize};

use crate::fault::FaultElement;
use crate::location::CodeRange;

/// A single vulnerability (or test-case) finding against a candidate patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityInfo {
  pub name: String,
  pub detected: bool,
  pub additional_info: Option<String>,
  pub fault_localization_info: Option<Vec<FaultElement>>,
}

impl VulnerabilityInfo {
  /// A detected vulnerability/failure, optionally carrying fault info.
  pub fn detected(
    name: impl Into<String>,
    additional_info: Option<String>,
    fault_localization_info: Option<Vec<FaultElement>>,
  ) -> Self {
    Self {
      name: name.into(),
      detected: true,
      additional_info,
      fault_localization_info,
    }
  }

  /// A check that ran and found nothing.
  pub fn not_detected(name: impl Into<String>) -> Self {
    Self { name: name.into(), detected: false, additional_info: None, fault_localization_info: None }
  }

  /// The sentinel short-circuit result standing in for a whole batch of
  /// skippable analyzer findings once one of them already hit a target.
  pub fn fast_fail() -> Self {
    Self {
      name: "FastFail".to_string(),
      detected: true,
      additional_info: None,
      fault_localization_info: None,
    }
  }

  /// Whether this is the `FastFail` sentinel.
  pub fn is_fast_fail(&self) -> bool {
    self.detected && self.name == "FastFail" && self.fault_localization_info.is_none()
  }

  /// Whether this finding counts toward a repair target, per the targeting
  /// predicate: `FastFail` always counts; otherwise the name (or detected
  /// flag, if no names were given) must match, and if target ranges were
  /// given, at least one `CodeRange` fault element must intersect one of
  /// them (vacuously satisfied when fault info is absent).
  pub fn is_targeted(
    &self,
    targeted_names: Option<&[String]>,
    targeted_ranges: Option<&[CodeRange]>,
  ) -> bool {
    if self.is_fast_fail() {
      return true;
    }

    let name_ok = match targeted_names {
      Some(names) => names.iter().any(|n| n == &self.name),
      None => self.detected,
    };
    if !name_ok {
      return false;
    }

    match (targeted_ranges, &self.fault_localization_info) {
      (Some(ranges), Some(elements)) if !ranges.is_empty() => elements
        .iter()
        .filter_map(FaultElement::code_range)
        .any(|r| ranges.iter().any(|target| r.intersects(target))),
      _ => true,
    }
  }
}

/// The findings of one analyzer run against one candidate.
pub type AnalyzerResult = Vec<VulnerabilityInfo>;

/// Findings keyed by analyzer name, preserving insertion order for
/// deterministic logging. Never relied upon for correctness: lookups are by
/// key, not position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerResults {
  entries: Vec<(String, AnalyzerResult)>,
}

impl AnalyzerResults {
  pub fn new() -> Self {
    Self::default()
  }

  /// Inserts or replaces the result for `analyzer_name`, preserving its
  /// original position on replace.
  pub fn insert(&mut self, analyzer_name: impl Into<String>, result: AnalyzerResult) {
    let name = analyzer_name.into();
    if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == name) {
      slot.1 = result;
    } else {
      self.entries.push((name, result));
    }
  }

  pub fn get(&self, analyzer_name: &str) -> Option<&AnalyzerResult> {
    self.entries.iter().find(|(k, _)| k == analyzer_name).map(|(_, v)| v)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &AnalyzerResult)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Counts the targeted detections for `analyzer_name`; absent analyzers
  /// count as zero, matching the hard-values invariant that every
  /// configured analyzer contributes exactly one component.
  pub fn targeted_count(
    &self,
    analyzer_name: &str,
    targeted_names: Option<&[String]>,
    targeted_ranges: Option<&[CodeRange]>,
  ) -> usize {
    self
      .get(analyzer_name)
      .map(|vulns| {
        vulns.iter().filter(|v| v.is_targeted(targeted_names, targeted_ranges)).count()
      })
      .unwrap_or(0)
  }

  /// Flattens every fault element from every detected-and-targeted finding
  /// across all analyzers, for the §4.1 fault localization formatter.
  pub fn targeted_fault_elements(
    &self,
    targeted_names: Option<&[String]>,
    targeted_ranges: Option<&[CodeRange]>,
  ) -> Vec<FaultElement> {
    self
      .entries
      .iter()
      .flat_map(|(_, vulns)| vulns.iter())
      .filter(|v| v.detected && v.is_targeted(targeted_names, targeted_ranges))
      .filter_map(|v| v.fault_localization_info.as_ref())
      .flatten()
      .cloned()
      .collect()
  }

  /// Drops entries with no findings, as required before an `AnalyzerResults`
  /// is attached to an individual (empty lists are filtered out).
  pub fn retain_non_empty(&mut self) {
    self.entries.retain(|(_, v)| !v.is_empty());
  }
}
