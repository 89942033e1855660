//! Fault Localization Formatter (§4.1): turns analyzer findings into the
//! textual fault-space specifier fed back to the mutation engine.

use crate::fault::FaultLocalization;
use crate::location::CodeRange;
use crate::vulnerability::AnalyzerResults;

/// Flattens every fault element from every detected-and-targeted finding
/// across all analyzers into one specifier string. Empty input yields the
/// empty string, which the Mutation Engine Client treats as "no specifier".
pub fn format_fault_specifier(
  vulnerability: &AnalyzerResults,
  targeted_names: Option<&[String]>,
  targeted_ranges: Option<&[CodeRange]>,
) -> String {
  let elements = vulnerability.targeted_fault_elements(targeted_names, targeted_ranges);
  FaultLocalization::new(elements).to_specifier_string()
}
