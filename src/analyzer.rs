//! Static Analyzer Adapter: the trait other analyzers can implement, and the
//! one concrete implementation (a graph-based static analyzer) that ships
//! with the crate.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::error::{RepairError, Result};
use crate::fault::FaultElement;
use crate::location::{CodeRange, Location};
use crate::sandbox::SandboxCommand;
use crate::vulnerability::{AnalyzerResult, VulnerabilityInfo};

/// A vulnerability detector run against one candidate source file: a static
/// analyzer or the dynamic test runner, from the Evaluator's point of view
/// they're interchangeable. The crate ships one static implementation;
/// others can be added behind this trait without touching the Evaluator.
#[async_trait]
pub trait Detector: Send + Sync {
  fn name(&self) -> &str;

  /// `fast_fail` is accepted for signature symmetry across implementers;
  /// this adapter never special-cases it internally. Cooperative
  /// short-circuiting across analyzers is the Evaluator's job (§4.6), not
  /// a single adapter's.
  async fn detect(
    &self,
    source_path: &Path,
    contract_name: Option<&str>,
    targeted_ranges: Option<&[CodeRange]>,
    targeted_names: Option<&[String]>,
    fast_fail: bool,
  ) -> Result<AnalyzerResult>;
}

/// Collapses known synonym check ids onto one canonical vulnerability name.
/// Integer over/underflow variants are deliberately left unmapped: the
/// upstream tool left those commented out and behavior for them is
/// undefined here.
fn canonical_name(check: &str) -> &str {
  match check {
    "reentrancy-eth" | "reentrancy-no-eth" => "reentrancy",
    "unused-return" | "unchecked-lowlevel" | "unchecked-send" => "unchecked_call",
    other => other,
  }
}

#[derive(Debug, Deserialize)]
struct RawOutput {
  success: bool,
  error: Option<String>,
  results: Option<RawResults>,
}

#[derive(Debug, Deserialize)]
struct RawResults {
  detectors: Vec<RawDetector>,
}

#[derive(Debug, Deserialize)]
struct RawDetector {
  check: String,
  elements: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
struct RawElement {
  #[serde(rename = "type")]
  element_type: String,
  source_mapping: Option<RawSourceMapping>,
  name: Option<String>,
  type_specific_fields: Option<RawTypeSpecificFields>,
}

#[derive(Debug, Deserialize)]
struct RawTypeSpecificFields {
  parent: Option<RawParent>,
}

#[derive(Debug, Deserialize)]
struct RawParent {
  name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSourceMapping {
  lines: Vec<u32>,
  starting_column: u32,
  ending_column: u32,
}

impl RawSourceMapping {
  /// 1-based lines stay 1-based; 1-based columns convert to 0-based,
  /// matching the upstream tool this behavior is grounded on.
  fn to_code_range(&self) -> Option<CodeRange> {
    let start_line = *self.lines.first()?;
    let end_line = *self.lines.last()?;
    let start = Location::new(start_line, Some(self.starting_column.saturating_sub(1)));
    let end = Location::new(end_line, Some(self.ending_column.saturating_sub(1)));
    if start > end {
      return None;
    }
    Some(CodeRange::new(start, end))
  }
}

/// Every function element's node type is the literal `"Block"`, regardless
/// of the check that produced it; the check id only ever names the
/// vulnerability, never the node-type specifier.
const FUNCTION_NODE_TYPE: &str = "Block";

fn parse_detector(detector: &RawDetector, _contract_name: Option<&str>) -> VulnerabilityInfo {
  let mut fault_elements = Vec::new();
  for element in &detector.elements {
    if let Some(mapping) = &element.source_mapping {
      if let Some(range) = mapping.to_code_range() {
        fault_elements.push(FaultElement::location(range, None));
      }
    }
    if element.element_type == "function" {
      let element_contract =
        element.type_specific_fields.as_ref().and_then(|f| f.parent.as_ref()).and_then(|p| p.name.clone());
      fault_elements.push(FaultElement::node_type(
        FUNCTION_NODE_TYPE,
        element_contract,
        element.name.clone(),
        None,
      ));
    }
  }
  let fault_localization_info = if fault_elements.is_empty() { None } else { Some(fault_elements) };
  VulnerabilityInfo::detected(canonical_name(&detector.check), None, fault_localization_info)
}

/// The graph-based static analyzer that ships with the crate.
#[derive(Debug, Clone)]
pub struct GraphAnalyzer {
  pub docker_image: String,
}

impl GraphAnalyzer {
  pub fn new(docker_image: impl Into<String>) -> Self {
    Self { docker_image: docker_image.into() }
  }
}

#[async_trait]
impl Detector for GraphAnalyzer {
  fn name(&self) -> &str {
    "slither"
  }

  async fn detect(
    &self,
    source_path: &Path,
    contract_name: Option<&str>,
    _targeted_ranges: Option<&[CodeRange]>,
    _targeted_names: Option<&[String]>,
    _fast_fail: bool,
  ) -> Result<AnalyzerResult> {
    let cmd = SandboxCommand::new(
      self.docker_image.clone(),
      vec![source_path.display().to_string()],
      source_path.parent().unwrap_or_else(|| Path::new(".")),
    );
    let image = self.docker_image.clone();
    let raw = tokio::task::spawn_blocking(move || cmd.run_blocking())
      .await
      .map_err(|e| RepairError::other(format!("analyzer task panicked: {e}")))??;

    let parsed: RawOutput = serde_json::from_str(&raw)
      .map_err(|source| RepairError::MalformedAnalyzerOutput { analyzer: image, source })?;

    if !parsed.success {
      return Err(RepairError::AnalyzerFailure {
        analyzer: self.name().to_string(),
        message: parsed.error.unwrap_or_else(|| "analyzer reported failure".to_string()),
      });
    }

    let Some(results) = parsed.results else {
      warn!(analyzer = self.name(), "no results block in successful run");
      return Ok(Vec::new());
    };

    Ok(results.detectors.iter().map(|d| parse_detector(d, contract_name)).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reentrancy_aliases_collapse() {
    assert_eq!(canonical_name("reentrancy-eth"), "reentrancy");
    assert_eq!(canonical_name("reentrancy-no-eth"), "reentrancy");
  }

  #[test]
  fn test_unchecked_call_aliases_collapse() {
    assert_eq!(canonical_name("unused-return"), "unchecked_call");
    assert_eq!(canonical_name("unchecked-lowlevel"), "unchecked_call");
    assert_eq!(canonical_name("unchecked-send"), "unchecked_call");
  }

  #[test]
  fn test_unmapped_check_passes_through() {
    assert_eq!(canonical_name("arbitrary-send"), "arbitrary-send");
  }

  #[test]
  fn test_source_mapping_column_conversion() {
    let mapping = RawSourceMapping { lines: vec![4, 5], starting_column: 2, ending_column: 10 };
    let range = mapping.to_code_range().unwrap();
    assert_eq!(range.start, Location::new(4, Some(1)));
    assert_eq!(range.end, Location::new(5, Some(9)));
  }

  #[test]
  fn test_parse_detector_combines_location_and_node_type() {
    let detector = RawDetector {
      check: "reentrancy-eth".to_string(),
      elements: vec![
        RawElement {
          element_type: "node".to_string(),
          source_mapping: Some(RawSourceMapping { lines: vec![3], starting_column: 1, ending_column: 5 }),
          name: None,
          type_specific_fields: None,
        },
        RawElement {
          element_type: "function".to_string(),
          source_mapping: None,
          name: Some("withdraw".to_string()),
          type_specific_fields: Some(RawTypeSpecificFields {
            parent: Some(RawParent { name: Some("Wallet".to_string()) }),
          }),
        },
      ],
    };
    // A deliberately different configured contract name: it must not leak
    // into the function element's contract, which comes from
    // `type_specific_fields.parent.name` instead.
    let vuln = parse_detector(&detector, Some("OtherContract"));
    assert_eq!(vuln.name, "reentrancy");
    let elements = vuln.fault_localization_info.unwrap();
    assert_eq!(elements.len(), 2);
    let node_type_element = elements
      .iter()
      .find(|e| matches!(e, FaultElement::NodeType { .. }))
      .expect("a NodeType fault element for the function");
    match node_type_element {
      FaultElement::NodeType { node_type, contract, function, .. } => {
        assert_eq!(node_type, "Block");
        assert_eq!(contract.as_deref(), Some("Wallet"));
        assert_eq!(function.as_deref(), Some("withdraw"));
      }
      _ => unreachable!(),
    }
  }

  #[test]
  fn test_parse_detector_function_element_without_parent_has_no_contract() {
    let detector = RawDetector {
      check: "reentrancy-eth".to_string(),
      elements: vec![RawElement {
        element_type: "function".to_string(),
        source_mapping: None,
        name: Some("withdraw".to_string()),
        type_specific_fields: None,
      }],
    };
    let vuln = parse_detector(&detector, Some("Wallet"));
    let elements = vuln.fault_localization_info.unwrap();
    match &elements[0] {
      FaultElement::NodeType { node_type, contract, .. } => {
        assert_eq!(node_type, "Block");
        assert_eq!(*contract, None);
      }
      _ => unreachable!(),
    }
  }

  #[test]
  fn test_parse_detector_with_no_elements_has_no_fault_info() {
    let detector = RawDetector { check: "timestamp".to_string(), elements: vec![] };
    let vuln = parse_detector(&detector, None);
    assert!(vuln.fault_localization_info.is_none());
  }
}
