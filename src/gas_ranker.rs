//! Gas Ranker: invokes a symbolic execution tool in a sandbox and reduces
//! its per-path gas costs to a single number for the fitness gas map.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{RepairError, Result};
use crate::sandbox::SandboxCommand;

/// `{contract -> {path_gas: {pathId -> cost}}}` as emitted by the symbolic
/// tool.
#[derive(Debug, Deserialize)]
struct GasToolOutput {
  #[serde(flatten)]
  contracts: BTreeMap<String, ContractGas>,
}

#[derive(Debug, Deserialize)]
struct ContractGas {
  path_gas: BTreeMap<String, i64>,
}

/// Configuration fixed for the lifetime of a repair run.
#[derive(Debug, Clone)]
pub struct GasRanker {
  pub docker_image: String,
}

impl GasRanker {
  pub fn new(docker_image: impl Into<String>) -> Self {
    Self { docker_image: docker_image.into() }
  }

  /// Runs the symbolic tool on `source_path` and returns the arithmetic
  /// mean of path costs, scoped to `contract_name` if given. Dispatched by
  /// the caller onto a blocking worker pool; this function itself performs
  /// no async waiting, only blocking subprocess IO.
  pub fn rank_gas_blocking(&self, source_path: &Path, contract_name: Option<&str>) -> Result<f64> {
    let cmd = SandboxCommand::new(
      self.docker_image.clone(),
      vec!["-s".to_string(), source_path.display().to_string()],
      source_path.parent().unwrap_or_else(|| Path::new(".")),
    );
    let raw = cmd.run_blocking()?;
    let parsed: GasToolOutput =
      serde_json::from_str(&raw).map_err(RepairError::MalformedGasOutput)?;
    path_costs_mean(&parsed, contract_name, source_path)
  }
}

fn path_costs_mean(
  output: &GasToolOutput,
  contract_name: Option<&str>,
  source_path: &Path,
) -> Result<f64> {
  let costs: Vec<i64> = match contract_name {
    Some(name) => {
      let contract = output
        .contracts
        .get(name)
        .ok_or_else(|| RepairError::ContractNotAnalyzed(name.to_string()))?;
      contract.path_gas.values().copied().collect()
    }
    None => output.contracts.values().flat_map(|c| c.path_gas.values().copied()).collect(),
  };

  if costs.is_empty() {
    return Err(RepairError::other(format!(
      "no gas paths reported for {}",
      source_path.display()
    )));
  }
  Ok(costs.iter().sum::<i64>() as f64 / costs.len() as f64)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_output() -> GasToolOutput {
    let mut contracts = BTreeMap::new();
    contracts.insert(
      "Wallet".to_string(),
      ContractGas { path_gas: BTreeMap::from([("p0".to_string(), 10), ("p1".to_string(), 20)]) },
    );
    contracts.insert(
      "Other".to_string(),
      ContractGas { path_gas: BTreeMap::from([("p0".to_string(), 100)]) },
    );
    GasToolOutput { contracts }
  }

  #[test]
  fn test_mean_for_named_contract() {
    let output = sample_output();
    let mean = path_costs_mean(&output, Some("Wallet"), Path::new("x.sol")).unwrap();
    assert_eq!(mean, 15.0);
  }

  #[test]
  fn test_mean_across_all_contracts_when_unscoped() {
    let output = sample_output();
    let mean = path_costs_mean(&output, None, Path::new("x.sol")).unwrap();
    assert_eq!(mean, (10.0 + 20.0 + 100.0) / 3.0);
  }

  #[test]
  fn test_unknown_contract_is_fatal() {
    let output = sample_output();
    let err = path_costs_mean(&output, Some("Nope"), Path::new("x.sol")).unwrap_err();
    assert!(matches!(err, RepairError::ContractNotAnalyzed(name) if name == "Nope"));
  }

  #[test]
  fn test_parses_real_shaped_json() {
    let raw = r#"{"Wallet": {"path_gas": {"0": 500, "1": 700}}}"#;
    let parsed: GasToolOutput = serde_json::from_str(raw).unwrap();
    assert_eq!(parsed.contracts.len(), 1);
  }
}
