//! Evaluator: scores a batch of candidates by running every configured
//! detector and the gas ranker concurrently, then assembling fitness.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::{join_all, select_all};
use tracing::debug;

use crate::analyzer::Detector;
use crate::error::{RepairError, Result};
use crate::gas_ranker::GasRanker;
use crate::location::CodeRange;
use crate::patch::Individual;
use crate::score::{Fitness, GasMap};
use crate::vulnerability::{AnalyzerResult, AnalyzerResults, VulnerabilityInfo};

/// One configured detector: its name (used as the fitness hard-value key
/// and the vulnerability map key), the detector itself, and whether it may
/// be fast-failed once another skippable detector already found something
/// targeted.
pub struct ConfiguredDetector {
  pub name: String,
  pub detector: Arc<dyn Detector>,
  pub skippable: bool,
}

/// Runs detectors and the gas ranker over a batch of individuals and
/// assigns each its fitness.
pub struct Evaluator {
  detectors: Vec<ConfiguredDetector>,
  gas_ranker: Arc<GasRanker>,
  contract_name: String,
}

impl Evaluator {
  pub fn new(detectors: Vec<ConfiguredDetector>, gas_ranker: Arc<GasRanker>, contract_name: impl Into<String>) -> Self {
    Self { detectors, gas_ranker, contract_name: contract_name.into() }
  }

  pub fn analyzer_names(&self) -> Vec<String> {
    self.detectors.iter().map(|d| d.name.clone()).collect()
  }

  /// Scores every individual concurrently. Individuals that already carry
  /// fitness are left untouched.
  pub async fn evaluate(
    &self,
    individuals: &mut [Individual],
    targeted_names: Option<&[String]>,
    targeted_ranges: Option<&[CodeRange]>,
  ) -> Result<()> {
    let outcomes = join_all(
      individuals
        .iter()
        .filter(|ind| !ind.is_evaluated())
        .map(|ind| self.evaluate_one(ind, targeted_names, targeted_ranges)),
    )
    .await;

    let mut outcomes = outcomes.into_iter();
    for individual in individuals.iter_mut().filter(|ind| !ind.is_evaluated()) {
      let (fitness, vulnerability) = outcomes
        .next()
        .expect("one outcome per unevaluated individual")?;
      individual.assign_fitness(fitness, vulnerability);
    }
    Ok(())
  }

  async fn evaluate_one(
    &self,
    individual: &Individual,
    targeted_names: Option<&[String]>,
    targeted_ranges: Option<&[CodeRange]>,
  ) -> Result<(Fitness, AnalyzerResults)> {
    let source_path = individual.patch.patched_file.clone();
    let bound_ranges = match &individual.patch.modified_locations {
      Some(locs) if !locs.is_empty() => Some(locs.clone()),
      _ => None,
    };

    let (vulnerability, gas_cost) = tokio::try_join!(
      self.run_detectors(&source_path, bound_ranges.as_deref(), targeted_names, targeted_ranges),
      self.run_gas(&source_path),
    )?;

    let hard: Vec<i64> = self
      .detectors
      .iter()
      .map(|d| -(vulnerability.targeted_count(&d.name, targeted_names, targeted_ranges) as i64))
      .collect();
    let soft = vec![-(individual.patch.mutation_seq.len() as i64)];
    let mut gas: GasMap = GasMap::new();
    gas.insert(self.contract_name.clone(), gas_cost.round() as i64);

    Ok((Fitness::new(hard, soft, gas), vulnerability))
  }

  async fn run_gas(&self, source_path: &std::path::Path) -> Result<f64> {
    let gas_ranker = self.gas_ranker.clone();
    let source_path = source_path.to_path_buf();
    let contract_name = self.contract_name.clone();
    tokio::task::spawn_blocking(move || gas_ranker.rank_gas_blocking(&source_path, Some(&contract_name)))
      .await
      .map_err(|e| RepairError::other(format!("gas ranker task panicked: {e}")))?
  }

  /// Runs every configured detector, implementing the cooperative fast-fail
  /// cascade among skippable ones: once any skippable detector reports a
  /// targeted finding, the rest are cancelled and every skippable entry
  /// (including the one that fired) is replaced with the `FastFail`
  /// sentinel. Non-skippable detectors always run to completion.
  async fn run_detectors(
    &self,
    source_path: &std::path::Path,
    bound_ranges: Option<&[CodeRange]>,
    targeted_names: Option<&[String]>,
    targeted_ranges: Option<&[CodeRange]>,
  ) -> Result<AnalyzerResults> {
    type DetectOutcome = (String, std::result::Result<Result<AnalyzerResult>, tokio::task::JoinError>);
    type BoxedDetectFuture = Pin<Box<dyn Future<Output = DetectOutcome> + Send>>;

    let mut skippable_abort = Vec::new();
    let mut skippable_futs: Vec<BoxedDetectFuture> = Vec::new();
    let mut non_skippable_handles = Vec::new();

    for configured in &self.detectors {
      let detector = configured.detector.clone();
      let name = configured.name.clone();
      let source_path = source_path.to_path_buf();
      let contract_name = self.contract_name.clone();
      let bound_ranges = bound_ranges.map(|r| r.to_vec());
      let targeted_names = targeted_names.map(|n| n.to_vec());
      let skippable = configured.skippable;

      let handle = tokio::spawn(async move {
        detector
          .detect(
            &source_path,
            Some(&contract_name),
            bound_ranges.as_deref(),
            targeted_names.as_deref(),
            skippable,
          )
          .await
      });

      if skippable {
        skippable_abort.push((name.clone(), handle.abort_handle()));
        skippable_futs.push(Box::pin(async move {
          let result = handle.await;
          (name, result)
        }));
      } else {
        non_skippable_handles.push((name, handle));
      }
    }

    let skippable_names: Vec<String> = skippable_abort.iter().map(|(n, _)| n.clone()).collect();
    let mut finished_skippable = Vec::new();
    let mut fast_fail_triggered = false;
    let mut pending = skippable_futs;

    while !pending.is_empty() {
      let (outcome, _idx, rest) = select_all(pending).await;
      pending = rest;
      let (name, joined) = outcome;
      match joined {
        Ok(Ok(result)) => {
          let triggers =
            result.iter().any(|v| v.is_targeted(targeted_names, targeted_ranges));
          finished_skippable.push((name, result));
          if triggers && !fast_fail_triggered {
            fast_fail_triggered = true;
            debug!("fast-fail triggered, cancelling remaining skippable detectors");
            for (_, abort) in &skippable_abort {
              abort.abort();
            }
          }
        }
        Ok(Err(e)) => return Err(e),
        Err(join_err) if join_err.is_cancelled() => {}
        Err(join_err) => {
          return Err(RepairError::other(format!("detector {name} panicked: {join_err}")))
        }
      }
    }

    let mut results = AnalyzerResults::new();
    if fast_fail_triggered {
      for name in &skippable_names {
        results.insert(name.clone(), vec![VulnerabilityInfo::fast_fail()]);
      }
    } else {
      for (name, result) in finished_skippable {
        results.insert(name, result);
      }
    }

    for (name, handle) in non_skippable_handles {
      let result = handle
        .await
        .map_err(|e| RepairError::other(format!("detector {name} panicked: {e}")))??;
      results.insert(name, result);
    }

    Ok(results)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::patch::PatchInfo;
  use async_trait::async_trait;
  use std::path::{Path, PathBuf};
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct StubDetector {
    name: &'static str,
    findings: Vec<VulnerabilityInfo>,
    calls: Arc<AtomicUsize>,
  }

  #[async_trait]
  impl Detector for StubDetector {
    fn name(&self) -> &str {
      self.name
    }

    async fn detect(
      &self,
      _source_path: &Path,
      _contract_name: Option<&str>,
      _targeted_ranges: Option<&[CodeRange]>,
      _targeted_names: Option<&[String]>,
      _fast_fail: bool,
    ) -> Result<AnalyzerResult> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(self.findings.clone())
    }
  }

  fn make_individual() -> Individual {
    Individual::unevaluated(PatchInfo::original(PathBuf::from("Wallet.sol")))
  }

  #[tokio::test]
  async fn test_hard_values_one_per_analyzer() {
    let calls = Arc::new(AtomicUsize::new(0));
    let detectors = vec![
      ConfiguredDetector {
        name: "slither".to_string(),
        detector: Arc::new(StubDetector {
          name: "slither",
          findings: vec![VulnerabilityInfo::detected("reentrancy", None, None)],
          calls: calls.clone(),
        }),
        skippable: false,
      },
      ConfiguredDetector {
        name: "tests".to_string(),
        detector: Arc::new(StubDetector { name: "tests", findings: vec![], calls: calls.clone() }),
        skippable: false,
      },
    ];
    let evaluator = Evaluator::new(detectors, Arc::new(GasRanker::new("oyente/oyente")), "Wallet");
    let mut individuals = vec![make_individual()];
    // Gas ranker would fail without a real sandbox; exercise only detector
    // fan-out directly instead of the full evaluate() path.
    let result = evaluator
      .run_detectors(&PathBuf::from("Wallet.sol"), None, None, None)
      .await
      .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let _ = individuals;
  }

  #[tokio::test]
  async fn test_fast_fail_replaces_all_skippable_entries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let detectors = vec![
      ConfiguredDetector {
        name: "skip_a".to_string(),
        detector: Arc::new(StubDetector {
          name: "skip_a",
          findings: vec![VulnerabilityInfo::detected("reentrancy", None, None)],
          calls: calls.clone(),
        }),
        skippable: true,
      },
      ConfiguredDetector {
        name: "full".to_string(),
        detector: Arc::new(StubDetector {
          name: "full",
          findings: vec![VulnerabilityInfo::detected("unchecked_call", None, None)],
          calls: calls.clone(),
        }),
        skippable: false,
      },
    ];
    let evaluator = Evaluator::new(detectors, Arc::new(GasRanker::new("oyente/oyente")), "Wallet");
    let result = evaluator
      .run_detectors(&PathBuf::from("Wallet.sol"), None, None, None)
      .await
      .unwrap();
    let skip_result = result.get("skip_a").unwrap();
    assert_eq!(skip_result.len(), 1);
    assert!(skip_result[0].is_fast_fail());
    let full_result = result.get("full").unwrap();
    assert_eq!(full_result[0].name, "unchecked_call");
  }
}
