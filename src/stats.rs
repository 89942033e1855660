//! Per-generation statistics (§4.11): a plain recorder rebuilt from each
//! batch of newly-evaluated candidates, never called on an empty batch.

use std::collections::BTreeMap;
use std::fmt;

use crate::location::CodeRange;
use crate::patch::Individual;

/// The cap on per-analyzer vulnerability counts shown for the batch's best
/// patch, purely a display concern.
const TOP_VULN_DISPLAY_CAP: usize = 5;

/// One generation's worth of statistics, computed from `newCandidates`.
pub struct GenerationStats {
  pub generation: usize,
  pub op: String,
  pub batch_size: usize,
  pub min_hard: Vec<i64>,
  pub max_hard: Vec<i64>,
  pub best_vuln_counts: BTreeMap<String, usize>,
  pub targeted_counts: Vec<usize>,
}

impl GenerationStats {
  /// Builds a record from a non-empty batch. Panics on an empty batch: the
  /// engine is responsible for skipping the call entirely in that case.
  pub fn record(
    generation: usize,
    op: &str,
    batch: &[Individual],
    targeted_names: Option<&[String]>,
    targeted_ranges: Option<&[CodeRange]>,
  ) -> Self {
    assert!(!batch.is_empty(), "statistics are never recorded for an empty batch");

    let arity = batch[0].fitness().hard.len();
    let mut min_hard = vec![i64::MAX; arity];
    let mut max_hard = vec![i64::MIN; arity];
    for individual in batch {
      for (i, v) in individual.fitness().hard.iter().enumerate() {
        min_hard[i] = min_hard[i].min(*v);
        max_hard[i] = max_hard[i].max(*v);
      }
    }

    let best = batch
      .iter()
      .max_by(|a, b| {
        a.fitness()
          .hard
          .iter()
          .sum::<i64>()
          .cmp(&b.fitness().hard.iter().sum::<i64>())
      })
      .expect("batch is non-empty");

    let mut best_vuln_counts = BTreeMap::new();
    for (analyzer, results) in best.vulnerability.iter() {
      let count = results.iter().filter(|v| v.detected).count();
      best_vuln_counts.insert(analyzer.to_string(), count);
    }
    if best_vuln_counts.len() > TOP_VULN_DISPLAY_CAP {
      let keep: Vec<String> = best_vuln_counts.keys().take(TOP_VULN_DISPLAY_CAP).cloned().collect();
      best_vuln_counts.retain(|k, _| keep.contains(k));
    }

    let targeted_counts = batch
      .iter()
      .map(|individual| {
        individual
          .vulnerability
          .iter()
          .flat_map(|(_, vulns)| vulns.iter())
          .filter(|v| v.is_targeted(targeted_names, targeted_ranges))
          .count()
      })
      .collect();

    Self { generation, op: op.to_string(), batch_size: batch.len(), min_hard, max_hard, best_vuln_counts, targeted_counts }
  }
}

impl fmt::Display for GenerationStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "gen {:>4} [{:>9}] n={:<3} hard=[{:?}..{:?}] best={:?} targeted={:?}",
      self.generation, self.op, self.batch_size, self.min_hard, self.max_hard, self.best_vuln_counts, self.targeted_counts
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::patch::PatchInfo;
  use crate::score::Fitness;
  use crate::vulnerability::{AnalyzerResults, VulnerabilityInfo};
  use std::collections::BTreeMap as Map;
  use std::path::PathBuf;

  fn individual(hard: Vec<i64>, vulns: AnalyzerResults) -> Individual {
    let mut ind = Individual::unevaluated(PatchInfo::original(PathBuf::from("Wallet.sol")));
    ind.assign_fitness(Fitness::new(hard, vec![0], Map::new()), vulns);
    ind
  }

  #[test]
  #[should_panic(expected = "never recorded for an empty batch")]
  fn test_empty_batch_panics() {
    GenerationStats::record(0, "init", &[], None, None);
  }

  #[test]
  fn test_min_max_hard_across_batch() {
    let batch = vec![individual(vec![-1], AnalyzerResults::new()), individual(vec![-3], AnalyzerResults::new())];
    let stats = GenerationStats::record(0, "init", &batch, None, None);
    assert_eq!(stats.min_hard, vec![-3]);
    assert_eq!(stats.max_hard, vec![-1]);
  }

  #[test]
  fn test_best_vuln_counts_from_top_individual() {
    let mut vulns = AnalyzerResults::new();
    vulns.insert("slither", vec![VulnerabilityInfo::detected("reentrancy", None, None)]);
    let batch = vec![individual(vec![0], vulns), individual(vec![-5], AnalyzerResults::new())];
    let stats = GenerationStats::record(0, "mutate", &batch, None, None);
    assert_eq!(stats.best_vuln_counts.get("slither"), Some(&1));
  }

  #[test]
  fn test_display_renders_a_row() {
    let batch = vec![individual(vec![0], AnalyzerResults::new())];
    let stats = GenerationStats::record(2, "crossover", &batch, None, None);
    let rendered = stats.to_string();
    assert!(rendered.contains("crossover"));
    assert!(rendered.contains('2'));
  }
}
