//! The Pareto archive: the maximal set of mutually non-dominated
//! individuals observed across the whole run.

use crate::patch::Individual;

/// Insert-if-non-dominated, evict-dominated archive. Every member is kept
/// mutually non-dominated with every other member at all times.
#[derive(Default)]
pub struct Archive {
  members: Vec<Individual>,
}

impl Archive {
  pub fn new() -> Self {
    Self::default()
  }

  /// Offers each candidate to the archive in turn.
  pub fn update(&mut self, candidates: impl IntoIterator<Item = Individual>) {
    for candidate in candidates {
      self.insert(candidate);
    }
  }

  /// Inserts `candidate` if no current member dominates it, evicting any
  /// current member the candidate itself dominates. Candidates must already
  /// be evaluated.
  pub fn insert(&mut self, candidate: Individual) {
    let candidate_fitness = candidate.fitness().clone();
    if self.members.iter().any(|m| m.fitness().dominates(&candidate_fitness)) {
      return;
    }
    self.members.retain(|m| !candidate_fitness.dominates(m.fitness()));
    self.members.push(candidate);
  }

  pub fn members(&self) -> &[Individual] {
    &self.members
  }

  pub fn len(&self) -> usize {
    self.members.len()
  }

  pub fn is_empty(&self) -> bool {
    self.members.is_empty()
  }

  /// Whether every pair of members is mutually non-dominated; the
  /// structural invariant the archive is supposed to maintain at all times.
  pub fn is_anti_chain(&self) -> bool {
    self.members.iter().enumerate().all(|(i, a)| {
      self
        .members
        .iter()
        .enumerate()
        .all(|(j, b)| i == j || a.fitness().mutually_non_dominated(b.fitness()))
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::patch::PatchInfo;
  use crate::score::Fitness;
  use crate::vulnerability::AnalyzerResults;
  use std::collections::BTreeMap;
  use std::path::PathBuf;

  fn individual(hard: i64, soft: i64, gas: i64) -> Individual {
    let mut ind = Individual::unevaluated(PatchInfo::original(PathBuf::from("Wallet.sol")));
    let mut gas_map = BTreeMap::new();
    gas_map.insert("Wallet".to_string(), gas);
    ind.assign_fitness(Fitness::new(vec![hard], vec![soft], gas_map), AnalyzerResults::new());
    ind
  }

  #[test]
  fn test_dominated_candidate_rejected() {
    let mut archive = Archive::new();
    archive.insert(individual(0, 0, 100));
    archive.insert(individual(-1, 0, 200));
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.members()[0].fitness().hard, vec![0]);
  }

  #[test]
  fn test_dominating_candidate_evicts_members() {
    let mut archive = Archive::new();
    archive.insert(individual(-1, 0, 200));
    archive.insert(individual(0, 0, 100));
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.members()[0].fitness().hard, vec![0]);
  }

  #[test]
  fn test_non_dominated_candidates_coexist() {
    let mut archive = Archive::new();
    archive.insert(individual(0, 0, 200));
    archive.insert(individual(-1, 0, 50));
    assert_eq!(archive.len(), 2);
    assert!(archive.is_anti_chain());
  }

  #[test]
  fn test_update_processes_batch() {
    let mut archive = Archive::new();
    archive.update(vec![individual(0, 0, 200), individual(-1, 0, 50), individual(-5, 0, 500)]);
    assert!(archive.is_anti_chain());
  }
}
