//! MOGA Engine (§4.7): the control loop that breeds, evaluates, selects, and
//! archives candidate patches until a plausible one is found or the run
//! exhausts its budget.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::archive::Archive;
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::fault_localization::format_fault_specifier;
use crate::location::CodeRange;
use crate::mutation_engine::{MutationEngineClient, RequestObject};
use crate::patch::{Individual, PatchInfo, PlausiblePatch};
use crate::repair_target::RepairTarget;
use crate::selection::{nsga2_select, select_best};
use crate::stats::GenerationStats;
use crate::vulnerability::AnalyzerResults;

/// Configurable constants governing one repair run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub p_crossover: f64,
  pub init_population_size: usize,
  pub max_population_size: usize,
  pub seed: Option<u64>,
  /// Captured for parity with the upstream tuning surface; this
  /// implementation does not yet enforce a cap on bred mutation sequence
  /// length.
  pub max_mutation_distance: Option<u32>,
  pub max_trials: Option<usize>,
  pub num_plausible: Option<usize>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      p_crossover: 0.3,
      init_population_size: 8,
      max_population_size: 20,
      seed: None,
      max_mutation_distance: None,
      max_trials: None,
      num_plausible: None,
    }
  }
}

/// The MOGA Engine's control state. Built once per repair run and consumed
/// by `run`.
pub struct Engine {
  config: EngineConfig,
  evaluator: Evaluator,
  repair_target: RepairTarget,
  analyzer_names: Vec<String>,
  targeted_names: Option<Vec<String>>,
  targeted_ranges: Option<Vec<CodeRange>>,
  fault_specifier_override: Option<String>,
  mutation_engine_binary: String,
  mutation_types: Vec<String>,

  populations: Vec<Individual>,
  archive: Archive,
  mutation_engine: Option<MutationEngineClient>,
  num_evaluated: usize,
  op: String,
  rng: StdRng,
}

impl Engine {
  pub fn new(
    config: EngineConfig,
    evaluator: Evaluator,
    repair_target: RepairTarget,
    mutation_engine_binary: impl Into<String>,
    mutation_types: Vec<String>,
    targeted_names: Option<Vec<String>>,
    targeted_ranges: Option<Vec<CodeRange>>,
    fault_specifier_override: Option<String>,
  ) -> Self {
    let analyzer_names = evaluator.analyzer_names();
    let rng = match config.seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };
    Self {
      config,
      evaluator,
      repair_target,
      analyzer_names,
      targeted_names,
      targeted_ranges,
      fault_specifier_override,
      mutation_engine_binary: mutation_engine_binary.into(),
      mutation_types,
      populations: Vec::new(),
      archive: Archive::new(),
      mutation_engine: None,
      num_evaluated: 0,
      op: "init".to_string(),
      rng,
    }
  }

  pub fn archive(&self) -> &Archive {
    &self.archive
  }

  pub fn num_evaluated(&self) -> usize {
    self.num_evaluated
  }

  fn targeted_names_ref(&self) -> Option<&[String]> {
    self.targeted_names.as_deref()
  }

  fn targeted_ranges_ref(&self) -> Option<&[CodeRange]> {
    self.targeted_ranges.as_deref()
  }

  fn total_targeted(&self, vulnerability: &AnalyzerResults) -> usize {
    vulnerability
      .iter()
      .flat_map(|(_, vulns)| vulns.iter())
      .filter(|v| v.is_targeted(self.targeted_names_ref(), self.targeted_ranges_ref()))
      .count()
  }

  fn mutation_engine(&self) -> &MutationEngineClient {
    self.mutation_engine.as_ref().expect("mutation engine client opened during startup")
  }

  /// Runs the full repair loop against `source_path`, returning whatever
  /// plausible patches were found (empty if the search was exhausted or a
  /// budget was hit).
  pub async fn run(&mut self, source_path: &Path) -> Result<Vec<PlausiblePatch>> {
    let mut original = Individual::unevaluated(PatchInfo::original(source_path.to_path_buf()));
    self.evaluator.evaluate(std::slice::from_mut(&mut original), self.targeted_names_ref(), self.targeted_ranges_ref()).await?;

    if self.total_targeted(&original.vulnerability) == 0 {
      info!("original source has no targeted vulnerabilities, nothing to repair");
      self.num_evaluated += 1;
      return Ok(vec![PlausiblePatch::new(original.patch.patched_file.clone())]);
    }

    let fault_specifier = match &self.fault_specifier_override {
      Some(spec) => spec.clone(),
      None => format_fault_specifier(&original.vulnerability, self.targeted_names_ref(), self.targeted_ranges_ref()),
    };
    let fault_specifier = if fault_specifier.is_empty() { None } else { Some(fault_specifier) };

    let client = MutationEngineClient::spawn(
      &self.mutation_engine_binary,
      source_path,
      self.config.seed,
      fault_specifier.as_deref(),
      &self.mutation_types,
    )
    .await?;
    self.mutation_engine = Some(client);

    let mut initial = Vec::new();
    if let Some(patch) = self.mutation_engine().request(RequestObject::Random { n: 1 }).await? {
      let mut ind = Individual::unevaluated(patch);
      self.evaluator.evaluate(std::slice::from_mut(&mut ind), self.targeted_names_ref(), self.targeted_ranges_ref()).await?;
      initial.push(ind);
    }

    let remaining = self.config.init_population_size.saturating_sub(1);
    let mut more_patches = Vec::with_capacity(remaining);
    for _ in 0..remaining {
      let result = self
        .mutation_engine()
        .request(RequestObject::Mutate { base_seq: Vec::new(), override_fault_spec: fault_specifier.clone() })
        .await?;
      if let Some(patch) = result {
        more_patches.push(patch);
      }
    }
    let mut more: Vec<Individual> = more_patches.into_iter().map(Individual::unevaluated).collect();
    self.evaluator.evaluate(&mut more, self.targeted_names_ref(), self.targeted_ranges_ref()).await?;
    initial.extend(more);
    initial.push(original);

    let count = initial.len();
    self.populations = nsga2_select(initial, count);
    let mut new_candidates = self.populations.clone();

    let mut generation = 0usize;
    loop {
      if !new_candidates.is_empty() {
        let stats = GenerationStats::record(generation, &self.op, &new_candidates, self.targeted_names_ref(), self.targeted_ranges_ref());
        info!("{stats}");

        self.archive.update(new_candidates.iter().cloned());
        self.num_evaluated += new_candidates.len();

        let mut plausible: Vec<&Individual> = new_candidates
          .iter()
          .filter(|c| self.repair_target.is_fulfilled(&c.vulnerability, &self.analyzer_names, self.targeted_names_ref(), self.targeted_ranges_ref()))
          .collect();
        if !plausible.is_empty() {
          plausible.sort_by(|a, b| {
            (b.fitness().hard.clone(), b.fitness().soft.clone()).cmp(&(a.fitness().hard.clone(), a.fitness().soft.clone()))
          });
          let cap = self.config.num_plausible.unwrap_or(usize::MAX);
          let result = plausible
            .into_iter()
            .take(cap)
            .map(|p| PlausiblePatch::new(p.patch.patched_file.clone()))
            .collect();
          self.mutation_engine().shutdown().await;
          return Ok(result);
        }

        if let Some(max_trials) = self.config.max_trials {
          if self.num_evaluated >= max_trials {
            self.mutation_engine().shutdown().await;
            return Ok(Vec::new());
          }
        }
      }

      let max_population_size = self.config.max_population_size;
      self.populations = nsga2_select(std::mem::take(&mut self.populations), max_population_size);

      let u: f64 = self.rng.gen();
      let use_crossover = u < self.config.p_crossover;
      self.op = if use_crossover { "crossover" } else { "mutate" }.to_string();

      let mut bred = if use_crossover { self.crossover_step().await? } else { self.mutate_step().await? };

      if self.populations.is_empty() {
        self.mutation_engine().shutdown().await;
        return Ok(Vec::new());
      }

      self.evaluator.evaluate(&mut bred, self.targeted_names_ref(), self.targeted_ranges_ref()).await?;
      self.populations.extend(bred.iter().cloned());
      new_candidates = bred;
      generation += 1;
    }
  }

  /// Mutates up to 4 of the fittest parents, removing any that turn out to
  /// be unmutatable from `populations`.
  async fn mutate_step(&mut self) -> Result<Vec<Individual>> {
    let parent_indices = select_best(&self.populations, 4);
    let mut new_individuals = Vec::new();
    let mut unmutatable = Vec::new();

    for &idx in &parent_indices {
      let parent = &self.populations[idx];
      let spec = format_fault_specifier(&parent.vulnerability, self.targeted_names_ref(), self.targeted_ranges_ref());
      let override_spec = if spec.is_empty() { None } else { Some(spec) };
      let result = self
        .mutation_engine()
        .request(RequestObject::Mutate { base_seq: parent.patch.mutation_seq.clone(), override_fault_spec: override_spec })
        .await?;
      match result {
        Some(patch) => new_individuals.push(Individual::unevaluated(patch)),
        None => unmutatable.push(idx),
      }
    }

    unmutatable.sort_unstable_by(|a, b| b.cmp(a));
    for idx in unmutatable {
      self.populations.remove(idx);
    }
    Ok(new_individuals)
  }

  /// Crosses every unordered pair among up to 4 of the fittest parents.
  async fn crossover_step(&mut self) -> Result<Vec<Individual>> {
    let parent_indices = select_best(&self.populations, 4);
    let mut new_individuals = Vec::new();

    for i in 0..parent_indices.len() {
      for j in (i + 1)..parent_indices.len() {
        let seq1 = self.populations[parent_indices[i]].patch.mutation_seq.clone();
        let seq2 = self.populations[parent_indices[j]].patch.mutation_seq.clone();
        let cp1 = draw_crossover_point(&mut self.rng, seq1.len());
        let cp2 = draw_crossover_point(&mut self.rng, seq2.len());
        let result = self
          .mutation_engine()
          .request(RequestObject::CrossoverOnePoint { seq1, cp1, seq2, cp2 })
          .await?;
        if let Some(patch) = result {
          new_individuals.push(Individual::unevaluated(patch));
        }
      }
    }
    Ok(new_individuals)
  }
}

/// Draws a crossover point uniformly from `[-1, seq_len - 1]`.
fn draw_crossover_point(rng: &mut StdRng, seq_len: usize) -> i64 {
  rng.gen_range(-1..=(seq_len as i64 - 1))
}
