//! Patches and the individuals the MOGA engine breeds, scores, and selects
//! among.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::location::CodeRange;
use crate::score::Fitness;
use crate::vulnerability::AnalyzerResults;

/// One opaque mutation token; the mutation engine owns its internal shape,
/// the core only ever stores, lengthens, and forwards it.
pub type MutationToken = Vec<String>;

/// An ordered sequence of mutation tokens describing how a patch was bred
/// from the original source.
pub type MutationSequence = Vec<MutationToken>;

/// The reduced, externally-returned form of a plausible patch: just the
/// path to the patched file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlausiblePatch {
  pub patched_file: PathBuf,
}

impl PlausiblePatch {
  pub fn new(patched_file: PathBuf) -> Self {
    Self { patched_file }
  }
}

/// A candidate patch as returned by the mutation engine: the mutation
/// history that produced it, the compiled artifact on disk, and (when
/// known) the source ranges it touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchInfo {
  pub mutation_seq: MutationSequence,
  pub patched_file: PathBuf,
  pub modified_locations: Option<Vec<CodeRange>>,
}

impl PatchInfo {
  pub fn new(
    mutation_seq: MutationSequence,
    patched_file: PathBuf,
    modified_locations: Option<Vec<CodeRange>>,
  ) -> Self {
    Self { mutation_seq, patched_file, modified_locations }
  }

  /// The original, unmutated source as a zero-length-sequence patch.
  pub fn original(source_path: PathBuf) -> Self {
    Self { mutation_seq: Vec::new(), patched_file: source_path, modified_locations: None }
  }
}

/// A patch paired with the fitness and vulnerability findings the Evaluator
/// assigns it. Created empty (unevaluated) by the MOGA Engine; only the
/// Evaluator ever populates `fitness`/`vulnerability`.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
  pub patch: PatchInfo,
  pub fitness: Option<Fitness>,
  pub vulnerability: AnalyzerResults,
}

impl Individual {
  /// A freshly bred, not-yet-evaluated individual.
  pub fn unevaluated(patch: PatchInfo) -> Self {
    Self { patch, fitness: None, vulnerability: AnalyzerResults::new() }
  }

  pub fn is_evaluated(&self) -> bool {
    self.fitness.is_some()
  }

  /// Called by the Evaluator once analyzer and gas results are in hand.
  /// Asserts the individual wasn't already scored: fitness is assigned
  /// exactly once, never partially.
  pub fn assign_fitness(&mut self, fitness: Fitness, mut vulnerability: AnalyzerResults) {
    debug_assert!(!self.is_evaluated(), "fitness assigned twice to the same individual");
    vulnerability.retain_non_empty();
    self.vulnerability = vulnerability;
    self.fitness = Some(fitness);
  }

  pub fn fitness(&self) -> &Fitness {
    self.fitness.as_ref().expect("individual accessed before evaluation")
  }
}
