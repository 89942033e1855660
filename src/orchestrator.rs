//! Orchestrator (§4.8): builds the engine's collaborators from configuration
//! and runs the engine under a global wall-clock timeout, printing the
//! user-visible result.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::analyzer::{Detector, GraphAnalyzer};
use crate::cli::Config;
use crate::dynamic_runner::DynamicTestRunner;
use crate::engine::{Engine, EngineConfig};
use crate::error::Result;
use crate::evaluator::{ConfiguredDetector, Evaluator};
use crate::gas_ranker::GasRanker;
use crate::patch::PlausiblePatch;

/// Runs one repair attempt end to end and prints its result to stdout.
/// Returns the process exit code per §6: `0` on normal termination
/// (plausible found or exhaustively searched), nonzero on fatal error.
pub async fn run(config: Config) -> i32 {
  match run_inner(config).await {
    Ok(patches) => {
      print_result(&patches);
      0
    }
    Err(err) => {
      error!(error = %err, "repair run aborted");
      eprintln!("fatal error: {err}");
      1
    }
  }
}

async fn run_inner(config: Config) -> Result<Vec<PlausiblePatch>> {
  let evaluator = build_evaluator(&config);
  let repair_target = config.repair_target.clone();
  let engine_config = EngineConfig {
    p_crossover: config.p_crossover,
    init_population_size: config.num_init_population,
    max_population_size: config.max_size_population,
    seed: config.seed,
    max_mutation_distance: config.max_mutation_dist,
    max_trials: config.max_trials,
    num_plausible: config.num_plausible,
  };

  let mut engine = Engine::new(
    engine_config,
    evaluator,
    repair_target,
    config.mutation_engine_binary.clone(),
    config.mutation_types.clone(),
    config.target_vul.clone(),
    config.target_loc.clone(),
    config.fault_space_specifier.clone(),
  );

  let run_future = engine.run(&config.source_file);

  let result = match config.timeout {
    Some(timeout) => match tokio::time::timeout(Duration::from_secs(timeout), run_future).await {
      Ok(inner) => inner,
      Err(_) => {
        info!("global timeout elapsed, tearing down");
        return Ok(Vec::new());
      }
    },
    None => run_future.await,
  };

  info!(archive_size = engine.archive().len(), num_evaluated = engine.num_evaluated(), "repair run finished");
  result
}

fn build_evaluator(config: &Config) -> Evaluator {
  let mut detectors: Vec<ConfiguredDetector> = Vec::new();
  let slither: Arc<dyn Detector> = Arc::new(GraphAnalyzer::new(config.oyente_docker_image.clone()));
  detectors.push(ConfiguredDetector { name: "slither".to_string(), detector: slither, skippable: true });

  if !config.compile_command.is_empty() && !config.test_runner_command.is_empty() && !config.test_paths.is_empty() {
    let runner: Arc<dyn Detector> = Arc::new(DynamicTestRunner::new(
      config.compile_command.clone(),
      config.test_runner_command.clone(),
      config.test_paths.clone(),
      config.test_concurrency,
    ));
    detectors.push(ConfiguredDetector { name: "dynamic_test_runner".to_string(), detector: runner, skippable: false });
  }

  let gas_ranker = Arc::new(GasRanker::new(config.oyente_docker_image.clone()));
  Evaluator::new(detectors, gas_ranker, config.target_contract_name.clone())
}

fn print_result(patches: &[PlausiblePatch]) {
  if patches.is_empty() {
    println!("no patch found");
    return;
  }
  for patch in patches {
    println!("{}", patch.patched_file.display());
  }
}
