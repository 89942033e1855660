//! CLI (§4.9, §6): a `clap`-derived parser that owns exactly the flags the
//! Orchestrator consumes, performing no repair logic of its own.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::{RepairError, Result};
use crate::location::CodeRange;
use crate::repair_target::{RepairTarget, TargetCondition};

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
  let (key, value) = s.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
  Ok((key.to_string(), value.to_string()))
}

fn parse_code_range(s: &str) -> std::result::Result<CodeRange, String> {
  serde_json::from_str(s).map_err(|e| format!("invalid CodeRange JSON {s:?}: {e}"))
}

fn parse_repair_target_entry(s: &str) -> std::result::Result<(String, TargetCondition), String> {
  let (detector, condition) = s.split_once('=').ok_or_else(|| format!("expected DETECTOR=CONDITION, got {s:?}"))?;
  let (kind, value) = condition.split_once(':').ok_or_else(|| format!("expected REMAINING:N or REPAIRED:N, got {condition:?}"))?;
  let n: u32 = value.parse().map_err(|_| format!("expected an integer count, got {value:?}"))?;
  let parsed = match kind {
    "REMAINING" => TargetCondition::Remaining { num_remaining: n },
    "REPAIRED" => TargetCondition::Repaired { original_count: n, num_repaired: None },
    other => return Err(format!("unknown repair target kind {other:?}, expected REMAINING or REPAIRED")),
  };
  Ok((detector.to_string(), parsed))
}

#[derive(Debug, Parser)]
#[command(name = "screpair", about = "MOGA-driven automated repair of smart contract vulnerabilities")]
pub struct Cli {
  #[arg(long = "targetContractName")]
  pub target_contract_name: String,

  #[arg(long)]
  pub timeout: Option<u64>,

  /// Reserved for structured output; not yet consumed by the Orchestrator.
  #[arg(long)]
  pub json: bool,

  #[arg(long = "detectorArg", value_parser = parse_key_value)]
  pub detector_arg: Vec<(String, String)>,

  #[arg(long = "targetVul")]
  pub target_vul: Vec<String>,

  #[arg(long = "targetLoc", value_parser = parse_code_range)]
  pub target_loc: Vec<CodeRange>,

  #[arg(long = "synthesizerArg", value_parser = parse_key_value)]
  pub synthesizer_arg: Vec<(String, String)>,

  #[arg(long)]
  pub core: Option<String>,

  #[arg(long = "coreArg", value_parser = parse_key_value)]
  pub core_arg: Vec<(String, String)>,

  #[command(subcommand)]
  pub command: Option<Command>,

  pub source_file: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
  Repair {
    #[arg(long = "repair_target", value_parser = parse_repair_target_entry)]
    repair_target: Vec<(String, TargetCondition)>,
  },
}

/// The typed configuration the Orchestrator consumes, built by resolving
/// the CLI's flat `KEY=VALUE` argument groups against their recognized
/// names.
#[derive(Debug, Clone)]
pub struct Config {
  pub target_contract_name: String,
  pub timeout: Option<u64>,
  pub source_file: PathBuf,

  pub target_vul: Option<Vec<String>>,
  pub target_loc: Option<Vec<CodeRange>>,

  pub oyente_docker_image: String,
  pub fault_space_specifier: Option<String>,
  pub seed: Option<u64>,
  pub p_crossover: f64,
  pub num_init_population: usize,
  pub max_size_population: usize,
  pub max_mutation_dist: Option<u32>,
  pub max_trials: Option<usize>,
  pub num_plausible: Option<usize>,

  pub mutation_engine_binary: String,
  pub mutation_types: Vec<String>,

  pub compile_command: String,
  pub test_runner_command: String,
  pub test_paths: Vec<PathBuf>,
  pub test_concurrency: usize,

  pub repair_target: RepairTarget,
}

impl Config {
  pub fn from_cli(cli: Cli) -> Result<Self> {
    let core_arg: BTreeMap<String, String> = cli.core_arg.into_iter().collect();
    let synthesizer_arg: BTreeMap<String, String> = cli.synthesizer_arg.into_iter().collect();
    let detector_arg: BTreeMap<String, String> = cli.detector_arg.into_iter().collect();

    let oyente_docker_image = core_arg
      .get("oyente-docker-image")
      .cloned()
      .ok_or_else(|| RepairError::other("--coreArg oyente-docker-image=<image> is required"))?;

    let seed = parse_opt(&core_arg, "seed")?;
    let p_crossover = parse_opt(&core_arg, "p-crossover")?.unwrap_or(0.3);
    let num_init_population = parse_opt(&core_arg, "num-init-population")?.unwrap_or(8);
    let max_size_population = parse_opt(&core_arg, "max-size-population")?.unwrap_or(20);
    let max_mutation_dist = parse_opt(&core_arg, "max-mutation-dist")?;
    // `disable-gas-objective` and `path-genealogy-graph` are reserved: parsed
    // for forward compatibility with the upstream tool, not yet acted on.
    let _disable_gas_objective: Option<bool> = parse_opt(&core_arg, "disable-gas-objective")?;
    let _path_genealogy_graph: Option<String> = core_arg.get("path-genealogy-graph").cloned();

    let mutation_engine_binary =
      synthesizer_arg.get("engine-binary").cloned().unwrap_or_else(|| "mutation-engine".to_string());
    let mutation_types = synthesizer_arg
      .get("mutation-types")
      .map(|v| v.split(',').map(str::to_string).collect())
      .unwrap_or_else(|| vec!["insert".to_string(), "delete".to_string(), "replace".to_string()]);

    let compile_command = detector_arg.get("compile-command").cloned().unwrap_or_default();
    let test_runner_command = detector_arg.get("test-runner-command").cloned().unwrap_or_default();
    let test_paths: Vec<PathBuf> = detector_arg
      .get("test-paths")
      .map(|v| v.split(',').filter(|p| !p.is_empty()).map(PathBuf::from).collect())
      .unwrap_or_default();
    let test_concurrency = parse_opt(&detector_arg, "test-concurrency")?.unwrap_or(4);

    let repair_target = match &cli.command {
      Some(Command::Repair { repair_target }) => RepairTarget::new(repair_target.iter().cloned().collect()),
      None => RepairTarget::default(),
    };

    Ok(Self {
      target_contract_name: cli.target_contract_name,
      timeout: cli.timeout,
      source_file: cli.source_file,
      target_vul: if cli.target_vul.is_empty() { None } else { Some(cli.target_vul) },
      target_loc: if cli.target_loc.is_empty() { None } else { Some(cli.target_loc) },
      oyente_docker_image,
      fault_space_specifier: core_arg.get("fault-space-specifier").cloned(),
      seed,
      p_crossover,
      num_init_population,
      max_size_population,
      max_mutation_dist,
      max_trials: None,
      num_plausible: None,
      mutation_engine_binary,
      mutation_types,
      compile_command,
      test_runner_command,
      test_paths,
      test_concurrency,
      repair_target,
    })
  }
}

fn parse_opt<T: std::str::FromStr>(map: &BTreeMap<String, String>, key: &str) -> Result<Option<T>> {
  match map.get(key) {
    Some(raw) => raw
      .parse()
      .map(Some)
      .map_err(|_| RepairError::other(format!("--coreArg {key} has an invalid value: {raw:?}"))),
    None => Ok(None),
  }
}
