//! Dynamic Test Runner Adapter: compiles a candidate and runs the fixed
//! test suite against it, reporting each test's pass/fail as a
//! vulnerability record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::process::Command;
use tokio::sync::{Mutex, Semaphore};
use tracing::debug;

use crate::analyzer::Detector;
use crate::error::{RepairError, Result};
use crate::location::CodeRange;
use crate::vulnerability::{AnalyzerResult, VulnerabilityInfo};

const FAST_FAIL_SENTINEL_NAME: &str = "EthereumTestCase_StateTest";

enum TestOutcome {
  Passed,
  Failed,
  NotRelevant,
}

/// Runs the fixed suite of test cases against a compiled candidate. Only
/// one test campaign may be in flight at a time, across the whole crate:
/// `lock` is the runner-wide async mutex the spec calls `ctxManagerExecTC`.
pub struct DynamicTestRunner {
  compile_command: String,
  test_runner_command: String,
  test_paths: Vec<PathBuf>,
  concurrency_limit: usize,
  lock: Mutex<()>,
}

impl DynamicTestRunner {
  pub fn new(
    compile_command: impl Into<String>,
    test_runner_command: impl Into<String>,
    test_paths: Vec<PathBuf>,
    concurrency_limit: usize,
  ) -> Self {
    Self {
      compile_command: compile_command.into(),
      test_runner_command: test_runner_command.into(),
      test_paths,
      concurrency_limit,
      lock: Mutex::new(()),
    }
  }

  /// Compiles `source_path` to bytecode via the configured shell command,
  /// with `R`/`C` set to the source text and target contract name.
  async fn compile(&self, source_path: &Path, contract_name: &str) -> Result<String> {
    let source_text = tokio::fs::read_to_string(source_path).await?;
    let output = Command::new("sh")
      .arg("-c")
      .arg(&self.compile_command)
      .env("R", source_text)
      .env("C", contract_name)
      .output()
      .await?;
    let bytecode = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if bytecode.is_empty() {
      return Err(RepairError::CompilationFailure(source_path.to_path_buf()));
    }
    Ok(bytecode)
  }

  async fn run_test_case(&self, bytecode: &str, test_path: &Path) -> Result<TestOutcome> {
    let output = Command::new("sh")
      .arg("-c")
      .arg(&self.test_runner_command)
      .arg(format!("--LOCSTR={}", test_path.display()))
      .env("BYTECODE", bytecode)
      .output()
      .await?;
    let verdict = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(match verdict.as_str() {
      "true" => TestOutcome::Passed,
      "false" => TestOutcome::Failed,
      _ => TestOutcome::NotRelevant,
    })
  }

  /// Compiles the candidate and runs each test path, bounded by
  /// `concurrency_limit`. If `fast_fail` is set and the first test path
  /// fails, returns the synthetic sentinel immediately without running the
  /// rest.
  pub async fn run_campaign(
    &self,
    source_path: &Path,
    contract_name: &str,
    fast_fail: bool,
  ) -> Result<AnalyzerResult> {
    let _guard = self.lock.lock().await;
    debug!(source = %source_path.display(), "starting test campaign");
    let bytecode = self.compile(source_path, contract_name).await?;

    if self.test_paths.is_empty() {
      return Ok(Vec::new());
    }

    let mut report = Vec::new();
    if fast_fail {
      let first = self.run_test_case(&bytecode, &self.test_paths[0]).await?;
      if matches!(first, TestOutcome::Failed) {
        return Ok(vec![VulnerabilityInfo::detected(FAST_FAIL_SENTINEL_NAME, None, None)]);
      }
      if matches!(first, TestOutcome::Passed) {
        report.push(VulnerabilityInfo::not_detected(self.test_paths[0].display().to_string()));
      }
    }

    // The fast-fail pre-check above already ran index 0; skip it here so its
    // external subprocess isn't invoked twice.
    let semaphore = Arc::new(Semaphore::new(self.concurrency_limit.max(1)));
    let futures = self.test_paths.iter().enumerate().filter(|(i, _)| !(fast_fail && *i == 0)).map(
      |(_, test_path)| {
        let semaphore = semaphore.clone();
        let bytecode = bytecode.as_str();
        async move {
          let _permit = semaphore.acquire().await.expect("semaphore closed");
          let outcome = self.run_test_case(bytecode, test_path).await?;
          Ok::<_, RepairError>((test_path.clone(), outcome))
        }
      },
    );

    let results = join_all(futures).await;
    for result in results {
      let (test_path, outcome) = result?;
      match outcome {
        TestOutcome::Passed => report.push(VulnerabilityInfo::not_detected(test_path.display().to_string())),
        TestOutcome::Failed => report.push(VulnerabilityInfo::detected(
          test_path.display().to_string(),
          None,
          None,
        )),
        TestOutcome::NotRelevant => {}
      }
    }
    Ok(report)
  }
}

#[async_trait]
impl Detector for DynamicTestRunner {
  fn name(&self) -> &str {
    "dynamic_test_runner"
  }

  /// `targeted_ranges`/`targeted_names` are accepted for interface parity
  /// with static analyzers; a test case's identity is its path, not a
  /// fault-localized finding, so neither is consulted here.
  async fn detect(
    &self,
    source_path: &Path,
    contract_name: Option<&str>,
    _targeted_ranges: Option<&[CodeRange]>,
    _targeted_names: Option<&[String]>,
    fast_fail: bool,
  ) -> Result<AnalyzerResult> {
    let contract_name = contract_name.ok_or_else(|| {
      RepairError::other("dynamic test runner requires a target contract name")
    })?;
    self.run_campaign(source_path, contract_name, fast_fail).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fast_fail_sentinel_name() {
    assert_eq!(FAST_FAIL_SENTINEL_NAME, "EthereumTestCase_StateTest");
  }

  #[tokio::test]
  async fn test_empty_test_paths_yields_empty_report() {
    let runner = DynamicTestRunner::new("echo deadbeef", "echo true", vec![], 2);
    let result = runner.run_campaign(Path::new("/dev/null"), "Wallet", false).await.unwrap();
    assert!(result.is_empty());
  }

  #[tokio::test]
  async fn test_empty_compiled_bytecode_is_fatal() {
    let runner = DynamicTestRunner::new("true", "echo true", vec![PathBuf::from("t0")], 2);
    let err = runner.run_campaign(Path::new("/dev/null"), "Wallet", false).await.unwrap_err();
    assert!(matches!(err, RepairError::CompilationFailure(_)));
  }

  #[tokio::test]
  async fn test_fast_fail_does_not_rerun_first_test_path() {
    let counter_file = std::env::temp_dir().join(format!(
      "screpair_test_fast_fail_count_{}",
      std::process::id()
    ));
    let _ = std::fs::remove_file(&counter_file);
    let test_runner_command = format!("echo -n x >> {} && echo true", counter_file.display());
    let runner = DynamicTestRunner::new(
      "echo deadbeef",
      test_runner_command,
      vec![PathBuf::from("t0"), PathBuf::from("t1")],
      2,
    );
    let report = runner.run_campaign(Path::new("/dev/null"), "Wallet", true).await.unwrap();
    assert_eq!(report.len(), 2);
    let invocations = std::fs::read_to_string(&counter_file).unwrap().len();
    let _ = std::fs::remove_file(&counter_file);
    assert_eq!(invocations, 2, "t0 must run exactly once despite the fast-fail pre-check");
  }
}
