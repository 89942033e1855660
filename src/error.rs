//! The crate's fatal error taxonomy. Every error that aborts a repair run
//! funnels through this type; cooperative stop conditions (timeout,
//! cancellation) are modeled separately in the engine, not as errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepairError {
  #[error("mutation engine child for subset {subset:?} exited with status {status}")]
  MutationEngineCrashed { subset: Vec<String>, status: i32 },

  #[error("mutation engine produced no output while still running (subset {subset:?})")]
  MutationEngineEmptyOutput { subset: Vec<String> },

  #[error("malformed mutation engine response: {0}")]
  MalformedMutationResponse(String),

  #[error("malformed analyzer output from {analyzer}: {source}")]
  MalformedAnalyzerOutput { analyzer: String, #[source] source: serde_json::Error },

  #[error("malformed gas tool output: {0}")]
  MalformedGasOutput(#[source] serde_json::Error),

  #[error("gas tool did not analyze contract {0:?}")]
  ContractNotAnalyzed(String),

  #[error("compilation of {0:?} produced empty bytecode")]
  CompilationFailure(PathBuf),

  #[error("analyzer {analyzer} failed: {message}")]
  AnalyzerFailure { analyzer: String, message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("{0}")]
  Other(String),
}

impl RepairError {
  pub fn other(message: impl Into<String>) -> Self {
    Self::Other(message.into())
  }
}

pub type Result<T> = std::result::Result<T, RepairError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_mutation_engine_crashed_message() {
    let err = RepairError::MutationEngineCrashed { subset: vec!["insert".to_string()], status: 1 };
    assert!(err.to_string().contains("insert"));
    assert!(err.to_string().contains('1'));
  }

  #[test]
  fn test_io_error_converts_via_from() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: RepairError = io_err.into();
    assert!(matches!(err, RepairError::Io(_)));
  }
}
