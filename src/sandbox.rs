//! A thin wrapper around spawning an isolated analysis container: no
//! network, read-only mount of the source under inspection. Shared by the
//! gas ranker, the static analyzer adapter, and the dynamic test runner,
//! each of which only differs in image and arguments.

use std::path::Path;

use tracing::debug;

use crate::error::{RepairError, Result};

/// One sandboxed invocation: a docker image plus the arguments passed to its
/// entrypoint, with the source directory mounted read-only.
#[derive(Debug, Clone)]
pub struct SandboxCommand {
  pub image: String,
  pub args: Vec<String>,
  pub source_mount: std::path::PathBuf,
}

impl SandboxCommand {
  pub fn new(image: impl Into<String>, args: Vec<String>, source_mount: impl AsRef<Path>) -> Self {
    Self { image: image.into(), args, source_mount: source_mount.as_ref().to_path_buf() }
  }

  /// Blocking invocation: runs `docker run --rm --network none -v
  /// <source>:<source>:ro <image> <args...>` and returns captured stdout.
  /// Runs on the calling thread; callers dispatch it to a blocking worker
  /// pool via `tokio::task::spawn_blocking` since it shells out and blocks.
  pub fn run_blocking(&self) -> Result<String> {
    let mount = format!("{}:{}:ro", self.source_mount.display(), self.source_mount.display());
    debug!(image = %self.image, mount = %mount, "launching sandbox");
    let output = std::process::Command::new("docker")
      .args(["run", "--rm", "--network", "none", "-v", &mount, &self.image])
      .args(&self.args)
      .output()?;

    if !output.status.success() {
      return Err(RepairError::other(format!(
        "sandbox image {} exited with {}: {}",
        self.image,
        output.status,
        String::from_utf8_lossy(&output.stderr)
      )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_mount_string_is_read_only() {
    let cmd = SandboxCommand::new("oyente/oyente", vec![], "/tmp/Wallet.sol");
    let mount = format!("{}:{}:ro", cmd.source_mount.display(), cmd.source_mount.display());
    assert!(mount.ends_with(":ro"));
  }
}
