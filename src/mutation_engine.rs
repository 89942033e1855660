//! Mutation Engine Client: owns one long-lived child process per non-empty
//! subset of the configured mutation kinds, multiplexing request/response
//! cycles across all of them and caching responses nobody has consumed yet.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{RepairError, Result};
use crate::location::CodeRange;
use crate::patch::{MutationSequence, PatchInfo};

/// The three request shapes the client may issue to a child in one round.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum RequestObject {
  #[serde(rename = "random")]
  Random { n: usize },
  #[serde(rename = "mutate")]
  Mutate { #[serde(rename = "baseSeq")] base_seq: MutationSequence, #[serde(rename = "overrideFaultSpec")] override_fault_spec: Option<String> },
  #[serde(rename = "crossover-onepoint")]
  CrossoverOnePoint {
    seq1: MutationSequence,
    cp1: i64,
    seq2: MutationSequence,
    cp2: i64,
  },
}

#[derive(Debug, Deserialize)]
struct RawResponse {
  #[serde(rename = "Result")]
  result: Option<String>,
  #[serde(rename = "NewMutationSequences")]
  new_mutation_sequences: Option<Vec<MutationSequence>>,
  #[serde(rename = "PatchedFilePaths")]
  patched_file_paths: Option<Vec<String>>,
  #[serde(rename = "ModifiedLocations")]
  modified_locations: Option<Vec<ModifiedLocationsEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModifiedLocationsEntry {
  Known(Vec<CodeRange>),
  Unknown(String),
}

fn build_patches(resp: RawResponse) -> Vec<PatchInfo> {
  let seqs = resp.new_mutation_sequences.unwrap_or_default();
  let paths = resp.patched_file_paths.unwrap_or_default();
  let locs = resp.modified_locations.unwrap_or_default();
  seqs
    .into_iter()
    .zip(paths)
    .enumerate()
    .map(|(i, (seq, path))| {
      let modified = match locs.get(i) {
        Some(ModifiedLocationsEntry::Known(ranges)) => Some(ranges.clone()),
        Some(ModifiedLocationsEntry::Unknown(_)) | None => None,
      };
      PatchInfo::new(seq, PathBuf::from(path), modified)
    })
    .collect()
}

/// All non-empty subsets of the configured mutation kinds, one child runs
/// per subset.
fn nonempty_subsets(mutation_types: &[String]) -> Vec<Vec<String>> {
  mutation_types.iter().cloned().powerset().filter(|s| !s.is_empty()).collect()
}

struct MutationChild {
  subset: Vec<String>,
  child: Child,
  stdin: ChildStdin,
  stdout_lines: Lines<BufReader<ChildStdout>>,
  _temp_dir: TempDir,
}

impl MutationChild {
  fn pid(&self) -> Option<u32> {
    self.child.id()
  }

  /// Classifies an EOF on this child's stdout. A child that has already
  /// exited with a non-success status crashed; anything else (still
  /// running, or exited cleanly with nothing left to say) is reported as
  /// having produced empty output.
  async fn eof_error(&mut self) -> RepairError {
    match self.child.try_wait() {
      Ok(Some(status)) if !status.success() => {
        RepairError::MutationEngineCrashed { subset: self.subset.clone(), status: status.code().unwrap_or(-1) }
      }
      _ => RepairError::MutationEngineEmptyOutput { subset: self.subset.clone() },
    }
  }
}

struct ClientState {
  children: Vec<MutationChild>,
  cache: HashMap<String, VecDeque<PatchInfo>>,
}

impl ClientState {
  /// Kills every still-running child. Called on any fatal error, per the
  /// crate's no-leaked-subprocess guarantee.
  async fn kill_all(&mut self) {
    for child in self.children.iter_mut() {
      let _ = child.child.kill().await;
    }
  }
}

/// Multiplexes breeding requests across one child process per mutation
/// subset. Only one request cycle may be in flight at a time across the
/// whole client: every call to `request` serializes on an internal lock.
pub struct MutationEngineClient {
  state: Mutex<ClientState>,
}

impl MutationEngineClient {
  /// Spawns one child per non-empty subset of `mutation_types`, each
  /// invoked against `source_path` with the subset as its allowed
  /// mutation/must-include kinds, the optional seed, and the optional
  /// fault specifier.
  pub async fn spawn(
    engine_binary: &str,
    source_path: &Path,
    seed: Option<u64>,
    fault_specifier: Option<&str>,
    mutation_types: &[String],
  ) -> Result<Self> {
    let mut children = Vec::new();
    for subset in nonempty_subsets(mutation_types) {
      let temp_dir = tempfile::tempdir()?;
      let mut cmd = Command::new(engine_binary);
      cmd.arg("--source")
        .arg(source_path)
        .arg("--mutation-types")
        .arg(subset.join(","))
        .arg("--must-include-mutation-types")
        .arg(subset.join(","))
        .arg("--temp-dir")
        .arg(temp_dir.path());
      if let Some(seed) = seed {
        cmd.arg("--seed").arg(seed.to_string());
      }
      if let Some(spec) = fault_specifier {
        if !spec.is_empty() {
          cmd.arg("--fault-specifier").arg(spec);
        }
      }
      cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).kill_on_drop(true);

      debug!(subset = ?subset, "spawning mutation engine child");
      let mut child = cmd.spawn()?;
      let stdin = child.stdin.take().expect("piped stdin");
      let stdout = BufReader::new(child.stdout.take().expect("piped stdout")).lines();
      children.push(MutationChild { subset, child, stdin, stdout_lines: stdout, _temp_dir: temp_dir });
    }
    Ok(Self { state: Mutex::new(ClientState { children, cache: HashMap::new() }) })
  }

  /// Runs one full request/response cycle, or serves a cached result if
  /// one is already sitting unconsumed for the exact same request payload.
  /// Returns `None` once every child's space is exhausted.
  pub async fn request(&self, req: RequestObject) -> Result<Option<PatchInfo>> {
    let payload = serde_json::to_string(&req)
      .map_err(|e| RepairError::other(format!("failed to encode mutation request: {e}")))?;
    let mut state = self.state.lock().await;

    if let Some(queue) = state.cache.get_mut(&payload) {
      if let Some(patch) = queue.pop_front() {
        trace!(%payload, "serving cached mutation result");
        return Ok(Some(patch));
      }
    }

    if state.children.is_empty() {
      return Ok(None);
    }

    let line = format!("{payload}\n");
    for child in state.children.iter_mut() {
      if let Err(e) = write_request_line(child, &line).await {
        state.kill_all().await;
        return Err(e);
      }
    }

    let first = match wait_first_response(&mut state.children).await {
      Ok(v) => v,
      Err(e) => {
        state.kill_all().await;
        return Err(e);
      }
    };
    let (first_idx, first_line) = first;

    let signalled_pids: Vec<u32> =
      state.children.iter().enumerate().filter(|(i, _)| *i != first_idx).filter_map(|(_, c)| c.pid()).collect();
    for pid in &signalled_pids {
      let _ = tokio::fs::File::create(format!("/tmp/terminate_{pid}")).await;
    }
    let _ = tokio::fs::File::create("/tmp/terminate_all").await;

    let mut lines = vec![(first_idx, first_line)];
    for i in 0..state.children.len() {
      if i == first_idx {
        continue;
      }
      match state.children[i].stdout_lines.next_line().await {
        Ok(Some(l)) => lines.push((i, l)),
        Ok(None) => {
          let err = state.children[i].eof_error().await;
          state.kill_all().await;
          return Err(err);
        }
        Err(e) => {
          state.kill_all().await;
          return Err(e.into());
        }
      }
    }

    for pid in &signalled_pids {
      let _ = tokio::fs::remove_file(format!("/tmp/terminate_{pid}")).await;
    }
    let _ = tokio::fs::remove_file("/tmp/terminate_all").await;

    let mut exhausted_indices = Vec::new();
    let mut new_patches = Vec::new();
    for (idx, line) in lines {
      let parsed: RawResponse = serde_json::from_str(&line)
        .map_err(|e| RepairError::MalformedMutationResponse(format!("{e}: {line}")))?;
      match parsed.result.as_deref() {
        Some("AllSpaceExhasuted") => exhausted_indices.push(idx),
        Some("SpaceExhasutedForAST") => {}
        _ => new_patches.extend(build_patches(parsed)),
      }
    }

    exhausted_indices.sort_unstable_by(|a, b| b.cmp(a));
    for idx in exhausted_indices {
      warn!(subset = ?state.children[idx].subset, "mutation subset space exhausted");
      state.children.remove(idx);
    }

    let queue = state.cache.entry(payload).or_default();
    queue.extend(new_patches);
    Ok(queue.pop_front())
  }

  /// Whether every child has exhausted its space; the engine should stop
  /// requesting once this is true.
  pub async fn is_exhausted(&self) -> bool {
    self.state.lock().await.children.is_empty()
  }

  /// Kills every running child. Idempotent; safe to call after an error or
  /// at shutdown.
  pub async fn shutdown(&self) {
    self.state.lock().await.kill_all().await;
  }
}

async fn write_request_line(child: &mut MutationChild, line: &str) -> Result<()> {
  child.stdin.write_all(line.as_bytes()).await?;
  child.stdin.flush().await?;
  Ok(())
}

/// Races a line-read against every still-running child and returns the
/// first full response along with the index of the child that produced it.
async fn wait_first_response(children: &mut [MutationChild]) -> Result<(usize, String)> {
  let mut pending: FuturesUnordered<_> = children
    .iter_mut()
    .enumerate()
    .map(|(i, c)| async move { (i, c.stdout_lines.next_line().await) })
    .collect();

  let mut eof_idx = None;
  while let Some((idx, line)) = pending.next().await {
    match line {
      Ok(Some(l)) => return Ok((idx, l)),
      Ok(None) => {
        eof_idx = Some(idx);
        break;
      }
      Err(e) => return Err(e.into()),
    }
  }
  drop(pending);
  match eof_idx {
    Some(idx) => Err(children[idx].eof_error().await),
    None => Err(RepairError::other("mutation engine client has no children")),
  }
}
