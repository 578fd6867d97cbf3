//! Persistent fingerprint records for incremental execution.
//!
//! The store maps each task to the last-observed signature of every path it
//! declared, split into inputs and outputs. Records are updated only after a
//! task's action completes successfully; tasks never touch them directly.
//!
//! # Storage
//!
//! One JSON document with a version envelope, written atomically
//! (write-temp-then-rename) so a crash mid-commit never leaves a record
//! claiming success for a task that did not finish. Deleting the file is
//! always safe and simply forces a cache-cold run.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::hash::{HashError, Signature, signature_of_path};
use crate::task::Task;

/// Current on-disk format version.
const STATE_VERSION: u32 = 1;

/// Errors from loading, committing, or persisting fingerprints.
#[derive(Debug, Error)]
pub enum FingerprintError {
  #[error("failed to create state directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to read state file: {0}")]
  Read(#[source] io::Error),

  #[error("failed to parse state file: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write state file: {0}")]
  Write(#[source] io::Error),

  #[error("unsupported state file version: {0}")]
  UnsupportedVersion(u32),

  /// A task claimed an output it did not produce. This is a contract
  /// violation by the task, reported rather than silently tolerated.
  #[error("task '{task}' declares output '{path}' but did not produce it")]
  MissingOutput { task: String, path: PathBuf },

  #[error(transparent)]
  Hash(#[from] HashError),
}

/// Recorded signatures for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TaskRecord {
  inputs: BTreeMap<String, Signature>,
  outputs: BTreeMap<String, Signature>,
}

/// Versioned on-disk envelope.
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
  version: u32,
  tasks: BTreeMap<String, TaskRecord>,
}

/// Owns all fingerprint records and their on-disk representation.
#[derive(Debug)]
pub struct FingerprintStore {
  path: PathBuf,
  tasks: BTreeMap<String, TaskRecord>,
}

impl FingerprintStore {
  /// Load the store from `path`.
  ///
  /// A missing file yields an empty store (cache-cold run); a corrupt or
  /// version-mismatched file is a hard error, with deletion as the
  /// documented recovery.
  pub fn load(path: impl Into<PathBuf>) -> Result<Self, FingerprintError> {
    let path = path.into();

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no fingerprint state, starting cold");
        return Ok(Self {
          path,
          tasks: BTreeMap::new(),
        });
      }
      Err(e) => return Err(FingerprintError::Read(e)),
    };

    let state: StateFile = serde_json::from_str(&content).map_err(FingerprintError::Parse)?;

    if state.version != STATE_VERSION {
      return Err(FingerprintError::UnsupportedVersion(state.version));
    }

    Ok(Self {
      path,
      tasks: state.tasks,
    })
  }

  /// The file this store persists to.
  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Decide whether a task may be skipped.
  ///
  /// True iff the task is not always-run, a record exists, every declared
  /// input currently matches its recorded signature, and every declared
  /// output exists with a matching signature. Read-only with respect to the
  /// store; filesystem errors (including externally deleted inputs) mean
  /// "not up to date", never a failure.
  pub fn is_up_to_date(&self, task: &Task) -> bool {
    if task.always_run() {
      return false;
    }

    let Some(record) = self.tasks.get(task.name()) else {
      return false;
    };

    paths_match(task.name(), task.inputs(), &record.inputs)
      && paths_match(task.name(), task.outputs(), &record.outputs)
  }

  /// Record post-execution signatures for a task.
  ///
  /// Inputs are re-hashed now, after the action ran, so a task may read
  /// sibling outputs produced in the same run. Fails without touching the
  /// record if any declared output is missing.
  pub fn commit(&mut self, task: &Task) -> Result<(), FingerprintError> {
    let mut outputs = BTreeMap::new();
    for path in task.outputs() {
      if !path.exists() {
        return Err(FingerprintError::MissingOutput {
          task: task.name().to_string(),
          path: path.clone(),
        });
      }
      outputs.insert(key_for(path), signature_of_path(path)?);
    }

    let mut inputs = BTreeMap::new();
    for path in task.inputs() {
      // An input that vanished during the run is simply not recorded; the
      // next evaluation will see it missing and re-run the task.
      if !path.exists() {
        warn!(task = task.name(), input = %path.display(), "declared input missing at commit time");
        continue;
      }
      inputs.insert(key_for(path), signature_of_path(path)?);
    }

    self.tasks.insert(task.name().to_string(), TaskRecord { inputs, outputs });
    Ok(())
  }

  /// Persist the store atomically (write to a temp file, then rename).
  pub fn save(&self) -> Result<(), FingerprintError> {
    if let Some(parent) = self.path.parent() {
      fs::create_dir_all(parent).map_err(FingerprintError::CreateDir)?;
    }

    let state = StateFile {
      version: STATE_VERSION,
      tasks: self.tasks.clone(),
    };
    let content = serde_json::to_string_pretty(&state).map_err(FingerprintError::Serialize)?;

    let temp_path = self.path.with_extension("json.tmp");
    fs::write(&temp_path, &content).map_err(FingerprintError::Write)?;
    fs::rename(&temp_path, &self.path).map_err(FingerprintError::Write)?;

    Ok(())
  }
}

/// Check every declared path against its recorded signature.
fn paths_match(task: &str, declared: &[PathBuf], recorded: &BTreeMap<String, Signature>) -> bool {
  for path in declared {
    if !path.exists() {
      debug!(task, path = %path.display(), "path missing, task is stale");
      return false;
    }

    let Some(stored) = recorded.get(&key_for(path)) else {
      return false;
    };

    match signature_of_path(path) {
      Ok(current) if current == *stored => {}
      Ok(_) => {
        debug!(task, path = %path.display(), "signature changed, task is stale");
        return false;
      }
      Err(e) => {
        warn!(task, path = %path.display(), error = %e, "failed to hash path, treating task as stale");
        return false;
      }
    }
  }

  true
}

fn key_for(path: &Path) -> String {
  path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn store_in(temp: &TempDir) -> FingerprintStore {
    FingerprintStore::load(temp.path().join("state/fingerprints.json")).unwrap()
  }

  fn file_task(name: &str, input: &Path, output: &Path) -> Task {
    Task::named(name).input(input).output(output).action(|_| Ok(()))
  }

  #[test]
  fn load_missing_file_starts_cold() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    assert!(store.tasks.is_empty());
  }

  #[test]
  fn unknown_task_is_not_up_to_date() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);

    let task = Task::named("never-ran").action(|_| Ok(()));
    assert!(!store.is_up_to_date(&task));
  }

  #[test]
  fn commit_then_up_to_date() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in.txt");
    let output = temp.path().join("out.txt");
    fs::write(&input, "source").unwrap();
    fs::write(&output, "artifact").unwrap();

    let mut store = store_in(&temp);
    let task = file_task("copy", &input, &output);

    store.commit(&task).unwrap();
    assert!(store.is_up_to_date(&task));
  }

  #[test]
  fn changed_input_makes_task_stale() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in.txt");
    let output = temp.path().join("out.txt");
    fs::write(&input, "source").unwrap();
    fs::write(&output, "artifact").unwrap();

    let mut store = store_in(&temp);
    let task = file_task("copy", &input, &output);
    store.commit(&task).unwrap();

    fs::write(&input, "edited source").unwrap();
    assert!(!store.is_up_to_date(&task));
  }

  #[test]
  fn deleted_input_means_stale_not_error() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in.txt");
    let output = temp.path().join("out.txt");
    fs::write(&input, "source").unwrap();
    fs::write(&output, "artifact").unwrap();

    let mut store = store_in(&temp);
    let task = file_task("copy", &input, &output);
    store.commit(&task).unwrap();

    fs::remove_file(&input).unwrap();
    assert!(!store.is_up_to_date(&task));
  }

  #[test]
  fn deleted_output_makes_task_stale() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in.txt");
    let output = temp.path().join("out.txt");
    fs::write(&input, "source").unwrap();
    fs::write(&output, "artifact").unwrap();

    let mut store = store_in(&temp);
    let task = file_task("copy", &input, &output);
    store.commit(&task).unwrap();

    fs::remove_file(&output).unwrap();
    assert!(!store.is_up_to_date(&task));
  }

  #[test]
  fn always_run_tasks_are_never_up_to_date() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("results.txt");
    fs::write(&output, "data").unwrap();

    let mut store = store_in(&temp);
    let task = Task::named("bench").output(&output).always_run().action(|_| Ok(()));

    store.commit(&task).unwrap();
    assert!(!store.is_up_to_date(&task));
  }

  #[test]
  fn commit_rejects_missing_output() {
    let temp = TempDir::new().unwrap();
    let mut store = store_in(&temp);

    let task = Task::named("liar")
      .output(temp.path().join("never-written.so"))
      .action(|_| Ok(()));

    let err = store.commit(&task).unwrap_err();
    match err {
      FingerprintError::MissingOutput { task, .. } => assert_eq!(task, "liar"),
      other => panic!("expected MissingOutput, got: {other}"),
    }

    // Nothing was recorded for the failed commit.
    assert!(!store.tasks.contains_key("liar"));
  }

  #[test]
  fn save_and_reload_roundtrip() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in.txt");
    let output = temp.path().join("out.txt");
    fs::write(&input, "source").unwrap();
    fs::write(&output, "artifact").unwrap();

    let task = file_task("copy", &input, &output);

    let mut store = store_in(&temp);
    store.commit(&task).unwrap();
    store.save().unwrap();

    let reloaded = FingerprintStore::load(store.path()).unwrap();
    assert!(reloaded.is_up_to_date(&task));
  }

  #[test]
  fn save_leaves_no_temp_file_behind() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    store.save().unwrap();

    assert!(store.path().exists());
    assert!(!store.path().with_extension("json.tmp").exists());
  }

  #[test]
  fn corrupt_state_file_is_a_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("fingerprints.json");
    fs::write(&path, "not valid json {{{").unwrap();

    let result = FingerprintStore::load(&path);
    assert!(matches!(result, Err(FingerprintError::Parse(_))));
  }

  #[test]
  fn future_version_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("fingerprints.json");
    fs::write(&path, r#"{"version": 99, "tasks": {}}"#).unwrap();

    let result = FingerprintStore::load(&path);
    assert!(matches!(result, Err(FingerprintError::UnsupportedVersion(99))));
  }

  #[test]
  fn directory_outputs_are_fingerprinted_structurally() {
    let temp = TempDir::new().unwrap();
    let out_dir = temp.path().join("generated");
    fs::create_dir_all(&out_dir).unwrap();
    fs::write(out_dir.join("bindings.rs"), "pub fn a() {}").unwrap();

    let mut store = store_in(&temp);
    let task = Task::named("bindgen").output(&out_dir).action(|_| Ok(()));

    store.commit(&task).unwrap();
    assert!(store.is_up_to_date(&task));

    fs::write(out_dir.join("extra.rs"), "pub fn b() {}").unwrap();
    assert!(!store.is_up_to_date(&task));
  }
}
