//! Task definitions.
//!
//! A task is a named unit of work with declared dependencies, declared input
//! and output paths, and an action closure. The closure receives an
//! [`ActionContext`] that exposes the command runner; everything a task does
//! to the outside world goes through that handle or plain file operations.
//!
//! Tasks are immutable once built. The `always_run` flag bypasses the
//! fingerprint cache for work that must reflect the freshest state, such as
//! benchmark runs and the final report merge.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::fetch::FetchError;
use crate::runner::{CommandRunner, CommandSpec, RunnerError, RunnerOutput};

/// Errors produced by a task's action.
#[derive(Debug, Error)]
pub enum ActionError {
  /// The runner could not start or supervise the process.
  #[error(transparent)]
  Runner(#[from] RunnerError),

  /// The command ran and exited non-zero.
  #[error("command '{command}' failed with exit code {code:?}\n{stderr}")]
  CommandFailed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  /// The command exceeded its time bound and was killed.
  #[error("command '{command}' timed out after {limit:?}")]
  TimedOut { command: String, limit: Duration },

  /// Artifact download or extraction failed.
  #[error(transparent)]
  Fetch(#[from] FetchError),

  /// A plain file operation failed.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Execution-time handle passed to task actions.
///
/// Wraps the command runner and carries the owning task's time bound, so an
/// action does not have to thread the timeout through itself.
pub struct ActionContext<'a> {
  runner: &'a CommandRunner,
  timeout: Option<Duration>,
}

impl<'a> ActionContext<'a> {
  pub fn new(runner: &'a CommandRunner, timeout: Option<Duration>) -> Self {
    Self { runner, timeout }
  }

  /// Run a command, returning its captured output regardless of exit code.
  pub fn run(&self, spec: &CommandSpec) -> Result<RunnerOutput, ActionError> {
    Ok(self.runner.run(spec, self.timeout)?)
  }

  /// Run a command and require a zero exit within the time bound.
  pub fn run_checked(&self, spec: &CommandSpec) -> Result<RunnerOutput, ActionError> {
    let output = self.run(spec)?;

    if output.timed_out {
      return Err(ActionError::TimedOut {
        command: spec.display_line(),
        limit: self.timeout.unwrap_or_default(),
      });
    }
    if !output.success() {
      return Err(ActionError::CommandFailed {
        command: spec.display_line(),
        code: output.status,
        stderr: output.stderr,
      });
    }

    Ok(output)
  }
}

type ActionFn = Box<dyn Fn(&ActionContext<'_>) -> Result<(), ActionError> + Send + Sync>;

/// A named unit of declared work.
pub struct Task {
  name: String,
  deps: Vec<String>,
  inputs: Vec<PathBuf>,
  outputs: Vec<PathBuf>,
  always_run: bool,
  timeout: Option<Duration>,
  action: ActionFn,
}

impl Task {
  /// Start building a task with the given unique name.
  pub fn named(name: impl Into<String>) -> TaskBuilder {
    TaskBuilder {
      name: name.into(),
      deps: Vec::new(),
      inputs: Vec::new(),
      outputs: Vec::new(),
      always_run: false,
      timeout: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Dependency names in declaration order.
  pub fn deps(&self) -> &[String] {
    &self.deps
  }

  /// Declared input paths (files or directories this task reads).
  pub fn inputs(&self) -> &[PathBuf] {
    &self.inputs
  }

  /// Declared output paths (files or directories this task produces).
  pub fn outputs(&self) -> &[PathBuf] {
    &self.outputs
  }

  pub fn always_run(&self) -> bool {
    self.always_run
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }

  /// Execute the task's action.
  pub fn run(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
    (self.action)(ctx)
  }
}

impl std::fmt::Debug for Task {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Task")
      .field("name", &self.name)
      .field("deps", &self.deps)
      .field("inputs", &self.inputs)
      .field("outputs", &self.outputs)
      .field("always_run", &self.always_run)
      .field("timeout", &self.timeout)
      .finish_non_exhaustive()
  }
}

/// Builder for [`Task`]; finished by attaching the action.
pub struct TaskBuilder {
  name: String,
  deps: Vec<String>,
  inputs: Vec<PathBuf>,
  outputs: Vec<PathBuf>,
  always_run: bool,
  timeout: Option<Duration>,
}

impl TaskBuilder {
  pub fn depends_on(mut self, name: impl Into<String>) -> Self {
    self.deps.push(name.into());
    self
  }

  pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
    self.inputs.push(path.into());
    self
  }

  pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
    self.outputs.push(path.into());
    self
  }

  /// Bypass the fingerprint cache: this task executes on every run.
  pub fn always_run(mut self) -> Self {
    self.always_run = true;
    self
  }

  pub fn timeout(mut self, limit: Duration) -> Self {
    self.timeout = Some(limit);
    self
  }

  /// Attach the action and finish the task.
  pub fn action<F>(self, f: F) -> Task
  where
    F: Fn(&ActionContext<'_>) -> Result<(), ActionError> + Send + Sync + 'static,
  {
    Task {
      name: self.name,
      deps: self.deps,
      inputs: self.inputs,
      outputs: self.outputs,
      always_run: self.always_run,
      timeout: self.timeout,
      action: Box::new(f),
    }
  }

  /// Finish as an aggregate task: no action of its own, it exists only to
  /// pull its dependencies into the schedule.
  pub fn aggregate(self) -> Task {
    self.action(|_| Ok(()))
  }
}

/// Copy a file into a directory, creating the directory first.
///
/// Shared helper for staging-style tasks (pure file operations, no process).
pub fn copy_into(source: &Path, dest_dir: &Path) -> Result<PathBuf, ActionError> {
  std::fs::create_dir_all(dest_dir)?;
  let file_name = source
    .file_name()
    .ok_or_else(|| std::io::Error::other(format!("source has no file name: {}", source.display())))?;
  let dest = dest_dir.join(file_name);
  std::fs::copy(source, &dest)?;
  Ok(dest)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_records_declarations() {
    let task = Task::named("compile")
      .depends_on("extract")
      .input("/src/lib.c")
      .output("/out/lib.so")
      .timeout(Duration::from_secs(60))
      .action(|_| Ok(()));

    assert_eq!(task.name(), "compile");
    assert_eq!(task.deps(), ["extract".to_string()]);
    assert_eq!(task.inputs(), [PathBuf::from("/src/lib.c")]);
    assert_eq!(task.outputs(), [PathBuf::from("/out/lib.so")]);
    assert!(!task.always_run());
    assert_eq!(task.timeout(), Some(Duration::from_secs(60)));
  }

  #[test]
  fn aggregate_task_is_a_noop() {
    let task = Task::named("build").depends_on("a").depends_on("b").aggregate();
    let runner = CommandRunner::new();
    let ctx = ActionContext::new(&runner, None);

    assert!(task.run(&ctx).is_ok());
    assert_eq!(task.deps(), ["a".to_string(), "b".to_string()]);
  }

  #[test]
  fn run_checked_maps_nonzero_exit() {
    let runner = CommandRunner::new();
    let ctx = ActionContext::new(&runner, None);
    let spec = CommandSpec::new("/bin/sh").arg("-c").arg("exit 7");

    let err = ctx.run_checked(&spec).unwrap_err();
    assert!(matches!(err, ActionError::CommandFailed { code: Some(7), .. }));
  }

  #[test]
  fn run_checked_maps_timeout() {
    let runner = CommandRunner::new();
    let ctx = ActionContext::new(&runner, Some(Duration::from_millis(100)));
    let spec = CommandSpec::new("/bin/sh").arg("-c").arg("sleep 30");

    let err = ctx.run_checked(&spec).unwrap_err();
    assert!(matches!(err, ActionError::TimedOut { .. }));
  }

  #[test]
  fn copy_into_creates_destination() {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("lib.so");
    std::fs::write(&source, b"binary").unwrap();

    let dest_dir = temp.path().join("natives/linux-x64");
    let dest = copy_into(&source, &dest_dir).unwrap();

    assert_eq!(dest, dest_dir.join("lib.so"));
    assert_eq!(std::fs::read(&dest).unwrap(), b"binary");
  }
}
