//! Dependency-ordered incremental execution.
//!
//! The scheduler walks a resolved task order sequentially, deciding for each
//! task whether it must run or may be skipped, and halts on the first
//! failure. Fingerprints are committed and persisted after each successful
//! task, so an interrupted run resumes exactly where it stopped.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use crate::fingerprint::{FingerprintError, FingerprintStore};
use crate::graph::{GraphError, TaskGraph};
use crate::runner::CommandRunner;
use crate::task::{ActionContext, ActionError};

/// Errors surfaced by [`Scheduler::execute`].
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The graph itself is misconfigured (cycle, unknown or duplicate task).
  /// Detected before any task executes.
  #[error(transparent)]
  Graph(#[from] GraphError),

  /// A task's action failed; nothing after it was attempted and no
  /// fingerprint was committed for it.
  #[error("task '{task}' failed: {source}")]
  TaskFailed {
    task: String,
    #[source]
    source: ActionError,
  },

  /// The task ran but violated its output contract, or its results could
  /// not be recorded.
  #[error("failed to record results for task '{task}': {source}")]
  Commit {
    task: String,
    #[source]
    source: FingerprintError,
  },

  /// Fingerprint state could not be persisted.
  #[error(transparent)]
  State(#[from] FingerprintError),
}

/// What happened to one task during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
  Executed,
  Skipped,
}

/// One scheduled task with its outcome and wall-clock duration.
#[derive(Debug, Clone)]
pub struct TaskRun {
  pub task: String,
  pub outcome: TaskOutcome,
  pub duration: Duration,
}

/// Summary of a completed (successful) invocation.
#[derive(Debug, Default)]
pub struct ExecutionReport {
  pub runs: Vec<TaskRun>,
}

impl ExecutionReport {
  /// Names of tasks that actually executed, in schedule order.
  pub fn executed(&self) -> Vec<&str> {
    self
      .runs
      .iter()
      .filter(|r| r.outcome == TaskOutcome::Executed)
      .map(|r| r.task.as_str())
      .collect()
  }

  /// Names of tasks that were skipped as up to date.
  pub fn skipped(&self) -> Vec<&str> {
    self
      .runs
      .iter()
      .filter(|r| r.outcome == TaskOutcome::Skipped)
      .map(|r| r.task.as_str())
      .collect()
  }

  /// True when nothing had to run.
  pub fn is_noop(&self) -> bool {
    self.runs.iter().all(|r| r.outcome == TaskOutcome::Skipped)
  }
}

/// Sequential task executor.
pub struct Scheduler<'a> {
  store: &'a mut FingerprintStore,
  runner: &'a CommandRunner,
}

impl<'a> Scheduler<'a> {
  pub fn new(store: &'a mut FingerprintStore, runner: &'a CommandRunner) -> Self {
    Self { store, runner }
  }

  /// Execute `target` and its transitive dependencies in topological order.
  ///
  /// Skip decisions: an always-run task executes unconditionally; a task
  /// whose dependency executed earlier in this invocation is stale even if
  /// its recorded signatures still match (a rebuilt dependency must be
  /// re-consumed); otherwise the fingerprint store decides.
  ///
  /// On failure execution halts immediately: downstream tasks are not
  /// attempted and the failed task keeps no fingerprint, so the next
  /// invocation retries it.
  pub fn execute(&mut self, graph: &TaskGraph, target: &str) -> Result<ExecutionReport, ExecuteError> {
    let order = graph.resolve(target)?;
    info!(target, tasks = order.len(), "schedule resolved");

    let mut report = ExecutionReport::default();
    let mut ran: HashSet<&str> = HashSet::new();

    for task in order {
      let dep_executed = task.deps().iter().any(|d| ran.contains(d.as_str()));

      if !task.always_run() && !dep_executed && self.store.is_up_to_date(task) {
        debug!(task = task.name(), "up to date, skipping");
        report.runs.push(TaskRun {
          task: task.name().to_string(),
          outcome: TaskOutcome::Skipped,
          duration: Duration::ZERO,
        });
        continue;
      }

      info!(task = task.name(), "executing");
      let started = Instant::now();

      let ctx = ActionContext::new(self.runner, task.timeout());
      task.run(&ctx).map_err(|source| ExecuteError::TaskFailed {
        task: task.name().to_string(),
        source,
      })?;

      self.store.commit(task).map_err(|source| ExecuteError::Commit {
        task: task.name().to_string(),
        source,
      })?;
      self.store.save()?;

      let duration = started.elapsed();
      info!(task = task.name(), ?duration, "task complete");

      ran.insert(task.name());
      report.runs.push(TaskRun {
        task: task.name().to_string(),
        outcome: TaskOutcome::Executed,
        duration,
      });
    }

    Ok(report)
  }
}
