//! Blocking external-process execution.
//!
//! The runner starts a process with a working directory, argument list, and
//! environment overlay, then captures its exit status and both output
//! streams. It never interprets what the command means: a non-zero exit is
//! reported back to the caller, not raised as an error at this layer.
//!
//! An optional duration bound kills the child and reports a timed-out
//! outcome; deciding what a timeout means is the scheduler's business.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// How often the runner polls a child while a timeout is in force.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Description of one external process invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: Option<PathBuf>,
  pub env: BTreeMap<String, String>,
}

impl CommandSpec {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
      env: BTreeMap::new(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  /// One-line rendering for logs and error messages.
  pub fn display_line(&self) -> String {
    let mut line = self.program.clone();
    for arg in &self.args {
      line.push(' ');
      line.push_str(arg);
    }
    line
  }
}

/// Captured outcome of a process invocation.
#[derive(Debug)]
pub struct RunnerOutput {
  /// Exit code, if the process exited normally (None on signal kill).
  pub status: Option<i32>,

  pub stdout: String,
  pub stderr: String,

  /// True when the process was killed because it exceeded its time bound.
  pub timed_out: bool,
}

impl RunnerOutput {
  /// True iff the process exited normally with code zero.
  pub fn success(&self) -> bool {
    !self.timed_out && self.status == Some(0)
  }
}

/// Errors raised by the runner itself (not by the command it ran).
#[derive(Debug, Error)]
pub enum RunnerError {
  #[error("failed to start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("io error while supervising '{program}': {source}")]
  Supervise {
    program: String,
    #[source]
    source: std::io::Error,
  },
}

/// Executes external processes synchronously.
#[derive(Debug, Default)]
pub struct CommandRunner;

impl CommandRunner {
  pub fn new() -> Self {
    Self
  }

  /// Run a command to completion, or until `timeout` elapses.
  ///
  /// Blocks the calling thread. The child's stdout and stderr are captured
  /// in full; its stdin is closed.
  pub fn run(&self, spec: &CommandSpec, timeout: Option<Duration>) -> Result<RunnerOutput, RunnerError> {
    debug!(command = %spec.display_line(), cwd = ?spec.cwd, "spawning process");

    let mut command = Command::new(&spec.program);
    command
      .args(&spec.args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());

    if let Some(dir) = &spec.cwd {
      command.current_dir(dir);
    }

    // Environment overlay: inherit the parent environment, then apply
    // the spec's variables on top.
    for (key, value) in &spec.env {
      command.env(key, value);
    }

    let child = command.spawn().map_err(|e| RunnerError::Spawn {
      program: spec.program.clone(),
      source: e,
    })?;

    match timeout {
      None => self.wait(child, spec),
      Some(limit) => self.wait_with_deadline(child, spec, limit),
    }
  }

  fn wait(&self, child: Child, spec: &CommandSpec) -> Result<RunnerOutput, RunnerError> {
    let output = child.wait_with_output().map_err(|e| RunnerError::Supervise {
      program: spec.program.clone(),
      source: e,
    })?;

    Ok(RunnerOutput {
      status: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).to_string(),
      timed_out: false,
    })
  }

  /// Supervise a child under a deadline: stream readers drain the pipes on
  /// background threads while the main thread polls `try_wait`.
  fn wait_with_deadline(
    &self,
    mut child: Child,
    spec: &CommandSpec,
    limit: Duration,
  ) -> Result<RunnerOutput, RunnerError> {
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let stdout_reader = std::thread::spawn(move || drain(stdout_pipe));
    let stderr_reader = std::thread::spawn(move || drain(stderr_pipe));

    let started = Instant::now();
    let mut timed_out = false;

    let status = loop {
      match child.try_wait().map_err(|e| RunnerError::Supervise {
        program: spec.program.clone(),
        source: e,
      })? {
        Some(status) => break status,
        None => {
          if started.elapsed() >= limit {
            warn!(command = %spec.display_line(), ?limit, "time bound exceeded, killing process");
            let _ = child.kill();
            let status = child.wait().map_err(|e| RunnerError::Supervise {
              program: spec.program.clone(),
              source: e,
            })?;
            timed_out = true;
            break status;
          }
          std::thread::sleep(POLL_INTERVAL);
        }
      }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(RunnerOutput {
      status: status.code(),
      stdout,
      stderr,
      timed_out,
    })
  }
}

fn drain(pipe: Option<impl Read>) -> String {
  let mut buf = Vec::new();
  if let Some(mut pipe) = pipe {
    let _ = pipe.read_to_end(&mut buf);
  }
  String::from_utf8_lossy(&buf).to_string()
}
