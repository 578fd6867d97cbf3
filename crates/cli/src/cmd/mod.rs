mod clean;
mod list;
mod run;
mod status;

pub use clean::cmd_clean;
pub use list::cmd_list;
pub use run::cmd_run;
pub use status::cmd_status;

/// A failed command, classified for the process exit code.
///
/// Configuration errors (bad graph, unsupported target, broken config file)
/// are distinguished from execution errors (a task failed mid-run) so
/// automation can tell "fix your setup" from "retry the build".
#[derive(Debug)]
pub enum CmdError {
  Config(anyhow::Error),
  Execution(anyhow::Error),
}

impl CmdError {
  pub fn config(err: impl Into<anyhow::Error>) -> Self {
    CmdError::Config(err.into())
  }

  pub fn execution(err: impl Into<anyhow::Error>) -> Self {
    CmdError::Execution(err.into())
  }

  fn inner(&self) -> &anyhow::Error {
    match self {
      CmdError::Config(e) | CmdError::Execution(e) => e,
    }
  }
}

impl std::fmt::Display for CmdError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if f.alternate() {
      write!(f, "{:#}", self.inner())
    } else {
      write!(f, "{}", self.inner())
    }
  }
}
