//! Implementation of the `forge run` command.
//!
//! Resolves the build target, constructs the pipeline graph, and hands it to
//! the scheduler. Prints a per-task outcome list and a summary.

use std::path::Path;

use owo_colors::OwoColorize;
use tracing::info;

use forge_core::scheduler::ExecuteError;
use forge_core::{BuildConfig, CommandRunner, FingerprintStore, Scheduler, ToolchainMatrix, pipeline};
use forge_platform::{Arch, Os, Target};

use crate::output::{self, symbols};

use super::CmdError;

/// Execute the run command.
pub fn cmd_run(target: &str, os: Option<&str>, arch: Option<&str>, config_path: &Path) -> Result<(), CmdError> {
  let config = BuildConfig::load_or_default(config_path).map_err(CmdError::config)?;

  let os = match os {
    Some(name) => name.parse::<Os>().map_err(CmdError::config)?,
    None => Os::current(),
  };
  let arch = match arch {
    Some(name) => name.parse::<Arch>().map_err(CmdError::config)?,
    None => Arch::current(),
  };
  let build_target = Target::new(os, arch);

  println!(
    "{} {} {} {} {}",
    symbols::ARROW.cyan().bold(),
    config.library.name,
    config.library.version,
    "for".dimmed(),
    build_target
  );

  info!(target, build_target = %build_target, "starting run");

  let matrix = ToolchainMatrix::default_matrix();
  let graph = pipeline::build_graph(&config, &matrix, build_target).map_err(CmdError::config)?;

  let mut store = FingerprintStore::load(config.state_path()).map_err(CmdError::execution)?;
  let runner = CommandRunner::new();

  let report = Scheduler::new(&mut store, &runner)
    .execute(&graph, target)
    .map_err(|e| match e {
      ExecuteError::Graph(_) => CmdError::config(e),
      other => CmdError::execution(other),
    })?;

  output::print_report(&report);
  Ok(())
}
