//! Implementation of the `forge list` command.

use std::path::Path;

use owo_colors::OwoColorize;

use forge_core::{BuildConfig, ToolchainMatrix, pipeline};
use forge_platform::Target;

use super::CmdError;

/// Print the pipeline's tasks in registration order, with dependencies.
pub fn cmd_list(config_path: &Path) -> Result<(), CmdError> {
  let config = BuildConfig::load_or_default(config_path).map_err(CmdError::config)?;
  let matrix = ToolchainMatrix::default_matrix();

  let graph = pipeline::build_graph(&config, &matrix, Target::current()).map_err(CmdError::config)?;

  for task in graph.tasks() {
    let mut line = format!("  {}", task.name());

    if !task.deps().is_empty() {
      line.push_str(&format!(" {}", format!("(after: {})", task.deps().join(", ")).dimmed()));
    }
    if task.always_run() {
      line.push_str(&format!(" {}", "[always]".yellow()));
    }

    println!("{line}");
  }

  Ok(())
}
