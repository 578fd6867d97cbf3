//! Implementation of the `forge clean` command.

use std::io;
use std::path::Path;

use owo_colors::OwoColorize;

use forge_core::BuildConfig;

use super::CmdError;

/// Remove the build directory, including downloaded sources, compiled
/// artifacts, and the fingerprint state. The next run starts cache-cold.
pub fn cmd_clean(config_path: &Path) -> Result<(), CmdError> {
  let config = BuildConfig::load_or_default(config_path).map_err(CmdError::config)?;
  let build_dir = &config.paths.build_dir;

  match std::fs::remove_dir_all(build_dir) {
    Ok(()) => {
      println!("{} Removed {}", "::".cyan().bold(), build_dir.display());
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      println!("{} Nothing to clean", "::".cyan().bold());
    }
    Err(e) => return Err(CmdError::execution(e)),
  }

  Ok(())
}
