//! Implementation of the `forge status` command.

use owo_colors::OwoColorize;

use forge_core::ToolchainMatrix;
use forge_platform::HostInfo;

use super::CmdError;

/// Print the host summary and the targets the toolchain matrix supports.
pub fn cmd_status() -> Result<(), CmdError> {
  let host = HostInfo::collect();

  println!("{} forge v{}", "::".cyan().bold(), env!("CARGO_PKG_VERSION"));
  println!();
  println!("{}", host.render());
  println!();

  let matrix = ToolchainMatrix::default_matrix();
  let mut targets: Vec<String> = matrix.targets().map(|t| t.to_string()).collect();
  targets.sort();

  println!("Supported targets:");
  for target in targets {
    let marker = if target == host.target.to_string() {
      " (host)".green().to_string()
    } else {
      String::new()
    };
    println!("  {target}{marker}");
  }

  Ok(())
}
