use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

use cmd::CmdError;

/// forge - incremental builder for the flecs native library
#[derive(Parser)]
#[command(name = "forge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the configuration file
  #[arg(long, global = true, default_value = "forge.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Execute a task and its dependencies
  Run {
    /// Task to execute (see `forge list`)
    #[arg(default_value = "build")]
    target: String,

    /// Override the target operating system (defaults to the host)
    #[arg(long)]
    os: Option<String>,

    /// Override the target architecture (defaults to the host)
    #[arg(long)]
    arch: Option<String>,
  },

  /// List the pipeline's tasks in registration order
  List,

  /// Show the host platform and toolchain targets
  Status,

  /// Remove the build directory, including cached fingerprints
  Clean,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::from_default_env()
  };
  tracing_subscriber::fmt().with_env_filter(filter).without_time().init();

  let result = match cli.command {
    Commands::Run { target, os, arch } => cmd::cmd_run(&target, os.as_deref(), arch.as_deref(), &cli.config),
    Commands::List => cmd::cmd_list(&cli.config),
    Commands::Status => cmd::cmd_status(),
    Commands::Clean => cmd::cmd_clean(&cli.config),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("{} {:#}", "error:".red().bold(), err);
      ExitCode::from(err.exit_code())
    }
  }
}

impl CmdError {
  /// Configuration mistakes (bad graph, unknown target, broken config
  /// file) exit with 2; execution failures exit with 1.
  fn exit_code(&self) -> u8 {
    match self {
      CmdError::Config(_) => 2,
      CmdError::Execution(_) => 1,
    }
  }
}
