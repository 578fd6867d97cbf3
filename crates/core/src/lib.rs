//! forge-core: the incremental build engine
//!
//! This crate provides the pieces the `forge` CLI assembles:
//! - `TaskGraph` / `Scheduler`: dependency-ordered incremental execution
//! - `FingerprintStore`: content signatures deciding skip-vs-run
//! - `CommandRunner`: blocking external-process invocation
//! - `ToolchainMatrix`: per-target compiler profiles as plain data
//! - report merging for the heterogeneous benchmark outputs
//! - the concrete pipeline for building the native library

pub mod config;
pub mod fetch;
pub mod fingerprint;
pub mod graph;
pub mod hash;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod task;
pub mod toolchain;

pub use config::{BuildConfig, ConfigError};
pub use fingerprint::{FingerprintError, FingerprintStore};
pub use graph::{GraphError, TaskGraph};
pub use pipeline::{PipelineError, build_graph};
pub use runner::{CommandRunner, CommandSpec, RunnerOutput};
pub use scheduler::{ExecuteError, ExecutionReport, Scheduler, TaskOutcome};
pub use task::{ActionContext, ActionError, Task};
pub use toolchain::{ToolchainError, ToolchainMatrix, ToolchainProfile};
