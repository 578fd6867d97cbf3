//! Platform detection and host information for forge
//!
//! This crate provides cross-platform abstractions for:
//! - OS and architecture detection and parsing
//! - Native shared-library naming conventions
//! - Host machine summary (used as the benchmark report banner)

mod host;
mod platform;

pub use host::HostInfo;
pub use platform::{Arch, Os, ParseTargetError, Target};
