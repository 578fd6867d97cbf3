//! Operating system and architecture identification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error returned when parsing an OS or architecture name fails.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseTargetError {
    #[error("unknown operating system: {0}")]
    UnknownOs(String),

    #[error("unknown architecture: {0}")]
    UnknownArch(String),
}

/// Operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

impl Os {
    /// Detect the current operating system at compile time
    #[cfg(target_os = "linux")]
    pub const fn current() -> Self {
        Os::Linux
    }

    #[cfg(target_os = "macos")]
    pub const fn current() -> Self {
        Os::Macos
    }

    #[cfg(target_os = "windows")]
    pub const fn current() -> Self {
        Os::Windows
    }

    /// Returns the OS name as used in target strings
    pub const fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Macos => "macos",
            Os::Windows => "windows",
        }
    }

    /// Shared-library file name for a library stem on this OS
    /// (e.g. `flecs` becomes `libflecs.so` on Linux, `flecs.dll` on Windows).
    pub fn shared_library_name(&self, stem: &str) -> String {
        match self {
            Os::Linux => format!("lib{}.so", stem),
            Os::Macos => format!("lib{}.dylib", stem),
            Os::Windows => format!("{}.dll", stem),
        }
    }
}

impl FromStr for Os {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Os::Linux),
            "macos" | "darwin" => Ok(Os::Macos),
            "windows" => Ok(Os::Windows),
            other => Err(ParseTargetError::UnknownOs(other.to_string())),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X64,
    Aarch64,
}

impl Arch {
    /// Detect the current architecture at compile time
    #[cfg(target_arch = "x86_64")]
    pub const fn current() -> Self {
        Arch::X64
    }

    #[cfg(target_arch = "aarch64")]
    pub const fn current() -> Self {
        Arch::Aarch64
    }

    /// Returns the architecture name as used in target strings
    pub const fn as_str(&self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

impl FromStr for Arch {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Ok(Arch::X64),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            other => Err(ParseTargetError::UnknownArch(other.to_string())),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Combined (OS, architecture) target identifier (e.g., "linux-x64")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub os: Os,
    pub arch: Arch,
}

impl Target {
    /// Create a new target identifier
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detect the build host's target at compile time
    pub const fn current() -> Self {
        Self {
            os: Os::current(),
            arch: Arch::current(),
        }
    }

    /// Shared-library file name for a library stem on this target's OS.
    pub fn shared_library_name(&self, stem: &str) -> String {
        self.os.shared_library_name(stem)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}
