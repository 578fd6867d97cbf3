//! Toolchain profiles keyed by (OS, architecture).
//!
//! A profile is the full compiler invocation template for producing the
//! native shared library on one target: compiler name, shared-library and
//! codegen flags, architecture tuning, preprocessor defines, and link
//! libraries. Profiles are plain data, constructed once at startup and never
//! consulted from the environment, so identical targets resolve identically
//! on every machine.
//!
//! An unmapped target is a hard configuration error. Guessing flags would
//! produce a runnable-but-wrong artifact, which is worse than failing fast.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use forge_platform::{Arch, Os, Target};

use crate::runner::CommandSpec;

/// Error returned when no profile exists for a target.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolchainError {
  #[error("no toolchain profile for target {target}")]
  UnsupportedTarget { target: Target },
}

/// Compiler invocation template for one target.
#[derive(Debug, Clone, Serialize)]
pub struct ToolchainProfile {
  /// Compiler executable name.
  pub compiler: String,

  /// Flags that make the output a shared library (`-shared`, `-fPIC`, ...).
  pub shared_flags: Vec<String>,

  /// Architecture-tuning flag (`-march=...` / `-mtune=...`).
  pub tuning: String,

  /// Optimization and codegen flags.
  pub codegen: Vec<String>,

  /// Language standard flag.
  pub lang_std: String,

  /// Preprocessor defines (full `-D...` spellings).
  pub defines: Vec<String>,

  /// Link libraries and frameworks, in link order.
  pub link_libs: Vec<String>,

  /// Shared-library file-name convention for this target.
  pub lib_prefix: String,
  pub lib_suffix: String,
}

impl ToolchainProfile {
  /// Shared-library file name for a library stem (e.g. `flecs` to
  /// `libflecs.so`).
  pub fn shared_library_name(&self, stem: &str) -> String {
    format!("{}{}{}", self.lib_prefix, stem, self.lib_suffix)
  }

  /// Assemble the full compile-and-link command for building the shared
  /// library from a single amalgamated source file.
  pub fn shared_library_command(&self, source: &Path, output: &Path) -> CommandSpec {
    CommandSpec::new(&self.compiler)
      .args(self.shared_flags.iter().cloned())
      .arg("-o")
      .arg(output.to_string_lossy())
      .arg(source.to_string_lossy())
      .args(self.codegen.iter().cloned())
      .arg(&self.tuning)
      .arg(&self.lang_std)
      .args(self.defines.iter().cloned())
      .args(self.link_libs.iter().cloned())
  }
}

/// Immutable lookup table of toolchain profiles.
#[derive(Debug, Default)]
pub struct ToolchainMatrix {
  profiles: HashMap<Target, ToolchainProfile>,
}

impl ToolchainMatrix {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a profile for a target. Adding a target is a data change
  /// here, never a control-flow change in the scheduler.
  pub fn insert(&mut self, target: Target, profile: ToolchainProfile) {
    self.profiles.insert(target, profile);
  }

  /// Look up the profile for a target.
  ///
  /// No fallback: an unmapped target fails immediately.
  pub fn resolve(&self, target: Target) -> Result<&ToolchainProfile, ToolchainError> {
    self
      .profiles
      .get(&target)
      .ok_or(ToolchainError::UnsupportedTarget { target })
  }

  pub fn targets(&self) -> impl Iterator<Item = &Target> {
    self.profiles.keys()
  }

  /// The built-in matrix: linux, windows, and macos on x64 and aarch64,
  /// with the flag sets the library's own release builds use.
  pub fn default_matrix() -> Self {
    let mut matrix = Self::new();

    let codegen_common = ["-Ofast", "-flto", "-fomit-frame-pointer", "-funroll-loops"];

    for arch in [Arch::X64, Arch::Aarch64] {
      let linux_tuning = match arch {
        Arch::X64 => "-march=x86-64-v2",
        Arch::Aarch64 => "-march=armv8-a",
      };

      matrix.insert(
        Target::new(Os::Linux, arch),
        ToolchainProfile {
          compiler: "gcc".to_string(),
          shared_flags: vec_of(&["-shared", "-fPIC"]),
          tuning: linux_tuning.to_string(),
          codegen: vec_of(&[
            "-Ofast",
            "-flto",
            "-fomit-frame-pointer",
            "-funroll-loops",
            "-fno-semantic-interposition",
            "-fno-plt",
          ]),
          lang_std: "-std=c99".to_string(),
          defines: vec_of(&[
            "-DFLECS_SHARED",
            "-DNDEBUG",
            "-D_POSIX_C_SOURCE=200809L",
            "-D_DEFAULT_SOURCE",
          ]),
          link_libs: vec_of(&["-lm", "-lrt", "-lpthread"]),
          lib_prefix: "lib".to_string(),
          lib_suffix: ".so".to_string(),
        },
      );

      matrix.insert(
        Target::new(Os::Windows, arch),
        ToolchainProfile {
          compiler: "gcc".to_string(),
          shared_flags: vec_of(&["-shared"]),
          tuning: linux_tuning.to_string(),
          codegen: vec_of(&codegen_common),
          lang_std: "-std=c99".to_string(),
          defines: vec_of(&["-DFLECS_SHARED", "-DNDEBUG"]),
          link_libs: vec_of(&["-lws2_32", "-ldbghelp"]),
          lib_prefix: String::new(),
          lib_suffix: ".dll".to_string(),
        },
      );

      let macos_tuning = match arch {
        Arch::X64 => "-mtune=generic",
        Arch::Aarch64 => "-march=armv8-a",
      };

      matrix.insert(
        Target::new(Os::Macos, arch),
        ToolchainProfile {
          compiler: "gcc".to_string(),
          shared_flags: vec_of(&["-dynamiclib"]),
          tuning: macos_tuning.to_string(),
          codegen: vec_of(&codegen_common),
          lang_std: "-std=c99".to_string(),
          defines: vec_of(&["-DFLECS_SHARED", "-DNDEBUG"]),
          link_libs: vec_of(&["-framework", "CoreFoundation"]),
          lib_prefix: "lib".to_string(),
          lib_suffix: ".dylib".to_string(),
        },
      );
    }

    matrix
  }
}

fn vec_of(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  #[test]
  fn default_matrix_covers_six_targets() {
    let matrix = ToolchainMatrix::default_matrix();
    assert_eq!(matrix.targets().count(), 6);

    for os in [Os::Linux, Os::Macos, Os::Windows] {
      for arch in [Arch::X64, Arch::Aarch64] {
        assert!(matrix.resolve(Target::new(os, arch)).is_ok(), "missing {os}-{arch}");
      }
    }
  }

  #[test]
  fn linux_x64_profile_matches_release_flags() {
    let matrix = ToolchainMatrix::default_matrix();
    let profile = matrix.resolve(Target::new(Os::Linux, Arch::X64)).unwrap();

    assert_eq!(profile.compiler, "gcc");
    assert_eq!(profile.tuning, "-march=x86-64-v2");
    assert!(profile.shared_flags.contains(&"-fPIC".to_string()));
    assert!(profile.defines.contains(&"-D_DEFAULT_SOURCE".to_string()));
    assert!(profile.link_libs.contains(&"-lrt".to_string()));
    assert_eq!(profile.shared_library_name("flecs"), "libflecs.so");
  }

  #[test]
  fn macos_uses_dynamiclib_and_frameworks() {
    let matrix = ToolchainMatrix::default_matrix();
    let profile = matrix.resolve(Target::new(Os::Macos, Arch::Aarch64)).unwrap();

    assert_eq!(profile.shared_flags, ["-dynamiclib"]);
    assert_eq!(profile.link_libs, ["-framework", "CoreFoundation"]);
    assert_eq!(profile.shared_library_name("flecs"), "libflecs.dylib");
  }

  #[test]
  fn windows_links_platform_libraries() {
    let matrix = ToolchainMatrix::default_matrix();
    let profile = matrix.resolve(Target::new(Os::Windows, Arch::X64)).unwrap();

    assert_eq!(profile.link_libs, ["-lws2_32", "-ldbghelp"]);
    assert_eq!(profile.shared_library_name("flecs"), "flecs.dll");
  }

  #[test]
  fn unmapped_target_is_rejected_not_defaulted() {
    let matrix = ToolchainMatrix::new();
    let target = Target::new(Os::Linux, Arch::X64);

    let err = matrix.resolve(target).unwrap_err();
    assert_eq!(err, ToolchainError::UnsupportedTarget { target });
  }

  #[test]
  fn shared_library_command_assembles_full_argv() {
    let matrix = ToolchainMatrix::default_matrix();
    let profile = matrix.resolve(Target::new(Os::Linux, Arch::X64)).unwrap();

    let spec = profile.shared_library_command(&PathBuf::from("distr/flecs.c"), &PathBuf::from("distr/libflecs.so"));

    assert_eq!(spec.program, "gcc");
    let line = spec.display_line();
    assert!(line.contains("-shared"));
    assert!(line.contains("-o distr/libflecs.so distr/flecs.c"));
    assert!(line.contains("-march=x86-64-v2"));
    assert!(line.contains("-std=c99"));
    assert!(line.contains("-DFLECS_SHARED"));
    assert!(line.ends_with("-lm -lrt -lpthread"));
  }

  #[test]
  fn resolve_is_pure_data_lookup() {
    // Two matrices built the same way resolve identical profiles.
    let a = ToolchainMatrix::default_matrix();
    let b = ToolchainMatrix::default_matrix();
    let target = Target::new(Os::Windows, Arch::Aarch64);

    let pa = a.resolve(target).unwrap();
    let pb = b.resolve(target).unwrap();
    assert_eq!(serde_json::to_string(pa).unwrap(), serde_json::to_string(pb).unwrap());
  }
}
