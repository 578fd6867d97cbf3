//! Build configuration.
//!
//! All knobs live in explicit structs constructed at startup and passed into
//! pipeline construction; nothing reads ambient global state. An optional
//! `forge.toml` overrides the defaults, which mirror the library's own
//! release build.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use forge_platform::Target;

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

/// The native library being built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySection {
  /// Library stem, used for archive, source directory, and artifact names.
  pub name: String,

  /// Upstream release version.
  pub version: String,

  /// Release archive URL template; `{version}` is substituted.
  pub archive_url: String,
}

impl Default for LibrarySection {
  fn default() -> Self {
    Self {
      name: "flecs".to_string(),
      version: "4.1.4".to_string(),
      archive_url: "https://github.com/SanderMertens/flecs/archive/refs/tags/v{version}.tar.gz".to_string(),
    }
  }
}

/// Where build state and artifacts live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
  /// Root of all build output.
  pub build_dir: PathBuf,

  /// Destination directory for generated bindings.
  pub bindings_dir: PathBuf,

  /// Destination of the merged benchmark report.
  pub report_path: PathBuf,
}

impl Default for PathsSection {
  fn default() -> Self {
    Self {
      build_dir: PathBuf::from("build"),
      bindings_dir: PathBuf::from("generated"),
      report_path: PathBuf::from("results/benchmark-results.txt"),
    }
  }
}

/// The external binding-generation tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BindgenSection {
  /// Generator executable (resolved via PATH unless absolute).
  pub executable: String,

  /// Namespace the generated sources are placed under.
  pub namespace: String,
}

impl Default for BindgenSection {
  fn default() -> Self {
    Self {
      executable: "jextract".to_string(),
      namespace: "flecs".to_string(),
    }
  }
}

/// Benchmark pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchSection {
  /// Directory holding the native benchmark's C sources.
  pub source_dir: PathBuf,

  /// C source files, compiled in this order.
  pub sources: Vec<String>,

  /// Command line invoking the managed-runtime harness. The harness is
  /// expected to write its own results file.
  pub managed_command: Vec<String>,

  /// Optional per-benchmark-task time bound, in seconds.
  pub timeout_secs: Option<u64>,
}

impl Default for BenchSection {
  fn default() -> Self {
    Self {
      source_dir: PathBuf::from("benchmark/src/c"),
      sources: vec![
        "main.c".to_string(),
        "benchmark_utils.c".to_string(),
        "entity_creation_benchmark.c".to_string(),
        "query_benchmark.c".to_string(),
      ],
      managed_command: vec!["./gradlew".to_string(), ":benchmark:jmh".to_string()],
      timeout_secs: None,
    }
  }
}

/// Complete build configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
  pub library: LibrarySection,
  pub paths: PathsSection,
  pub bindgen: BindgenSection,
  pub bench: BenchSection,
}

impl BuildConfig {
  /// Load configuration from a TOML file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
      path: path.to_path_buf(),
      source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      source: e,
    })
  }

  /// Load configuration, falling back to defaults if the file is absent.
  pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
    if path.exists() {
      Self::load(path)
    } else {
      Ok(Self::default())
    }
  }

  /// Archive URL with the version substituted.
  pub fn archive_url(&self) -> String {
    self.library.archive_url.replace("{version}", &self.library.version)
  }

  /// Root directory for the library's sources and archive.
  pub fn library_root(&self) -> PathBuf {
    self.paths.build_dir.join(&self.library.name)
  }

  /// Local path of the downloaded release archive.
  pub fn archive_path(&self) -> PathBuf {
    self
      .library_root()
      .join(format!("{}-{}.tar.gz", self.library.name, self.library.version))
  }

  /// Extracted source tree (GitHub archives unpack to `<name>-<version>/`).
  pub fn source_dir(&self) -> PathBuf {
    self
      .library_root()
      .join(format!("{}-{}", self.library.name, self.library.version))
  }

  /// Directory holding the amalgamated source and header.
  pub fn distr_dir(&self) -> PathBuf {
    self.source_dir().join("distr")
  }

  /// The amalgamated C source.
  pub fn amalgamation_source(&self) -> PathBuf {
    self.distr_dir().join(format!("{}.c", self.library.name))
  }

  /// The public header the bindings are generated from.
  pub fn header(&self) -> PathBuf {
    self.distr_dir().join(format!("{}.h", self.library.name))
  }

  /// Staging directory for the compiled native library of one target.
  pub fn natives_dir(&self, target: Target) -> PathBuf {
    self.paths.build_dir.join("natives").join(target.to_string())
  }

  /// Build directory for the native benchmark.
  pub fn bench_build_dir(&self) -> PathBuf {
    self.paths.build_dir.join("bench_native")
  }

  /// The linked native benchmark binary.
  pub fn bench_binary(&self) -> PathBuf {
    self.bench_build_dir().join("bench")
  }

  /// Results file written by the managed-runtime harness.
  pub fn managed_results_path(&self) -> PathBuf {
    self.paths.build_dir.join("results/managed/results.txt")
  }

  /// Results file captured from the native benchmark binary.
  pub fn native_results_path(&self) -> PathBuf {
    self.paths.build_dir.join("results/native/results.txt")
  }

  /// On-disk fingerprint state location.
  pub fn state_path(&self) -> PathBuf {
    self.paths.build_dir.join(".forge/fingerprints.json")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use forge_platform::{Arch, Os};
  use tempfile::TempDir;

  #[test]
  fn defaults_mirror_the_release_build() {
    let config = BuildConfig::default();

    assert_eq!(config.library.name, "flecs");
    assert_eq!(config.archive_url(), "https://github.com/SanderMertens/flecs/archive/refs/tags/v4.1.4.tar.gz");
    assert_eq!(config.archive_path(), PathBuf::from("build/flecs/flecs-4.1.4.tar.gz"));
    assert_eq!(config.amalgamation_source(), PathBuf::from("build/flecs/flecs-4.1.4/distr/flecs.c"));
    assert_eq!(config.header(), PathBuf::from("build/flecs/flecs-4.1.4/distr/flecs.h"));
    assert_eq!(config.bench.sources.len(), 4);
  }

  #[test]
  fn natives_dir_is_target_specific() {
    let config = BuildConfig::default();
    let target = Target::new(Os::Linux, Arch::X64);
    assert_eq!(config.natives_dir(target), PathBuf::from("build/natives/linux-x64"));
  }

  #[test]
  fn missing_file_falls_back_to_defaults() {
    let temp = TempDir::new().unwrap();
    let config = BuildConfig::load_or_default(&temp.path().join("forge.toml")).unwrap();
    assert_eq!(config.library.version, "4.1.4");
  }

  #[test]
  fn partial_file_overrides_only_named_fields() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("forge.toml");
    std::fs::write(
      &path,
      r#"
[library]
version = "4.2.0"

[bench]
timeout_secs = 600
"#,
    )
    .unwrap();

    let config = BuildConfig::load(&path).unwrap();
    assert_eq!(config.library.version, "4.2.0");
    assert_eq!(config.library.name, "flecs");
    assert_eq!(config.bench.timeout_secs, Some(600));
    assert_eq!(config.source_dir(), PathBuf::from("build/flecs/flecs-4.2.0"));
  }

  #[test]
  fn malformed_file_is_a_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("forge.toml");
    std::fs::write(&path, "library = not-a-table").unwrap();

    let result = BuildConfig::load(&path);
    assert!(matches!(result, Err(ConfigError::Parse { .. })));
  }
}
