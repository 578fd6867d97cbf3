//! The concrete build and benchmark pipeline.
//!
//! This module wires the fixed task graph the tool exists for: fetch and
//! extract the library release, compile the native shared library for the
//! requested target, regenerate bindings, stage the artifact, build and run
//! the native benchmark, invoke the managed harness, and merge the two
//! benchmark outputs into one report.
//!
//! All paths and commands come from [`BuildConfig`]; the compiler invocation
//! comes from the resolved [`ToolchainProfile`]. Construction fails fast on
//! an unsupported target, before anything executes.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use forge_platform::{HostInfo, Target};

use crate::config::BuildConfig;
use crate::fetch;
use crate::graph::{GraphError, TaskGraph};
use crate::report::{self, Fragment};
use crate::runner::CommandSpec;
use crate::task::{ActionError, Task, copy_into};
use crate::toolchain::{ToolchainError, ToolchainMatrix};

/// Errors while constructing the pipeline graph.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Toolchain(#[from] ToolchainError),

  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// Build the full task graph for one target.
pub fn build_graph(config: &BuildConfig, matrix: &ToolchainMatrix, target: Target) -> Result<TaskGraph, PipelineError> {
  let profile = matrix.resolve(target)?.clone();

  let archive = config.archive_path();
  let library_root = config.library_root();
  let source_dir = config.source_dir();
  let distr_dir = config.distr_dir();
  let amalgamation = config.amalgamation_source();
  let header = config.header();
  let native_lib = distr_dir.join(profile.shared_library_name(&config.library.name));
  let bindings_dir = config.paths.bindings_dir.clone();
  let natives_dir = config.natives_dir(target);
  let bench_timeout = config.bench.timeout_secs.map(Duration::from_secs);

  let mut graph = TaskGraph::new();

  // Fetch the versioned release archive. Cached on the archive itself: the
  // task re-runs only when the file disappears or changes.
  {
    let url = config.archive_url();
    let dest = archive.clone();
    graph.add(Task::named("fetch-source").output(&archive).action(move |_| {
      fetch::download(&url, &dest)?;
      Ok(())
    }))?;
  }

  // Unpack into build/<name>/<name>-<version>/.
  {
    let archive = archive.clone();
    let dest = library_root.clone();
    graph.add(
      Task::named("extract-source")
        .depends_on("fetch-source")
        .input(&archive)
        .output(&source_dir)
        .action(move |_| {
          fetch::extract_tar_gz(&archive, &dest)?;
          Ok(())
        }),
    )?;
  }

  // Compile the amalgamated source into the shared library using the
  // target's profile.
  {
    let profile = profile.clone();
    let source = amalgamation.clone();
    let output = native_lib.clone();
    graph.add(
      Task::named("compile-native")
        .depends_on("extract-source")
        .input(&amalgamation)
        .input(&header)
        .output(&native_lib)
        .action(move |ctx| {
          ctx.run_checked(&profile.shared_library_command(&source, &output))?;
          Ok(())
        }),
    )?;
  }

  // Regenerate bindings from the public header.
  {
    let executable = config.bindgen.executable.clone();
    let namespace = config.bindgen.namespace.clone();
    let out_dir = bindings_dir.clone();
    let include_dir = distr_dir.clone();
    let header = header.clone();
    graph.add(
      Task::named("generate-bindings")
        .depends_on("compile-native")
        .input(&header)
        .output(&bindings_dir)
        .action(move |ctx| {
          fs::create_dir_all(&out_dir)?;
          let spec = CommandSpec::new(&executable)
            .arg("--output")
            .arg(out_dir.to_string_lossy())
            .arg("-t")
            .arg(&namespace)
            .arg("-I")
            .arg(include_dir.to_string_lossy())
            .arg(header.to_string_lossy());
          ctx.run_checked(&spec)?;
          Ok(())
        }),
    )?;
  }

  // Stage the compiled library into the per-target natives folder.
  {
    let source = native_lib.clone();
    let dest_dir = natives_dir.clone();
    let staged = natives_dir.join(profile.shared_library_name(&config.library.name));
    graph.add(
      Task::named("stage-native")
        .depends_on("compile-native")
        .input(&native_lib)
        .output(staged)
        .action(move |_| {
          copy_into(&source, &dest_dir)?;
          Ok(())
        }),
    )?;
  }

  // Compile each benchmark translation unit against the library headers.
  let objects: Vec<PathBuf> = config
    .bench
    .sources
    .iter()
    .map(|src| config.bench_build_dir().join(src.replace(".c", ".o")))
    .collect();
  {
    let compiler = profile.compiler.clone();
    let bench_src_dir = config.bench.source_dir.clone();
    let sources = config.bench.sources.clone();
    let include_dir = distr_dir.clone();
    let obj_dir = config.bench_build_dir();

    let mut builder = Task::named("compile-bench-objects")
      .depends_on("compile-native")
      .input(&bench_src_dir)
      .input(&header);
    for obj in &objects {
      builder = builder.output(obj);
    }
    graph.add(builder.action(move |ctx| {
      fs::create_dir_all(&obj_dir)?;
      for src in &sources {
        let spec = CommandSpec::new(&compiler)
          .arg("-c")
          .arg(bench_src_dir.join(src).to_string_lossy())
          .arg("-o")
          .arg(obj_dir.join(src.replace(".c", ".o")).to_string_lossy())
          .arg("-I")
          .arg(bench_src_dir.to_string_lossy())
          .arg("-I")
          .arg(include_dir.to_string_lossy())
          .args(["-O2", "-march=native", "-std=c11"]);
        ctx.run_checked(&spec)?;
      }
      Ok(())
    }))?;
  }

  // Link the benchmark binary against the freshly built library.
  {
    let compiler = profile.compiler.clone();
    let objects_in = objects.clone();
    let binary = config.bench_binary();
    let lib_dir = distr_dir.clone();
    let lib_name = config.library.name.clone();

    let mut builder = Task::named("link-bench").depends_on("compile-bench-objects");
    for obj in &objects {
      builder = builder.input(obj);
    }
    builder = builder.input(&native_lib).output(&binary);
    graph.add(builder.action(move |ctx| {
      let mut spec = CommandSpec::new(&compiler);
      for obj in &objects_in {
        spec = spec.arg(obj.to_string_lossy());
      }
      let spec = spec
        .arg("-o")
        .arg(binary.to_string_lossy())
        .arg("-L")
        .arg(lib_dir.to_string_lossy())
        .arg(format!("-l{lib_name}"))
        .args(["-lm", "-lpthread"]);
      ctx.run_checked(&spec)?;
      Ok(())
    }))?;
  }

  // Run the native benchmark and capture its stdout. Benchmarks always
  // re-run: their whole point is fresh numbers.
  {
    let binary = config.bench_binary();
    let lib_dir = distr_dir.clone();
    let results = config.native_results_path();

    let mut builder = Task::named("run-native-bench")
      .depends_on("link-bench")
      .input(config.bench_binary())
      .output(&results)
      .always_run();
    if let Some(limit) = bench_timeout {
      builder = builder.timeout(limit);
    }
    graph.add(builder.action(move |ctx| {
      let spec = CommandSpec::new(binary.to_string_lossy()).env("LD_LIBRARY_PATH", lib_dir.to_string_lossy());
      let output = ctx.run_checked(&spec)?;

      if let Some(parent) = results.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::write(&results, output.stdout)?;
      Ok(())
    }))?;
  }

  // Invoke the managed-runtime harness; it writes its own results file,
  // which the task declares as its output.
  {
    let command = config.bench.managed_command.clone();
    let results = config.managed_results_path();

    let mut builder = Task::named("run-managed-bench")
      .depends_on("generate-bindings")
      .depends_on("stage-native")
      .output(&results)
      .always_run();
    if let Some(limit) = bench_timeout {
      builder = builder.timeout(limit);
    }
    graph.add(builder.action(move |ctx| {
      let (program, args) = command
        .split_first()
        .ok_or_else(|| ActionError::Io(std::io::Error::other("bench.managed_command is empty")))?;

      if let Some(parent) = results.parent() {
        fs::create_dir_all(parent)?;
      }

      let spec = CommandSpec::new(program).args(args.iter().cloned());
      ctx.run_checked(&spec)?;
      Ok(())
    }))?;
  }

  // Merge both benchmark outputs into the final report. Tolerant of a
  // partial run: a missing side becomes a labeled placeholder.
  {
    let managed = config.managed_results_path();
    let native = config.native_results_path();
    let report_path = config.paths.report_path.clone();
    let title = format!(
      "BENCHMARK RESULTS: {} {} (native vs managed runtime)",
      config.library.name, config.library.version
    );

    graph.add(
      Task::named("merge-report")
        .depends_on("run-native-bench")
        .depends_on("run-managed-bench")
        .input(&managed)
        .input(&native)
        .output(&report_path)
        .always_run()
        .action(move |_| {
          let fragments = [Fragment::tabular("managed", &managed), Fragment::verbatim("native", &native)];
          let banner = HostInfo::collect().render();
          let merged = report::merge(&banner, &title, &fragments);

          if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
          }
          fs::write(&report_path, merged)?;
          Ok(())
        }),
    )?;
  }

  // Aggregates, mirroring how the pipeline is actually driven.
  graph.add(
    Task::named("build")
      .depends_on("generate-bindings")
      .depends_on("stage-native")
      .aggregate(),
  )?;
  graph.add(Task::named("bench").depends_on("merge-report").aggregate())?;

  Ok(graph)
}

#[cfg(test)]
mod tests {
  use super::*;
  use forge_platform::{Arch, Os};

  fn linux_graph() -> TaskGraph {
    let config = BuildConfig::default();
    let matrix = ToolchainMatrix::default_matrix();
    build_graph(&config, &matrix, Target::new(Os::Linux, Arch::X64)).unwrap()
  }

  fn position(order: &[&Task], name: &str) -> usize {
    order.iter().position(|t| t.name() == name).unwrap()
  }

  #[test]
  fn graph_declares_every_pipeline_task() {
    let graph = linux_graph();

    for name in [
      "fetch-source",
      "extract-source",
      "compile-native",
      "generate-bindings",
      "stage-native",
      "compile-bench-objects",
      "link-bench",
      "run-native-bench",
      "run-managed-bench",
      "merge-report",
      "build",
      "bench",
    ] {
      assert!(graph.get(name).is_some(), "missing task {name}");
    }
  }

  #[test]
  fn bench_closure_orders_the_whole_pipeline() {
    let graph = linux_graph();
    let order = graph.resolve("bench").unwrap();

    assert!(position(&order, "fetch-source") < position(&order, "extract-source"));
    assert!(position(&order, "extract-source") < position(&order, "compile-native"));
    assert!(position(&order, "compile-native") < position(&order, "compile-bench-objects"));
    assert!(position(&order, "compile-bench-objects") < position(&order, "link-bench"));
    assert!(position(&order, "link-bench") < position(&order, "run-native-bench"));
    assert!(position(&order, "run-native-bench") < position(&order, "merge-report"));
    assert!(position(&order, "run-managed-bench") < position(&order, "merge-report"));
    assert!(position(&order, "merge-report") < position(&order, "bench"));
  }

  #[test]
  fn build_closure_excludes_benchmark_tasks() {
    let graph = linux_graph();
    let order = graph.resolve("build").unwrap();
    let names: Vec<&str> = order.iter().map(|t| t.name()).collect();

    assert!(names.contains(&"compile-native"));
    assert!(names.contains(&"generate-bindings"));
    assert!(names.contains(&"stage-native"));
    assert!(!names.contains(&"link-bench"));
    assert!(!names.contains(&"merge-report"));
  }

  #[test]
  fn compile_task_declares_the_amalgamation_and_artifact() {
    let graph = linux_graph();
    let compile = graph.get("compile-native").unwrap();

    assert_eq!(
      compile.inputs(),
      [
        PathBuf::from("build/flecs/flecs-4.1.4/distr/flecs.c"),
        PathBuf::from("build/flecs/flecs-4.1.4/distr/flecs.h"),
      ]
    );
    assert_eq!(compile.outputs(), [PathBuf::from("build/flecs/flecs-4.1.4/distr/libflecs.so")]);
    assert!(!compile.always_run());
  }

  #[test]
  fn staged_artifact_lands_in_the_target_directory() {
    let graph = linux_graph();
    let stage = graph.get("stage-native").unwrap();

    assert_eq!(stage.outputs(), [PathBuf::from("build/natives/linux-x64/libflecs.so")]);
  }

  #[test]
  fn windows_target_uses_dll_naming() {
    let config = BuildConfig::default();
    let matrix = ToolchainMatrix::default_matrix();
    let graph = build_graph(&config, &matrix, Target::new(Os::Windows, Arch::X64)).unwrap();

    let compile = graph.get("compile-native").unwrap();
    assert_eq!(compile.outputs(), [PathBuf::from("build/flecs/flecs-4.1.4/distr/flecs.dll")]);
  }

  #[test]
  fn benchmark_tasks_always_run() {
    let graph = linux_graph();

    for name in ["run-native-bench", "run-managed-bench", "merge-report"] {
      assert!(graph.get(name).unwrap().always_run(), "{name} should always run");
    }
    assert!(!graph.get("compile-native").unwrap().always_run());
  }

  #[test]
  fn bench_timeout_applies_to_run_tasks() {
    let mut config = BuildConfig::default();
    config.bench.timeout_secs = Some(900);
    let matrix = ToolchainMatrix::default_matrix();
    let graph = build_graph(&config, &matrix, Target::new(Os::Linux, Arch::X64)).unwrap();

    assert_eq!(
      graph.get("run-native-bench").unwrap().timeout(),
      Some(Duration::from_secs(900))
    );
    assert_eq!(
      graph.get("run-managed-bench").unwrap().timeout(),
      Some(Duration::from_secs(900))
    );
    assert_eq!(graph.get("compile-native").unwrap().timeout(), None);
  }

  #[test]
  fn bench_objects_mirror_the_source_list() {
    let graph = linux_graph();
    let objects = graph.get("compile-bench-objects").unwrap();

    assert_eq!(objects.outputs().len(), 4);
    assert!(objects.outputs().contains(&PathBuf::from("build/bench_native/main.o")));
    assert!(
      objects
        .outputs()
        .contains(&PathBuf::from("build/bench_native/query_benchmark.o"))
    );
  }

  #[test]
  fn unsupported_target_fails_construction() {
    let config = BuildConfig::default();
    let matrix = ToolchainMatrix::new();

    let err = build_graph(&config, &matrix, Target::new(Os::Linux, Arch::X64)).unwrap_err();
    assert!(matches!(err, PipelineError::Toolchain(ToolchainError::UnsupportedTarget { .. })));
  }

  #[test]
  fn aggregates_declare_no_paths() {
    let graph = linux_graph();
    let build = graph.get("build").unwrap();

    assert!(build.inputs().is_empty());
    assert!(build.outputs().is_empty());
    assert!(!build.always_run());
  }
}
