//! Benchmark report merging.
//!
//! Two independently formatted text outputs feed the final report: the
//! managed-runtime harness (a free-form log ending in a results table) and
//! the native benchmark binary (already tabular). Fragments are combined in
//! label order; a missing fragment becomes a clearly delimited placeholder
//! so a partial run still yields a complete, inspectable report.
//!
//! The managed output is located heuristically: the last line starting with
//! the `Benchmark` header token opens the results table, and everything from
//! there to the end of the file is kept. The format is owned by an external
//! tool, so when the token is absent the fragment degrades to "malformed"
//! and its raw text is included verbatim under a warning, rather than
//! failing the merge.

use std::io;
use std::path::Path;

use tracing::warn;

/// Header token that opens the managed harness's results table.
pub const TABLE_HEADER_TOKEN: &str = "Benchmark";

const RULE: &str = "------------------------------------------------------------";

/// Parse status of one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentStatus {
  /// The source file existed and parsed as expected.
  Found,
  /// The source file was absent or unreadable.
  Missing,
  /// The source file existed but the expected structure was not found.
  Malformed,
}

/// One labeled, independently sourced piece of the merged report.
#[derive(Debug, Clone)]
pub struct Fragment {
  pub label: String,
  pub status: FragmentStatus,
  pub lines: Vec<String>,
}

impl Fragment {
  /// Build a fragment from a file expected to end in a recognizable table.
  ///
  /// Takes the last contiguous block starting at the header row. A file
  /// without the header row is malformed, not an error.
  pub fn tabular(label: impl Into<String>, path: &Path) -> Self {
    let label = label.into();

    let lines = match read_lines(path) {
      Ok(lines) => lines,
      Err(e) => {
        warn!(label = %label, path = %path.display(), error = %e, "fragment source unavailable");
        return Self {
          label,
          status: FragmentStatus::Missing,
          lines: Vec::new(),
        };
      }
    };

    let table_start = lines
      .iter()
      .rposition(|line| line.trim_start().starts_with(TABLE_HEADER_TOKEN));

    match table_start {
      Some(start) => Self {
        label,
        status: FragmentStatus::Found,
        lines: lines[start..].to_vec(),
      },
      None => {
        warn!(label = %label, path = %path.display(), "no results table found, keeping raw output");
        Self {
          label,
          status: FragmentStatus::Malformed,
          lines,
        }
      }
    }
  }

  /// Build a fragment that carries a file verbatim.
  pub fn verbatim(label: impl Into<String>, path: &Path) -> Self {
    let label = label.into();

    match read_lines(path) {
      Ok(lines) => Self {
        label,
        status: FragmentStatus::Found,
        lines,
      },
      Err(e) => {
        warn!(label = %label, path = %path.display(), error = %e, "fragment source unavailable");
        Self {
          label,
          status: FragmentStatus::Missing,
          lines: Vec::new(),
        }
      }
    }
  }
}

/// Merge fragments into one report, preserving fragment order.
///
/// The banner (host summary) leads, followed by a title and timestamp, then
/// one delimited section per fragment. Never fails: degraded fragments are
/// annotated instead.
pub fn merge(banner: &str, title: &str, fragments: &[Fragment]) -> String {
  let mut out = String::new();

  out.push_str(banner);
  out.push_str("\n\n");
  out.push_str(title);
  out.push('\n');
  out.push_str(&format!(
    "Date : {}\n",
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
  ));

  for fragment in fragments {
    out.push('\n');
    out.push_str(&format!("[ {} ]\n", fragment.label));
    out.push_str(RULE);
    out.push('\n');

    match fragment.status {
      FragmentStatus::Found => {
        for line in &fragment.lines {
          out.push_str(line);
          out.push('\n');
        }
      }
      FragmentStatus::Missing => {
        out.push_str("(no results were produced for this source)\n");
      }
      FragmentStatus::Malformed => {
        out.push_str("warning: unrecognized output format; raw output follows\n\n");
        for line in &fragment.lines {
          out.push_str(line);
          out.push('\n');
        }
      }
    }
  }

  out
}

fn read_lines(path: &Path) -> io::Result<Vec<String>> {
  let content = std::fs::read_to_string(path)?;
  Ok(content.lines().map(|l| l.to_string()).collect())
}
