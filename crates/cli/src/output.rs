//! CLI output formatting utilities.
//!
//! Consistent terminal rendering for task outcomes and summaries.

use std::time::Duration;

use owo_colors::OwoColorize;

use forge_core::{ExecutionReport, TaskOutcome};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const SKIPPED: &str = "•";
  pub const ARROW: &str = "→";
}

/// Human-readable duration, truncated to milliseconds.
pub fn format_duration(duration: Duration) -> String {
  let truncated = Duration::from_millis(duration.as_millis() as u64);
  if truncated.is_zero() {
    "<1ms".to_string()
  } else {
    humantime::format_duration(truncated).to_string()
  }
}

/// Print one line per scheduled task, then a summary.
pub fn print_report(report: &ExecutionReport) {
  for run in &report.runs {
    match run.outcome {
      TaskOutcome::Executed => {
        println!(
          "  {} {} {}",
          symbols::SUCCESS.green().bold(),
          run.task,
          format!("({})", format_duration(run.duration)).dimmed()
        );
      }
      TaskOutcome::Skipped => {
        println!("  {} {} {}", symbols::SKIPPED.dimmed(), run.task.dimmed(), "(up to date)".dimmed());
      }
    }
  }

  let executed = report.executed().len();
  let skipped = report.skipped().len();
  println!();
  if report.is_noop() {
    println!("{} Nothing to do, everything is up to date", symbols::SUCCESS.green().bold());
  } else {
    println!(
      "{} {} task(s) executed, {} up to date",
      symbols::SUCCESS.green().bold(),
      executed,
      skipped
    );
  }
}
