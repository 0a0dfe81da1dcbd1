//! Run results and the human-facing `summary.txt`.

use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::artifact::Category;
use crate::identifiers::{IdKind, IdentifierSet, Mode};

/// Skip reason for tasks whose identifiers were not supplied.
pub const NO_IDENTIFIER: &str = "no identifier supplied";

/// Name of the summary file at the bundle root.
pub const SUMMARY_FILE: &str = "summary.txt";

/// Outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Success { path: PathBuf, bytes: u64 },
    Skipped { reason: String },
    Failed { error: String, exit_code: Option<i32> },
}

/// One entry of the run, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub category: Category,
    /// Task name, with the target in brackets for fan-out tasks.
    pub task: String,
    pub status: RunStatus,
}

impl RunResult {
    pub fn success(category: Category, task: impl Into<String>, path: PathBuf, bytes: u64) -> Self {
        Self {
            category,
            task: task.into(),
            status: RunStatus::Success { path, bytes },
        }
    }

    pub fn skipped(category: Category, task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            category,
            task: task.into(),
            status: RunStatus::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn failed(
        category: Category,
        task: impl Into<String>,
        error: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self {
            category,
            task: task.into(),
            status: RunStatus::Failed {
                error: error.into(),
                exit_code,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, RunStatus::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RunStatus::Failed { .. })
    }

    /// Short status word.
    pub fn status_label(&self) -> &'static str {
        match self.status {
            RunStatus::Success { .. } => "SUCCESS",
            RunStatus::Skipped { .. } => "SKIPPED",
            RunStatus::Failed { .. } => "FAILED",
        }
    }

    /// Path, skip reason or failure description.
    pub fn detail(&self) -> String {
        match &self.status {
            RunStatus::Success { path, bytes } => format!("{} ({} bytes)", path.display(), bytes),
            RunStatus::Skipped { reason } => reason.clone(),
            RunStatus::Failed {
                error,
                exit_code: Some(code),
            } => format!("exit {}: {}", code, error),
            RunStatus::Failed {
                error,
                exit_code: None,
            } => error.clone(),
        }
    }
}

/// Counts of results by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Totals {
    pub fn of(results: &[RunResult]) -> Self {
        results.iter().fold(Totals::default(), |mut totals, result| {
            match result.status {
                RunStatus::Success { .. } => totals.succeeded += 1,
                RunStatus::Skipped { .. } => totals.skipped += 1,
                RunStatus::Failed { .. } => totals.failed += 1,
            }
            totals
        })
    }
}

/// Context printed at the top of the summary.
#[derive(Debug, Clone)]
pub struct SummaryHeader<'a> {
    pub generated_at: DateTime<Utc>,
    pub run_id: &'a str,
    pub mode: Mode,
    pub ids: &'a IdentifierSet,
}

/// Render `summary.txt`: one line per result, in execution order.
pub fn render_summary(header: &SummaryHeader<'_>, results: &[RunResult]) -> String {
    let totals = Totals::of(results);
    let mut out = String::new();

    out.push_str("=== Debug Summary ===\n");
    let _ = writeln!(out, "Generated: {}", header.generated_at.to_rfc3339());
    let _ = writeln!(out, "Run ID: {}", header.run_id);
    let _ = writeln!(out, "Mode: {}", header.mode);
    if let Some(namespace) = header.ids.get(IdKind::Namespace) {
        let _ = writeln!(out, "Namespace: {}", namespace);
    }
    let _ = writeln!(out, "Identifiers: {}", header.ids);
    let _ = writeln!(
        out,
        "Results: {} succeeded, {} skipped, {} failed",
        totals.succeeded, totals.skipped, totals.failed
    );
    out.push('\n');

    let _ = writeln!(
        out,
        "{:>3}  {:<9}  {:<7}  {:<40}  {}",
        "#", "CATEGORY", "STATUS", "TASK", "DETAIL"
    );
    for (index, result) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}  {:<9}  {:<7}  {:<40}  {}",
            index + 1,
            result.category,
            result.status_label(),
            result.task,
            result.detail()
        );
    }

    out.push_str("=== End of Summary ===\n");
    out
}
