//! The collection run, from environment check to archive.
//!
//! ```text
//! START -> ENV_CHECK -> {FATAL | RUNNING} -> SUMMARIZING -> {ARCHIVING | DONE} -> DONE
//! ```
//!
//! FATAL is only reachable before the bundle directory exists. Once
//! RUNNING starts the run always reaches DONE with a written summary.

use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::{archive_path_for, zip_directory, ArchiveOutcome};
use crate::artifact::ArtifactWriter;
use crate::collectors::plan;
use crate::config::Settings;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::identifiers::{IdentifierSet, Mode};
use crate::preflight::{self, process_env, EnvLookup};
use crate::privacy::Redactor;
use crate::report::{render_summary, RunResult, SummaryHeader, SUMMARY_FILE};
use crate::runner::CommandRunner;

/// Orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    EnvCheck,
    Running,
    Summarizing,
    Archiving,
    Done,
    Fatal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "START",
            Phase::EnvCheck => "ENV_CHECK",
            Phase::Running => "RUNNING",
            Phase::Summarizing => "SUMMARIZING",
            Phase::Archiving => "ARCHIVING",
            Phase::Done => "DONE",
            Phase::Fatal => "FATAL",
        };
        f.pad(name)
    }
}

/// What to collect and where.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: Mode,
    pub ids: IdentifierSet,
    /// Directory the bundle is created in.
    pub output_dir: PathBuf,
    /// Archive even if the settings do not ask for it.
    pub archive: bool,
}

/// Result of the archiving step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveStatus {
    NotRequested,
    Written(ArchiveOutcome),
    /// Archiving failed; the bundle is untouched.
    Failed(String),
}

/// A completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub bundle: PathBuf,
    pub summary_path: PathBuf,
    pub results: Vec<RunResult>,
    pub archive: ArchiveStatus,
}

/// Drives one collection run over a [`CommandRunner`].
pub struct Orchestrator<R: CommandRunner> {
    runner: R,
    settings: Settings,
    env: Box<EnvLookup>,
}

impl<R: CommandRunner> Orchestrator<R> {
    pub fn new(runner: R, settings: Settings) -> Self {
        Self {
            runner,
            settings,
            env: Box::new(process_env),
        }
    }

    /// Replace the environment used for credential checks.
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(env);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Execute a run.
    ///
    /// Returns `Err` only for problems found before collection starts
    /// (invalid identifiers or settings, failed environment check) or when
    /// the bundle directory itself cannot be created or summarized.
    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        let RunOptions {
            mode,
            ids,
            output_dir,
            archive,
        } = options;
        enter(Phase::Start);

        ids.validate(mode)?;
        let redactor = Redactor::new(self.settings.redaction.clone())?;

        enter(Phase::EnvCheck);
        if let Err(e) =
            preflight::check(&self.runner, &self.settings, mode, &ids, self.env.as_ref()).await
        {
            enter(Phase::Fatal);
            return Err(e);
        }

        enter(Phase::Running);
        let started = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let bundle = output_dir.join(bundle_name(&self.settings.output_prefix, started));
        fs::create_dir_all(&bundle).map_err(|e| Error::io(&bundle, e))?;
        info!("Collecting into {} (mode: {}, {})", bundle.display(), mode, ids);

        let writer = ArtifactWriter::new(&bundle).with_redactor(redactor);
        let planned = plan(mode, &ids);
        let results = Engine::new(&self.runner, &writer, &ids, self.settings.command_timeout())
            .execute(&planned)
            .await;

        enter(Phase::Summarizing);
        let header = SummaryHeader {
            generated_at: started,
            run_id: &run_id,
            mode,
            ids: &ids,
        };
        let summary = writer.write_root_file(SUMMARY_FILE, &render_summary(&header, &results))?;

        let archive = if archive || self.settings.archive {
            enter(Phase::Archiving);
            let path = archive_path_for(&bundle);
            match zip_directory(&bundle, &path) {
                Ok(outcome) => {
                    info!("Archive written to {}", outcome.path.display());
                    ArchiveStatus::Written(outcome)
                }
                Err(e) => {
                    warn!("Archiving failed, bundle kept at {}: {}", bundle.display(), e);
                    ArchiveStatus::Failed(e.to_string())
                }
            }
        } else {
            ArchiveStatus::NotRequested
        };

        enter(Phase::Done);
        Ok(RunReport {
            run_id,
            bundle,
            summary_path: summary.path,
            results,
            archive,
        })
    }
}

fn enter(phase: Phase) {
    debug!("phase: {}", phase);
}

/// `<prefix>-YYYYmmdd-HHMMSS`, in UTC.
pub fn bundle_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", prefix, at.format("%Y%m%d-%H%M%S"))
}
