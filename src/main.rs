//! osdebug CLI
//!
//! Collects an OpenStack diagnostic bundle for a server, stack, user or
//! control-plane namespace.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use console::style;
use std::io;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use osdebug::{
    cli::{Cli, CollectArgs, Commands, TargetArgs},
    collectors::plan,
    config::{Settings, SettingsLoader},
    orchestrator::{ArchiveStatus, Orchestrator, RunOptions, RunReport},
    report::Totals,
    runner::SystemRunner,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("osdebug={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Collect(args) => run_collect(args, cli.config.as_deref(), cli.quiet).await,
        Commands::Plan(target) => show_plan(&target),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "osdebug", &mut io::stdout());
            Ok(())
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let loader = match path {
        Some(path) => SettingsLoader::new(path),
        None => SettingsLoader::user(),
    };
    loader
        .load()
        .with_context(|| format!("Failed to load configuration from {}", loader.path().display()))
}

/// Run the collect command.
async fn run_collect(args: CollectArgs, config: Option<&Path>, quiet: bool) -> Result<()> {
    let mut settings = load_settings(config)?;

    // Command-line overrides
    if let Some(secs) = args.timeout {
        settings.command_timeout_secs = secs;
    }
    if let Some(program) = args.openstack_bin {
        settings.backends.openstack = program;
    }
    if let Some(program) = args.kubectl_bin {
        settings.backends.kubectl = program;
    }
    if let Some(path) = args.kubeconfig {
        settings.backends.kubeconfig = Some(path);
    }
    if args.redact {
        settings.redaction.enabled = true;
    }
    settings.validate()?;

    let mode = args.target.mode();
    let ids = args.target.identifiers();
    if !quiet {
        eprintln!(
            "{}",
            style(format!("Collecting diagnostics ({} mode, {})...", mode, ids)).cyan()
        );
    }

    let runner = SystemRunner::new(settings.backends.clone());
    let report = Orchestrator::new(runner, settings)
        .run(RunOptions {
            mode,
            ids,
            output_dir: args.output,
            archive: args.zip,
        })
        .await?;

    print_report(&report, quiet);
    Ok(())
}

fn print_report(report: &RunReport, quiet: bool) {
    let totals = Totals::of(&report.results);

    if !quiet {
        println!();
        println!("{}", style("Collection complete").bold().green());
        println!("  Bundle:  {}", report.bundle.display());
        println!("  Summary: {}", report.summary_path.display());
        println!(
            "  Results: {} succeeded, {} skipped, {}",
            style(totals.succeeded).green(),
            style(totals.skipped).dim(),
            if totals.failed > 0 {
                style(format!("{} failed", totals.failed)).red()
            } else {
                style(format!("{} failed", totals.failed)).green()
            }
        );
    }

    match &report.archive {
        ArchiveStatus::NotRequested => {}
        ArchiveStatus::Written(archive) => {
            if !quiet {
                println!("  Archive: {}", archive.path.display());
            }
        }
        ArchiveStatus::Failed(reason) => {
            eprintln!(
                "{} {}",
                style("Archive failed:").yellow().bold(),
                reason
            );
            eprintln!("  The bundle is intact at {}", report.bundle.display());
        }
    }
}

/// Print the ordered plan without contacting any backend.
fn show_plan(target: &TargetArgs) -> Result<()> {
    let mode = target.mode();
    let ids = target.identifiers();
    ids.validate(mode)?;

    println!("{}", style(format!("Plan ({} mode, {})", mode, ids)).bold().cyan());
    println!("{}", style("=".repeat(50)).dim());

    for (index, planned) in plan(mode, &ids).iter().enumerate() {
        let marker = if planned.applicable {
            style("run ").green()
        } else {
            style("skip").dim()
        };
        println!(
            "{:>3}  {}  {:<40} {}",
            index + 1,
            marker,
            planned.spec.label(),
            style(planned.spec.backend).dim()
        );
    }

    Ok(())
}

/// Print an error once, with its hint when it has one.
fn report_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", style("error:").red().bold(), err);
    if let Some(hint) = err
        .downcast_ref::<osdebug::Error>()
        .and_then(osdebug::Error::hint)
    {
        eprintln!("{} {}", style("hint:").yellow(), hint);
    }
}
