//! CLI command definitions and argument parsing.

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::identifiers::{IdentifierSet, Mode};

/// OpenStack diagnostic collector.
///
/// Gathers resource descriptions, events, service health and (when a
/// namespace is given) pod logs into a timestamped bundle directory.
#[derive(Parser, Debug)]
#[command(name = "osdebug")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (can be repeated for more verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file
    #[arg(long, global = true, env = "OSDEBUG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect a diagnostic bundle
    Collect(CollectArgs),

    /// Show which collectors would run, without contacting any backend
    Plan(TargetArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Deployment mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// OpenStack CLI plus kubectl against the control-plane namespace
    Full,
    /// OpenStack CLI only
    Restricted,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Full => Mode::Full,
            ModeArg::Restricted => Mode::Restricted,
        }
    }
}

/// Identifiers selecting what to collect.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Deployment mode (default: full with --namespace, restricted otherwise)
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Namespace hosting the control-plane pods (full mode)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Server ID or name
    #[arg(long)]
    pub vm: Option<String>,

    /// Stack ID or name
    #[arg(long)]
    pub stack: Option<String>,

    /// User ID or name
    #[arg(long)]
    pub user: Option<String>,

    /// Volume ID
    #[arg(long)]
    pub volume: Option<String>,

    /// Port ID
    #[arg(long)]
    pub port: Option<String>,

    /// Network ID
    #[arg(long)]
    pub network: Option<String>,
}

impl TargetArgs {
    pub fn mode(&self) -> Mode {
        match self.mode {
            Some(mode) => mode.into(),
            None if self.namespace.is_some() => Mode::Full,
            None => Mode::Restricted,
        }
    }

    pub fn identifiers(&self) -> IdentifierSet {
        IdentifierSet {
            vm: self.vm.clone(),
            stack: self.stack.clone(),
            user: self.user.clone(),
            volume: self.volume.clone(),
            port: self.port.clone(),
            network: self.network.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Arguments for the collect command.
#[derive(Args, Debug)]
pub struct CollectArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Directory the bundle is created in
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Write <bundle>.zip next to the bundle
    #[arg(long)]
    pub zip: bool,

    /// Per-command timeout in seconds (0 disables it)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Redact IP/MAC addresses and tokens in artifacts
    #[arg(long)]
    pub redact: bool,

    /// OpenStack CLI program
    #[arg(long, value_name = "PATH")]
    pub openstack_bin: Option<String>,

    /// kubectl program
    #[arg(long, value_name = "PATH")]
    pub kubectl_bin: Option<String>,

    /// Kubeconfig for kubectl
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,
}
