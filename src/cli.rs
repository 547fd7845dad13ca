//! Command-line surface (spec component C10, external interfaces).

use crate::config::DeploymentMode;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "nimbus", version, propagate_version = true)]
#[command(about = "Bring a local Kubernetes environment from zero to applications-healthy")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand that drives the orchestrator.
#[derive(Debug, Args, Clone, Default)]
pub struct GlobalArgs {
    /// Run without any interactive prompts; missing required input is an error.
    #[arg(long, env = "NON_INTERACTIVE")]
    pub non_interactive: bool,

    /// Emit full detail: verbose logs, kept temp files, per-app convergence tables.
    #[arg(short, long)]
    pub verbose: bool,

    /// Skip confirmations and proceed past recoverable warnings.
    #[arg(long, env = "FORCE")]
    pub force: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Preflight, create a cluster, install the GitOps controller, and wait
    /// for convergence, in one command.
    Bootstrap(BootstrapArgs),

    /// Manage the lifecycle of a local cluster.
    Cluster(ClusterArgs),

    /// Install the GitOps controller and root application onto an existing cluster.
    Chart(ChartArgs),

    /// Generate a JSON Schema for a configuration type.
    Schema(SchemaArgs),

    /// Generate shell completion scripts.
    Completions(CompletionsArgs),
}

impl Commands {
    /// Whether `--verbose` was passed to whichever subcommand this is.
    /// Consulted once at startup to pick the default log level (spec §11);
    /// `Schema`/`Completions` carry no global flags and are never verbose.
    pub fn verbose(&self) -> bool {
        match self {
            Commands::Bootstrap(args) => args.global.verbose,
            Commands::Cluster(args) => match &args.action {
                ClusterAction::Create(a) => a.global.verbose,
                ClusterAction::Delete(a) | ClusterAction::Cleanup(a) => a.global.verbose,
                ClusterAction::List | ClusterAction::Status(_) => false,
            },
            Commands::Chart(args) => match &args.action {
                ChartAction::Install(a) => a.global.verbose,
            },
            Commands::Schema(_) | Commands::Completions(_) => false,
        }
    }
}

#[derive(Debug, Args)]
pub struct BootstrapArgs {
    /// Cluster name; defaults to "local".
    pub name: Option<String>,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[arg(long, value_enum)]
    pub deployment_mode: Option<DeploymentMode>,

    #[arg(long)]
    pub repo: Option<String>,

    /// Defaults to "main" when neither this flag nor a values file sets it.
    #[arg(long)]
    pub branch: Option<String>,

    #[arg(long)]
    pub values: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ClusterArgs {
    #[command(subcommand)]
    pub action: ClusterAction,
}

#[derive(Debug, Subcommand)]
pub enum ClusterAction {
    Create(ClusterCreateArgs),
    Delete(ClusterTargetArgs),
    List,
    Status(ClusterStatusArgs),
    Cleanup(ClusterTargetArgs),
}

#[derive(Debug, Args)]
pub struct ClusterCreateArgs {
    pub name: Option<String>,

    #[command(flatten)]
    pub global: GlobalArgs,

    /// Defaults to 3 when not set.
    #[arg(long)]
    pub nodes: Option<u32>,

    #[arg(long)]
    pub version: Option<String>,

    #[arg(long)]
    pub skip_wizard: bool,
}

#[derive(Debug, Args)]
pub struct ClusterTargetArgs {
    pub name: Option<String>,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Debug, Args)]
pub struct ClusterStatusArgs {
    pub name: Option<String>,

    #[arg(long)]
    pub detailed: bool,
}

#[derive(Debug, Args)]
pub struct ChartArgs {
    #[command(subcommand)]
    pub action: ChartAction,
}

#[derive(Debug, Subcommand)]
pub enum ChartAction {
    Install(ChartInstallArgs),
}

#[derive(Debug, Args)]
pub struct ChartInstallArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[arg(long, value_enum)]
    pub deployment_mode: Option<DeploymentMode>,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    Nushell,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}
