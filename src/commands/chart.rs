//! `nimbus chart install` — runs C6 (and the C7 convergence wait it
//! delegates to) against a cluster that already exists, without going
//! through C4/C5. Takes no cluster name or repo flags: it operates on
//! whatever `KUBECONFIG` points at and the built-in GitOps source, exactly
//! as the spec's command surface for this subcommand describes.

use crate::chart::{self, ChartSpec};
use crate::cli::{ChartAction, ChartArgs, ChartInstallArgs};
use crate::cluster;
use crate::command_runner::RealCommandRunner;
use crate::config::{DeploymentMode, RunConfig, DEFAULT_REPO_URL};
use crate::convergence::{self, ConvergenceOutcome};
use crate::error::NimbusError;
use crate::ledger::RunLedger;
use crate::output::Reporter;
use crate::paths;
use crate::platform::HostProfile;
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;

const ROOT_APPLICATION_NAME: &str = "root";
const DEFAULT_CLUSTER_NAME: &str = "local";

pub fn run(args: ChartArgs) -> Result<(), NimbusError> {
    match args.action {
        ChartAction::Install(install_args) => install(install_args),
    }
}

fn install(args: ChartInstallArgs) -> Result<(), NimbusError> {
    let interactive = !args.global.non_interactive;
    let runner = RealCommandRunner::new(HostProfile::detect());

    let timestamp = paths::new_run_timestamp(Utc::now());
    let state_dir = paths::run_state_dir(&timestamp)?;
    std::fs::create_dir_all(&state_dir)?;
    let ledger = RunLedger::create(paths::ledger_path(&state_dir))?;
    let (sink, confirmer) = super::presentation(interactive);
    let reporter = Reporter::new(sink, ledger);

    let kubeconfig = resolve_kubeconfig(&runner, &state_dir)?;

    let config = RunConfig {
        deployment_mode: args.deployment_mode,
        interactive,
        verbose: args.global.verbose,
        force: args.global.force,
        repo_url: DEFAULT_REPO_URL.to_string(),
        ..RunConfig::default()
    };

    let values = chart::resolve_values(&config, confirmer.as_ref())?;
    let workdir = paths::workdir_path(&state_dir);
    chart::git::clone_repo(&runner, &reporter, &config.repo_url, &config.branch, &workdir)?;

    chart::install_gitops_controller(&runner, &reporter, &kubeconfig)?;

    let chart_spec = ChartSpec {
        repo_url: config.repo_url.clone(),
        revision: config.branch.clone(),
        deployment_mode: config.deployment_mode.unwrap_or(DeploymentMode::OssTenant),
        values_yaml: values,
    };
    chart::register_root_app(&runner, &reporter, &kubeconfig, &chart_spec)?;

    let outcome = convergence::wait_for_convergence(
        &runner,
        &reporter,
        &crate::cancel::CancellationToken::new(),
        &kubeconfig,
        ROOT_APPLICATION_NAME,
        Duration::from_secs(config.convergence_deadline_secs),
        config.verbose,
    )?;

    match outcome {
        ConvergenceOutcome::Ok => {
            println!("chart install converged: all applications are Synced and Healthy");
            Ok(())
        }
        ConvergenceOutcome::Timeout(_) => Err(NimbusError::ConvergenceTimeout),
        ConvergenceOutcome::Stuck { app, message, .. } => Err(NimbusError::ChartStuck { app, message }),
    }
}

/// Resolves the kubeconfig for `chart install`, which runs against a
/// cluster C5 did not just create in this process: `KUBECONFIG` wins if
/// set, otherwise the provisioner is asked for the default cluster's
/// config, matching how `kubectl` itself resolves a config.
fn resolve_kubeconfig(
    runner: &RealCommandRunner,
    state_dir: &std::path::Path,
) -> Result<PathBuf, NimbusError> {
    cluster::kubeconfig_for(runner, state_dir, DEFAULT_CLUSTER_NAME)
}
