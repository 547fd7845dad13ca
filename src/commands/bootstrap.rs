//! `nimbus bootstrap` — runs C4 through C8 end to end.

use crate::cli::BootstrapArgs;
use crate::command_runner::RealCommandRunner;
use crate::config::RunConfig;
use crate::context::RunContext;
use crate::error::NimbusError;
use crate::ledger::RunLedger;
use crate::orchestrator::{self, BootstrapSummary};
use crate::output::Reporter;
use crate::paths;
use chrono::Utc;
use std::sync::Arc;

/// Builds a [`RunConfig`] from CLI flags and the spec's built-in defaults.
/// `--non-interactive`/`--force` are already CLI-over-environment merged by
/// `clap`'s `env` attribute on [`crate::cli::GlobalArgs`], so this function
/// only has to apply the defaults layer underneath the flags, matching
/// C10's "CLI flags > environment variables > values file > defaults"
/// precedence.
fn resolve_config(args: &BootstrapArgs) -> RunConfig {
    let mut config = RunConfig {
        cluster_name: args.name.clone().unwrap_or_else(|| "local".to_string()),
        deployment_mode: args.deployment_mode,
        interactive: !args.global.non_interactive,
        force: args.global.force,
        verbose: args.global.verbose,
        values_file: args.values.clone(),
        ..RunConfig::default()
    };
    if let Some(repo) = &args.repo {
        config.repo_url = repo.clone();
    }
    if let Some(branch) = &args.branch {
        config.branch = branch.clone();
    }
    config
}

pub fn run(args: BootstrapArgs) -> Result<(), NimbusError> {
    let config = resolve_config(&args);
    config.validate()?;

    let timestamp = paths::new_run_timestamp(Utc::now());
    let state_dir = paths::run_state_dir(&timestamp)?;
    std::fs::create_dir_all(&state_dir)?;
    std::fs::write(state_dir.join("runconfig.yaml"), config.to_yaml()?)?;

    let (sink, confirmer) = super::presentation(config.interactive);
    let ledger = RunLedger::create(paths::ledger_path(&state_dir))?;
    let reporter = Reporter::new(sink, ledger);

    let ctx = RunContext::new(
        |host| Arc::new(RealCommandRunner::new(host)),
        reporter,
        confirmer,
        state_dir,
        config.verbose,
    );
    ctx.cancel.install_signal_handler()?;

    let summary = orchestrator::run_bootstrap(&ctx, &config)?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &BootstrapSummary) {
    println!();
    println!("bootstrap complete: cluster '{}' is healthy", summary.cluster_name);
    println!("  api endpoint : {}", summary.api_endpoint);
    println!("  kubeconfig   : {}", summary.kubeconfig_path.display());
    println!("  state durations:");
    for (state, duration) in &summary.state_durations {
        println!("    {state:<20} {:>6.1}s", duration.as_secs_f64());
    }
    if !summary.warnings.is_empty() {
        println!("  warnings:");
        for warning in &summary.warnings {
            println!("    - {warning}");
        }
    }
}
