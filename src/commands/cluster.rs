//! `nimbus cluster create|delete|list|status|cleanup` — direct access to
//! the cluster lifecycle engine (C5) outside of a full bootstrap run.

use crate::cli::{ClusterAction, ClusterArgs, ClusterCreateArgs, ClusterStatusArgs, ClusterTargetArgs};
use crate::cluster::{self, ClusterSpec};
use crate::command_runner::RealCommandRunner;
use crate::error::NimbusError;
use crate::ledger::RunLedger;
use crate::output::Reporter;
use crate::paths;
use crate::platform::HostProfile;
use chrono::Utc;

const DEFAULT_CLUSTER_NAME: &str = "local";

fn scratch_reporter(interactive: bool) -> Result<(Reporter, std::path::PathBuf), NimbusError> {
    let timestamp = paths::new_run_timestamp(Utc::now());
    let state_dir = paths::run_state_dir(&timestamp)?;
    std::fs::create_dir_all(&state_dir)?;
    let ledger = RunLedger::create(paths::ledger_path(&state_dir))?;
    let (sink, _confirmer) = super::presentation(interactive);
    Ok((Reporter::new(sink, ledger), state_dir))
}

pub fn run(args: ClusterArgs) -> Result<(), NimbusError> {
    match args.action {
        ClusterAction::Create(create_args) => create(create_args),
        ClusterAction::Delete(target) => delete(target),
        ClusterAction::List => list(),
        ClusterAction::Status(status_args) => status(status_args),
        ClusterAction::Cleanup(target) => cleanup(target),
    }
}

fn create(args: ClusterCreateArgs) -> Result<(), NimbusError> {
    let interactive = !args.global.non_interactive;
    let (reporter, state_dir) = scratch_reporter(interactive)?;
    let runner = RealCommandRunner::new(HostProfile::detect());

    let spec = ClusterSpec {
        name: args.name.unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string()),
        node_count: args.nodes.unwrap_or(3),
        k8s_version: args.version,
        port_publish: vec![],
        local_registry: false,
    };

    let handle = cluster::create(&runner, &reporter, &state_dir, &spec)?;
    println!("cluster '{}' is ready at {}", handle.name, handle.api_endpoint);
    println!("kubeconfig: {}", handle.kubeconfig_path.display());
    Ok(())
}

fn delete(args: ClusterTargetArgs) -> Result<(), NimbusError> {
    let interactive = !args.global.non_interactive;
    let (reporter, _state_dir) = scratch_reporter(interactive)?;
    let runner = RealCommandRunner::new(HostProfile::detect());
    let name = args.name.unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());
    cluster::delete(&runner, &reporter, &name)
}

fn list() -> Result<(), NimbusError> {
    let runner = RealCommandRunner::new(HostProfile::detect());
    let entries = cluster::list(&runner)?;
    println!("{:<24} {:<10} {:>5} {:>5}", "NAME", "STATUS", "NODES", "AGE");
    for entry in entries {
        let age = entry
            .age
            .map(|d| format!("{}h", d.num_hours()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<10} {:>5} {:>5}",
            entry.name,
            entry.status.as_str(),
            entry.nodes,
            age
        );
    }
    Ok(())
}

fn status(args: ClusterStatusArgs) -> Result<(), NimbusError> {
    let runner = RealCommandRunner::new(HostProfile::detect());
    let name = args.name.unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());
    let report = cluster::status(&runner, &name)?;

    println!("name     : {}", report.name);
    println!("status   : {}", report.status.as_str());
    println!("nodes    : {}", report.node_count);
    if let Some(endpoint) = &report.endpoint {
        println!("endpoint : {endpoint}");
    }
    if args.detailed {
        if let Some(pods) = &report.controller_pods_summary {
            println!("pods     : {pods}");
        } else {
            println!("pods     : unavailable");
        }
    }
    Ok(())
}

fn cleanup(args: ClusterTargetArgs) -> Result<(), NimbusError> {
    let interactive = !args.global.non_interactive;
    let (reporter, state_dir) = scratch_reporter(interactive)?;
    let runner = RealCommandRunner::new(HostProfile::detect());
    let name = args.name.unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());
    cluster::cleanup(&runner, &reporter, &state_dir, &name)
}
