//! The bootstrap orchestrator (spec component C8): the top-level state
//! machine driving `nimbus bootstrap` from a validated [`RunConfig`] to a
//! converged, applications-healthy cluster.
//!
//! State machine: `start -> preflight -> create_cluster -> install_controller
//! -> register_root -> await_convergence -> summarize -> end`. Every state
//! is timed independently and the durations, plus any warnings recorded to
//! the run's ledger along the way, surface in the returned [`BootstrapSummary`].
//! A single [`crate::cancel::CancellationToken`] on [`RunContext`] is checked
//! at every state boundary, so a SIGINT lands between states rather than
//! mid-subprocess.

use crate::chart::{self, ChartSpec};
use crate::cluster::{self, ClusterHandle, ClusterSpec};
use crate::config::{DeploymentMode, RunConfig};
use crate::context::RunContext;
use crate::convergence::{self, ConvergenceOutcome};
use crate::error::NimbusError;
use crate::ledger::{Outcome, RunLedger};
use crate::paths;
use crate::preflight::{self, PreflightDecision, PreflightResult};
use std::path::Path;
use std::time::{Duration, Instant};

const ROOT_APPLICATION_NAME: &str = "root";

/// The outcome of a completed `bootstrap` run.
#[derive(Debug, Clone)]
pub struct BootstrapSummary {
    pub cluster_name: String,
    pub kubeconfig_path: std::path::PathBuf,
    pub api_endpoint: String,
    pub state_durations: Vec<(String, Duration)>,
    pub warnings: Vec<String>,
}

/// Accumulates one duration per named state as the orchestrator progresses.
struct Timer {
    durations: Vec<(String, Duration)>,
}

impl Timer {
    fn new() -> Self {
        Self {
            durations: Vec::new(),
        }
    }

    fn time<T>(
        &mut self,
        ctx: &RunContext,
        state: &str,
        f: impl FnOnce() -> Result<T, NimbusError>,
    ) -> Result<T, NimbusError> {
        ctx.reporter.set_state(state);
        ctx.cancel.check()?;
        let start = Instant::now();
        let result = f();
        self.durations.push((state.to_string(), start.elapsed()));
        result
    }
}

/// Runs a full bootstrap to completion or to the first fatal error.
pub fn run_bootstrap(ctx: &RunContext, config: &RunConfig) -> Result<BootstrapSummary, NimbusError> {
    config.validate()?;
    let mut timer = Timer::new();
    let mut cluster_created = false;

    ctx.reporter.set_state("start");
    ctx.cancel.check()?;

    let preflight_result = timer.time(ctx, "preflight", || {
        preflight::run(
            ctx.runner.as_ref(),
            &ctx.host,
            &ctx.reporter,
            ctx.confirmer.as_ref(),
            config,
        )
    })?;
    if !preflight_result.proceeds() {
        return Err(abort_reason_to_error(&preflight_result));
    }

    let cluster_spec = ClusterSpec {
        name: config.cluster_name.clone(),
        node_count: config.node_count,
        k8s_version: config.k8s_version.clone(),
        port_publish: vec![],
        local_registry: false,
    };

    let create_result = timer.time(ctx, "create_cluster", || {
        cluster::create(ctx.runner.as_ref(), &ctx.reporter, &ctx.state_dir, &cluster_spec)
    });
    let handle = match create_result {
        Ok(handle) => handle,
        // The provisioner did create cluster resources before the API failed
        // to come up in time; unlike a name-conflict or a provisioner spawn
        // failure (nothing was ever created), this is the one create_cluster
        // failure mode spec §7 says to roll back.
        Err(err @ NimbusError::ClusterApiUnreachable) => {
            maybe_rollback(ctx, config, true, &config.cluster_name);
            return Err(err);
        }
        Err(err) => return Err(err),
    };
    cluster_created = true;

    let chart_spec = ChartSpec {
        repo_url: config.repo_url.clone(),
        revision: config.branch.clone(),
        deployment_mode: config.deployment_mode.unwrap_or(DeploymentMode::OssTenant),
        values_yaml: chart::resolve_values(config, ctx.confirmer.as_ref())?,
    };
    let workdir = paths::workdir_path(&ctx.state_dir);

    let install_result = timer.time(ctx, "install_controller", || {
        clone_fresh(ctx, config, &workdir)?;
        chart::install_gitops_controller(ctx.runner.as_ref(), &ctx.reporter, &handle.kubeconfig_path)
    });
    if let Err(err) = install_result {
        maybe_rollback(ctx, config, cluster_created, &handle.name);
        return Err(err);
    }

    let register_result = timer.time(ctx, "register_root", || {
        register_root_with_retry(ctx, config, &handle, &chart_spec, &workdir)
    });
    if let Err(err) = register_result {
        maybe_rollback(ctx, config, cluster_created, &handle.name);
        return Err(err);
    }

    let convergence_outcome = timer.time(ctx, "await_convergence", || {
        convergence::wait_for_convergence(
            ctx.runner.as_ref(),
            &ctx.reporter,
            &ctx.cancel,
            &handle.kubeconfig_path,
            ROOT_APPLICATION_NAME,
            Duration::from_secs(config.convergence_deadline_secs),
            ctx.verbose,
        )
    });
    let outcome = match convergence_outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            maybe_rollback(ctx, config, cluster_created, &handle.name);
            return Err(err);
        }
    };
    if let Some(err) = convergence_error(outcome) {
        maybe_rollback(ctx, config, cluster_created, &handle.name);
        return Err(err);
    }

    ctx.reporter.set_state("summarize");
    let warnings = collect_warnings(&ctx.state_dir);
    ctx.reporter.set_state("end");

    Ok(BootstrapSummary {
        cluster_name: handle.name,
        kubeconfig_path: handle.kubeconfig_path,
        api_endpoint: handle.api_endpoint,
        state_durations: timer.durations,
        warnings,
    })
}

fn convergence_error(outcome: ConvergenceOutcome) -> Option<NimbusError> {
    match outcome {
        ConvergenceOutcome::Ok => None,
        ConvergenceOutcome::Timeout(_) => Some(NimbusError::ConvergenceTimeout),
        ConvergenceOutcome::Stuck { app, message, .. } => {
            Some(NimbusError::ChartStuck { app, message })
        }
    }
}

fn clone_fresh(ctx: &RunContext, config: &RunConfig, workdir: &Path) -> Result<(), NimbusError> {
    if workdir.exists() {
        std::fs::remove_dir_all(workdir)?;
    }
    chart::git::clone_repo(
        ctx.runner.as_ref(),
        &ctx.reporter,
        &config.repo_url,
        &config.branch,
        workdir,
    )?;
    Ok(())
}

/// Registers the root application, retrying once with a freshly re-cloned
/// working copy if the first attempt fails with a chart-install error. A
/// stale or partially-written checkout is the only failure mode this retry
/// is meant to paper over; any other error propagates immediately.
fn register_root_with_retry(
    ctx: &RunContext,
    config: &RunConfig,
    handle: &ClusterHandle,
    chart_spec: &ChartSpec,
    workdir: &Path,
) -> Result<(), NimbusError> {
    match chart::register_root_app(
        ctx.runner.as_ref(),
        &ctx.reporter,
        &handle.kubeconfig_path,
        chart_spec,
    ) {
        Ok(()) => Ok(()),
        Err(NimbusError::ChartInstall(detail)) => {
            ctx.reporter
                .info(&format!("retrying chart install after a fresh clone: {detail}"));
            clone_fresh(ctx, config, workdir)?;
            chart::register_root_app(
                ctx.runner.as_ref(),
                &ctx.reporter,
                &handle.kubeconfig_path,
                chart_spec,
            )
        }
        Err(other) => Err(other),
    }
}

/// Deletes the cluster this run created, but only when the failure happened
/// after cluster creation, the run is interactive, and `--force` was not
/// passed — a forced or non-interactive run leaves the cluster in place for
/// the operator to inspect rather than silently tearing it down.
fn maybe_rollback(ctx: &RunContext, config: &RunConfig, cluster_created: bool, cluster_name: &str) {
    if !cluster_created || config.force || !config.interactive {
        return;
    }
    let proceed = ctx.confirmer.confirm(
        &format!("bootstrap failed; delete the cluster '{cluster_name}' created by this run?"),
        true,
    );
    if !proceed {
        return;
    }
    ctx.reporter.set_state("rollback");
    if let Err(err) = cluster::delete(ctx.runner.as_ref(), &ctx.reporter, cluster_name) {
        ctx.reporter.warn(&format!("rollback failed: {err}"));
    }
}

fn abort_reason_to_error(result: &PreflightResult) -> NimbusError {
    let reason = match &result.decision {
        PreflightDecision::Abort(reason) => reason.as_str(),
        PreflightDecision::Proceed => {
            return NimbusError::Unknown("preflight reported proceed but was treated as an abort".to_string())
        }
    };

    if reason == "insufficient-memory" {
        return NimbusError::PreflightMemory {
            available_mb: result.memory.available_mb,
            recommended_mb: result.memory.recommended_mb,
        };
    }
    if reason == "manual-install-required" {
        let tool = result
            .missing_non_installable
            .first()
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        return NimbusError::PreflightInstall {
            tool,
            detail: "manual installation required; see preflight output".to_string(),
        };
    }
    if let Some(tool) = reason.strip_prefix("install-failed:") {
        return NimbusError::PreflightInstall {
            tool: tool.to_string(),
            detail: "installation failed".to_string(),
        };
    }
    if let Some(tool) = reason.strip_prefix("runtime-start-failed:") {
        return NimbusError::PreflightRuntime {
            tool: tool.to_string(),
            detail: "did not become operational within its startup deadline".to_string(),
        };
    }
    if reason == "no-consent" || reason.starts_with("no-consent:") {
        return NimbusError::Usage(format!("preflight aborted: {reason}"));
    }
    NimbusError::Unknown(format!("preflight aborted: {reason}"))
}

fn collect_warnings(state_dir: &Path) -> Vec<String> {
    let path = paths::ledger_path(state_dir);
    RunLedger::read_all(&path)
        .map(|steps| {
            steps
                .into_iter()
                .filter(|step| step.outcome == Some(Outcome::Warn))
                .map(|step| step.detail.unwrap_or(step.label))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_runner::CommandRunner;
    use crate::ledger::RunLedger;
    use crate::output::{LineSink, NonInteractiveConfirmer, Reporter};
    use crate::testutil::{ScriptedResponse, ScriptedRunner};
    use std::sync::Arc;

    fn scripted_environment() -> ScriptedRunner {
        let runner = ScriptedRunner::new();
        for program in ["docker", "podman", "kubectl", "git", "mkcert"] {
            runner.script(program, ScriptedResponse::ok(Vec::new()));
        }
        runner.script("k3d", ScriptedResponse::ok(b"[]".to_vec()));
        runner.script(
            "argocd",
            ScriptedResponse::ok(
                br#"{"metadata":{"name":"root"},"status":{"sync":{"status":"Synced"},"health":{"status":"Healthy"},"resources":[]}}"#
                    .to_vec(),
            ),
        );
        runner
    }

    fn context(runner: ScriptedRunner, state_dir: &Path) -> RunContext {
        let ledger = RunLedger::create(paths::ledger_path(state_dir)).unwrap();
        let reporter = Reporter::new(Box::new(LineSink), ledger);
        let runner: Arc<dyn CommandRunner> = Arc::new(runner);
        RunContext::new(
            |_host| runner,
            reporter,
            Arc::new(NonInteractiveConfirmer),
            state_dir.to_path_buf(),
            false,
        )
    }

    fn happy_config() -> RunConfig {
        RunConfig {
            cluster_name: "demo".to_string(),
            deployment_mode: Some(DeploymentMode::OssTenant),
            interactive: false,
            force: true,
            verbose: false,
            repo_url: "https://example.com/fleet.git".to_string(),
            branch: "main".to_string(),
            node_count: 1,
            k8s_version: None,
            values_file: None,
            convergence_deadline_secs: 5,
        }
    }

    #[test]
    fn full_run_converges_and_reports_every_state() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(scripted_environment(), dir.path());
        let config = happy_config();

        let summary = run_bootstrap(&ctx, &config).unwrap();

        assert_eq!(summary.cluster_name, "demo");
        let state_names: Vec<&str> = summary
            .state_durations
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(
            state_names,
            vec![
                "preflight",
                "create_cluster",
                "install_controller",
                "register_root",
                "await_convergence",
            ]
        );
    }

    #[test]
    fn cancellation_before_preflight_short_circuits_with_no_cluster_created() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(scripted_environment(), dir.path());
        ctx.cancel.cancel();
        let config = happy_config();

        let result = run_bootstrap(&ctx, &config);
        assert!(matches!(result, Err(NimbusError::Canceled)));
    }

    #[test]
    fn cluster_name_conflict_surfaces_without_touching_chart_install() {
        let dir = tempfile::tempdir().unwrap();
        let runner = scripted_environment();
        runner.script(
            "k3d cluster list --output json",
            ScriptedResponse::ok(br#"[{"name":"demo","serversRunning":1,"serversCount":1,"agentsCount":0}]"#.to_vec()),
        );
        let ctx = context(runner, dir.path());
        let config = happy_config();

        let result = run_bootstrap(&ctx, &config);
        assert!(matches!(result, Err(NimbusError::ClusterNameConflict(_))));
    }

    #[test]
    fn rollback_is_skipped_when_force_is_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = happy_config();
        config.force = true;
        config.interactive = true;
        maybe_rollback(&context(scripted_environment(), dir.path()), &config, true, "demo");
        // No scripted response was provided for "k3d cluster delete demo"; a
        // panic or unscripted-call assertion failure here would mean
        // rollback fired despite --force.
    }

    #[test]
    fn preflight_memory_abort_maps_to_preflight_memory_error() {
        let result = PreflightResult {
            missing_installable: vec![],
            missing_runtime_dormant: vec![],
            missing_non_installable: vec![],
            memory: preflight::MemoryReading {
                available_mb: 1000,
                recommended_mb: 24_000,
            },
            decision: PreflightDecision::Abort("insufficient-memory".to_string()),
        };
        assert!(matches!(
            abort_reason_to_error(&result),
            NimbusError::PreflightMemory {
                available_mb: 1000,
                recommended_mb: 24_000
            }
        ));
    }
}
