//! The convergence monitor (spec component C7).
//!
//! Polls the GitOps controller (`argocd`) for the state of every discovered
//! `Application`, growing the `known` set as app-of-apps children are
//! observed, until every known Application is `(Synced, Healthy)`, the
//! overall deadline elapses, or an Application is judged `stuck`.
//!
//! Concurrency follows the rest of this crate's synchronous, subprocess-
//! oriented style: a small scoped pool of OS threads per tick, not an async
//! runtime. The tick loop itself is sequential — the next tick starts only
//! after the current one's results are aggregated and reported.

use crate::cancel::CancellationToken;
use crate::command_runner::{CommandRunner, CommandSpec};
use crate::error::NimbusError;
use crate::output::Reporter;
use rand::Rng;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{mpsc, Mutex};
use std::time::{Duration, Instant};

/// Upper bound on concurrent `argocd app get` calls within one tick.
const WORKER_POOL_SIZE: usize = 8;
const PER_CALL_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TICK: Duration = Duration::from_secs(3);
const TICK_JITTER_FRACTION: f64 = 0.10;
const STUCK_TICK_THRESHOLD: u32 = 5;
const TRANSIENT_BACKOFF_CAP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Synced,
    OutOfSync,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Progressing,
    Degraded,
    Missing,
    Suspended,
    Unknown,
}

impl SyncState {
    fn parse(raw: &str) -> Self {
        match raw {
            "Synced" => SyncState::Synced,
            "OutOfSync" => SyncState::OutOfSync,
            _ => SyncState::Unknown,
        }
    }
}

impl HealthState {
    fn parse(raw: &str) -> Self {
        match raw {
            "Healthy" => HealthState::Healthy,
            "Progressing" => HealthState::Progressing,
            "Degraded" => HealthState::Degraded,
            "Missing" => HealthState::Missing,
            "Suspended" => HealthState::Suspended,
            _ => HealthState::Unknown,
        }
    }

    fn is_stuck_candidate(&self) -> bool {
        matches!(self, HealthState::Degraded | HealthState::Missing)
    }
}

#[derive(Debug, Clone)]
pub struct ApplicationState {
    pub name: String,
    pub sync: SyncState,
    pub health: HealthState,
    pub message: String,
}

impl ApplicationState {
    pub fn converged(&self) -> bool {
        self.sync == SyncState::Synced && self.health == HealthState::Healthy
    }

    fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sync: SyncState::Unknown,
            health: HealthState::Unknown,
            message: "not yet observed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConvergenceSnapshot {
    pub applications: Vec<ApplicationState>,
}

impl ConvergenceSnapshot {
    pub fn fraction_converged(&self) -> f64 {
        if self.applications.is_empty() {
            return 0.0;
        }
        let converged = self.applications.iter().filter(|app| app.converged()).count();
        converged as f64 / self.applications.len() as f64
    }
}

#[derive(Debug, Clone)]
pub enum ConvergenceOutcome {
    Ok,
    Timeout(ConvergenceSnapshot),
    Stuck {
        app: String,
        message: String,
        snapshot: ConvergenceSnapshot,
    },
}

#[derive(Debug, Deserialize)]
struct ArgoResource {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArgoSync {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ArgoHealth {
    status: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ArgoStatus {
    sync: Option<ArgoSync>,
    health: Option<ArgoHealth>,
    #[serde(default)]
    resources: Vec<ArgoResource>,
}

#[derive(Debug, Deserialize)]
struct ArgoMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArgoApp {
    metadata: ArgoMetadata,
    status: Option<ArgoStatus>,
}

/// One app's state plus the child Application names discovered in its
/// `status.resources` list (an app-of-apps pattern: a parent's resources
/// include entries of `kind: Application` for each child it owns).
struct Observation {
    state: ApplicationState,
    children: Vec<String>,
}

fn fetch_application(
    runner: &dyn CommandRunner,
    kubeconfig: &Path,
    name: &str,
) -> Result<Observation, NimbusError> {
    let spec = CommandSpec::new("argocd", "argocd")
        .args(["app", "get", name, "--kubeconfig"].map(str::to_string))
        .host_path_arg(kubeconfig.display().to_string())
        .args(["-o", "json"].map(str::to_string))
        .timeout(PER_CALL_TIMEOUT);

    let result = runner.run(&spec)?;
    if !result.success() {
        return Err(NimbusError::TransientNetwork(format!(
            "argocd app get {name}: {}",
            result.stderr_str()
        )));
    }

    let app: ArgoApp = serde_json::from_slice(&result.stdout)
        .map_err(|err| NimbusError::TransientNetwork(format!("parsing application '{name}': {err}")))?;

    let status = app.status.unwrap_or(ArgoStatus {
        sync: None,
        health: None,
        resources: Vec::new(),
    });

    let sync = status.sync.map(|s| SyncState::parse(&s.status)).unwrap_or(SyncState::Unknown);
    let (health, message) = status
        .health
        .map(|h| (HealthState::parse(&h.status), h.message))
        .unwrap_or((HealthState::Unknown, String::new()));

    let children = status
        .resources
        .into_iter()
        .filter(|resource| resource.kind == "Application")
        .map(|resource| resource.name)
        .collect();

    Ok(Observation {
        state: ApplicationState {
            name: app.metadata.name,
            sync,
            health,
            message,
        },
        children,
    })
}

/// Runs one tick: fetches every name in `known` through a bounded pool of at
/// most [`WORKER_POOL_SIZE`] worker threads pulling from a shared queue,
/// returning one result per input name (order not preserved). Failures are
/// reported to the caller by omission — the caller retains the prior
/// observation and backs off before the next tick, per the spec's
/// transient-error policy.
fn run_tick(
    runner: &dyn CommandRunner,
    kubeconfig: &Path,
    known: &[String],
) -> Vec<Result<Observation, NimbusError>> {
    let queue = Mutex::new(known.to_vec());
    let worker_count = WORKER_POOL_SIZE.min(known.len().max(1));
    let (tx, rx) = mpsc::channel();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let tx = tx.clone();
            let queue = &queue;
            scope.spawn(move || loop {
                let name = {
                    let mut guard = queue.lock().unwrap();
                    guard.pop()
                };
                let Some(name) = name else { break };
                let outcome = fetch_application(runner, kubeconfig, &name);
                if tx.send(outcome).is_err() {
                    break;
                }
            });
        }
        drop(tx);
    });

    rx.into_iter().collect()
}

fn jittered_tick(base: Duration) -> Duration {
    let jitter = base.as_secs_f64() * TICK_JITTER_FRACTION;
    let offset = rand::thread_rng().gen_range(-jitter..=jitter);
    Duration::from_secs_f64((base.as_secs_f64() + offset).max(0.1))
}

/// Waits for every Application reachable from `entry` to become
/// `(Synced, Healthy)`, or returns `timeout`/`stuck` with a diagnostic
/// snapshot. A zero `deadline` returns `timeout` immediately with an empty
/// snapshot and issues no requests.
pub fn wait_for_convergence(
    runner: &dyn CommandRunner,
    reporter: &Reporter,
    cancel: &CancellationToken,
    kubeconfig: &Path,
    entry: &str,
    deadline: Duration,
    verbose: bool,
) -> Result<ConvergenceOutcome, NimbusError> {
    reporter.set_state("await_convergence");

    if deadline.is_zero() {
        return Ok(ConvergenceOutcome::Timeout(ConvergenceSnapshot::default()));
    }

    let deadline_at = Instant::now() + deadline;
    let mut known: Vec<String> = vec![entry.to_string()];
    let mut seen: HashSet<String> = known.iter().cloned().collect();
    let mut states: HashMap<String, ApplicationState> = HashMap::new();
    let mut stuck_tracker: HashMap<String, (HealthState, String, u32)> = HashMap::new();
    let mut backoff = Duration::from_secs(1);

    loop {
        cancel.check()?;
        if Instant::now() >= deadline_at {
            reporter.warn("convergence deadline reached");
            return Ok(ConvergenceOutcome::Timeout(snapshot_of(&known, &states)));
        }

        reporter.start_step(&format!("poll {} application(s)", known.len()));
        let observations = run_tick(runner, kubeconfig, &known);

        let mut any_transient = false;
        let mut discovered_new = false;

        for observation in observations {
            match observation {
                Ok(obs) => {
                    states.insert(obs.state.name.clone(), obs.state.clone());
                    for child in obs.children {
                        if seen.insert(child.clone()) {
                            known.push(child);
                            discovered_new = true;
                        }
                    }
                }
                Err(_) => any_transient = true,
            }
        }

        if any_transient {
            reporter.warn("transient error listing applications; retrying with backoff");
            cancel.check()?;
            std::thread::sleep(backoff.min(TRANSIENT_BACKOFF_CAP));
            backoff = (backoff * 2).min(TRANSIENT_BACKOFF_CAP);
            continue;
        }
        backoff = Duration::from_secs(1);

        let snapshot = snapshot_of(&known, &states);
        let fraction = snapshot.fraction_converged();
        reporter.gauge(fraction, &format!("{}/{} converged", (fraction * known.len() as f64).round() as usize, known.len()));
        if verbose {
            let rows: Vec<Vec<String>> = snapshot
                .applications
                .iter()
                .map(|app| {
                    vec![
                        app.name.clone(),
                        format!("{:?}", app.sync),
                        format!("{:?}", app.health),
                        app.message.clone(),
                    ]
                })
                .collect();
            reporter.table(&["application", "sync", "health", "message"], &rows);
        }
        reporter.succeed(&format!("{:.0}% converged", fraction * 100.0));

        if snapshot.applications.iter().all(|app| app.converged()) && !snapshot.applications.is_empty() {
            return Ok(ConvergenceOutcome::Ok);
        }

        if discovered_new {
            stuck_tracker.clear();
        } else {
            for app in &snapshot.applications {
                if app.health.is_stuck_candidate() {
                    let entry = stuck_tracker
                        .entry(app.name.clone())
                        .or_insert((app.health, app.message.clone(), 0));
                    if entry.0 == app.health && entry.1 == app.message {
                        entry.2 += 1;
                    } else {
                        *entry = (app.health, app.message.clone(), 1);
                    }
                    if entry.2 >= STUCK_TICK_THRESHOLD {
                        return Ok(ConvergenceOutcome::Stuck {
                            app: app.name.clone(),
                            message: app.message.clone(),
                            snapshot,
                        });
                    }
                } else {
                    stuck_tracker.remove(&app.name);
                }
            }
        }

        cancel.check()?;
        std::thread::sleep(jittered_tick(DEFAULT_TICK).min(deadline_at.saturating_duration_since(Instant::now())));
    }
}

fn snapshot_of(known: &[String], states: &HashMap<String, ApplicationState>) -> ConvergenceSnapshot {
    ConvergenceSnapshot {
        applications: known
            .iter()
            .map(|name| states.get(name).cloned().unwrap_or_else(|| ApplicationState::unknown(name)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::RunLedger;
    use crate::output::{LineSink, Reporter};
    use crate::testutil::{ScriptedResponse, ScriptedRunner};

    fn reporter() -> (Reporter, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RunLedger::create(dir.path().join("ledger.jsonl")).unwrap();
        (Reporter::new(Box::new(LineSink), ledger), dir)
    }

    fn healthy_synced_app(name: &str) -> String {
        format!(
            r#"{{"metadata":{{"name":"{name}"}},"status":{{"sync":{{"status":"Synced"}},"health":{{"status":"Healthy"}},"resources":[]}}}}"#
        )
    }

    #[test]
    fn zero_deadline_times_out_immediately_with_no_requests() {
        let runner = ScriptedRunner::new();
        let (reporter, _dir) = reporter();
        let cancel = CancellationToken::new();
        let result = wait_for_convergence(
            &runner,
            &reporter,
            &cancel,
            Path::new("/tmp/kubeconfig"),
            "root",
            Duration::ZERO,
            false,
        )
        .unwrap();
        assert!(matches!(result, ConvergenceOutcome::Timeout(snapshot) if snapshot.applications.is_empty()));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn converges_once_entry_app_is_synced_and_healthy() {
        let runner = ScriptedRunner::new();
        runner.script(
            "argocd app get root --kubeconfig /tmp/kubeconfig -o json",
            ScriptedResponse::ok(healthy_synced_app("root").into_bytes()),
        );
        let (reporter, _dir) = reporter();
        let cancel = CancellationToken::new();
        let result = wait_for_convergence(
            &runner,
            &reporter,
            &cancel,
            Path::new("/tmp/kubeconfig"),
            "root",
            Duration::from_secs(10),
            false,
        )
        .unwrap();
        assert!(matches!(result, ConvergenceOutcome::Ok));
    }

    #[test]
    fn cancellation_is_honored_before_the_first_tick() {
        let runner = ScriptedRunner::new();
        let (reporter, _dir) = reporter();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = wait_for_convergence(
            &runner,
            &reporter,
            &cancel,
            Path::new("/tmp/kubeconfig"),
            "root",
            Duration::from_secs(10),
            false,
        );
        assert!(matches!(result, Err(NimbusError::Canceled)));
    }

    #[test]
    fn discovers_child_applications_from_resources() {
        let runner = ScriptedRunner::new();
        runner.script(
            "argocd app get root --kubeconfig /tmp/kubeconfig -o json",
            ScriptedResponse::ok(
                br#"{"metadata":{"name":"root"},"status":{"sync":{"status":"Synced"},"health":{"status":"Healthy"},"resources":[{"kind":"Application","name":"infra"}]}}"#
                    .to_vec(),
            ),
        );
        runner.script(
            "argocd app get infra --kubeconfig /tmp/kubeconfig -o json",
            ScriptedResponse::ok(healthy_synced_app("infra").into_bytes()),
        );
        let (reporter, _dir) = reporter();
        let cancel = CancellationToken::new();
        let result = wait_for_convergence(
            &runner,
            &reporter,
            &cancel,
            Path::new("/tmp/kubeconfig"),
            "root",
            Duration::from_secs(10),
            false,
        )
        .unwrap();
        assert!(matches!(result, ConvergenceOutcome::Ok));
        assert!(runner.calls().iter().any(|c| c.contains("infra")));
    }

    #[test]
    fn fraction_converged_is_zero_for_empty_snapshot() {
        let snapshot = ConvergenceSnapshot::default();
        assert_eq!(snapshot.fraction_converged(), 0.0);
    }

    #[test]
    fn health_state_parses_known_values() {
        assert_eq!(HealthState::parse("Degraded"), HealthState::Degraded);
        assert_eq!(HealthState::parse("nonsense"), HealthState::Unknown);
        assert!(HealthState::Degraded.is_stuck_candidate());
        assert!(!HealthState::Healthy.is_stuck_candidate());
    }
}
