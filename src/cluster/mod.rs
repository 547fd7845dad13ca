//! The cluster lifecycle engine (spec component C5).
//!
//! The cluster provisioner (`k3d`) is treated as an opaque subprocess: this
//! module shells out to it and parses its JSON/text output rather than
//! linking a client library, the same idiom this crate uses everywhere else
//! it talks to an external tool.

mod spec;

pub use spec::{ClusterHandle, ClusterListEntry, ClusterSpec, ClusterStatus, ClusterStatusReport};

use crate::command_runner::{CommandRunner, CommandSpec, OutputMode};
use crate::config::validate_cluster_name;
use crate::error::NimbusError;
use crate::output::Reporter;
use chrono::Utc;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const PROVISIONER: &str = "k3d";
const API_READY_DEADLINE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Deserialize)]
struct ProvisionerClusterEntry {
    name: String,
    #[serde(default)]
    #[serde(rename = "serversRunning")]
    servers_running: u32,
    #[serde(default)]
    #[serde(rename = "serversCount")]
    servers_count: u32,
    #[serde(default)]
    #[serde(rename = "agentsCount")]
    agents_count: u32,
}

fn list_raw(runner: &dyn CommandRunner) -> Result<Vec<ProvisionerClusterEntry>, NimbusError> {
    let out = runner.run(&CommandSpec::new(
        PROVISIONER,
        PROVISIONER,
    ).args(["cluster", "list", "--output", "json"].map(str::to_string)))?;

    if !out.success() {
        return Err(NimbusError::ClusterProvisioner(out.stderr_str().to_string()));
    }

    serde_json::from_slice(&out.stdout)
        .map_err(|err| NimbusError::ClusterProvisioner(format!("parsing cluster list: {err}")))
}

pub fn list(runner: &dyn CommandRunner) -> Result<Vec<ClusterListEntry>, NimbusError> {
    let entries = list_raw(runner)?;
    Ok(entries
        .into_iter()
        .map(|entry| ClusterListEntry {
            name: entry.name,
            status: if entry.servers_running >= entry.servers_count && entry.servers_count > 0 {
                ClusterStatus::Running
            } else if entry.servers_running > 0 {
                ClusterStatus::Degraded
            } else {
                ClusterStatus::Stopped
            },
            nodes: entry.servers_count + entry.agents_count,
            age: None,
        })
        .collect())
}

fn exists(runner: &dyn CommandRunner, name: &str) -> Result<bool, NimbusError> {
    Ok(list(runner)?.iter().any(|entry| entry.name == name))
}

/// Creates a cluster, polling the API endpoint until reachable or the
/// deadline elapses. `state_dir` is the per-run directory this engine owns
/// for its temp provisioner config and kube-config fragment.
pub fn create(
    runner: &dyn CommandRunner,
    reporter: &Reporter,
    state_dir: &Path,
    spec: &ClusterSpec,
) -> Result<ClusterHandle, NimbusError> {
    validate_cluster_name(&spec.name)?;
    reporter.set_state("create_cluster");

    reporter.start_step("check for existing cluster");
    if exists(runner, &spec.name)? {
        reporter.fail(&format!("cluster '{}' already exists", spec.name));
        return Err(NimbusError::ClusterNameConflict(spec.name.clone()));
    }
    reporter.succeed("no conflicting cluster");

    std::fs::create_dir_all(state_dir)?;
    let config_path = state_dir.join(format!("{}-provisioner.yaml", spec.name));
    std::fs::write(&config_path, render_provisioner_config(spec))?;

    reporter.start_step(&format!("create cluster '{}'", spec.name));
    let mut create_spec = CommandSpec::new(PROVISIONER, PROVISIONER)
        .args(["cluster", "create", spec.name.as_str(), "--config"].map(str::to_string))
        .host_path_arg(config_path.display().to_string())
        .arg("--wait");
    if let Some(version) = &spec.k8s_version {
        create_spec = create_spec.args([String::from("--image"), format!("rancher/k3s:{version}")]);
    }
    let create_spec = create_spec
        .mode(OutputMode::StreamAndCapture)
        .timeout(API_READY_DEADLINE);
    let out = runner.run(&create_spec)?;

    if !out.success() {
        let stderr = out.stderr_str().to_string();
        if let Some(port) = parse_port_in_use(&stderr) {
            reporter.fail(&format!("port {port} is already in use"));
            return Err(NimbusError::ClusterPortInUse(port));
        }
        reporter.fail(&stderr);
        return Err(NimbusError::ClusterProvisioner(stderr));
    }
    reporter.succeed("provisioner reported success");

    reporter.start_step("wait for API endpoint");
    let endpoint = resolve_api_endpoint(runner, &spec.name)?;
    wait_for_api(runner, &endpoint)?;
    reporter.succeed(&endpoint);

    reporter.start_step("write kube-config");
    let kubeconfig_path = state_dir.join(format!("{}-kubeconfig", spec.name));
    write_kubeconfig(runner, &spec.name, &kubeconfig_path)?;
    reporter.succeed(&kubeconfig_path.display().to_string());

    Ok(ClusterHandle {
        name: spec.name.clone(),
        api_endpoint: endpoint,
        kubeconfig_path,
        created_at: Utc::now(),
    })
}

fn render_provisioner_config(spec: &ClusterSpec) -> String {
    let mut ports = String::new();
    for port in &spec.port_publish {
        ports.push_str(&format!("  - port: {port}:{port}\n    nodeFilters:\n      - loadbalancer\n"));
    }
    format!(
        "apiVersion: k3d.io/v1alpha5\nkind: Simple\nservers: 1\nagents: {}\nports:\n{}",
        spec.node_count.saturating_sub(1),
        ports
    )
}

fn parse_port_in_use(stderr: &str) -> Option<u16> {
    for line in stderr.lines() {
        if line.to_lowercase().contains("address already in use") || line.to_lowercase().contains("port") && line.to_lowercase().contains("already") {
            for token in line.split(|c: char| !c.is_ascii_digit()) {
                if let Ok(port) = token.parse::<u16>() {
                    if port > 0 {
                        return Some(port);
                    }
                }
            }
        }
    }
    None
}

fn resolve_api_endpoint(runner: &dyn CommandRunner, name: &str) -> Result<String, NimbusError> {
    let out = runner.run(&CommandSpec::new(PROVISIONER, PROVISIONER).args(
        ["cluster", "list", name, "--output", "json"].map(str::to_string),
    ))?;
    if !out.success() {
        return Err(NimbusError::ClusterProvisioner(out.stderr_str().to_string()));
    }
    #[derive(Deserialize)]
    struct Entry {
        #[serde(default)]
        #[serde(rename = "serverPort")]
        server_port: Option<u16>,
    }
    let entries: Vec<Entry> = serde_json::from_slice(&out.stdout).unwrap_or_default();
    let port = entries.first().and_then(|e| e.server_port).unwrap_or(6443);
    Ok(format!("https://127.0.0.1:{port}"))
}

fn wait_for_api(runner: &dyn CommandRunner, endpoint: &str) -> Result<(), NimbusError> {
    let deadline = Instant::now() + API_READY_DEADLINE;
    loop {
        let probe = CommandSpec::new("kubectl", "kubectl")
            .args(["get", "--raw", "/healthz", "--server", endpoint, "--insecure-skip-tls-verify"].map(str::to_string))
            .timeout(Duration::from_secs(5));
        if let Ok(result) = runner.run(&probe) {
            if result.success() {
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            return Err(NimbusError::ClusterApiUnreachable);
        }
        std::thread::sleep(Duration::from_secs(2));
    }
}

fn write_kubeconfig(
    runner: &dyn CommandRunner,
    name: &str,
    destination: &Path,
) -> Result<(), NimbusError> {
    let out = runner.run(&CommandSpec::new(PROVISIONER, PROVISIONER).args(
        ["kubeconfig", "get", name].map(str::to_string),
    ))?;
    if !out.success() {
        return Err(NimbusError::ClusterProvisioner(out.stderr_str().to_string()));
    }
    std::fs::write(destination, &out.stdout)?;
    Ok(())
}

/// Resolves a kubeconfig for an already-running cluster, for commands that
/// operate on one without having just created it (`chart install`, `cluster
/// status --detailed`). Honors a `KUBECONFIG` override first, the same as
/// `kubectl` itself does, and only falls back to asking the provisioner when
/// that's unset.
pub fn kubeconfig_for(
    runner: &dyn CommandRunner,
    state_dir: &Path,
    name: &str,
) -> Result<PathBuf, NimbusError> {
    if let Ok(path) = std::env::var("KUBECONFIG") {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    std::fs::create_dir_all(state_dir)?;
    let destination = state_dir.join(format!("{name}-kubeconfig"));
    write_kubeconfig(runner, name, &destination)?;
    Ok(destination)
}

/// Deletes a cluster. Idempotent: a missing cluster is a success with an
/// informational step, not an error.
pub fn delete(runner: &dyn CommandRunner, reporter: &Reporter, name: &str) -> Result<(), NimbusError> {
    reporter.start_step(&format!("delete cluster '{name}'"));
    if !exists(runner, name)? {
        reporter.skip("cluster not found, nothing to delete");
        return Ok(());
    }
    let out = runner.run(&CommandSpec::new(PROVISIONER, PROVISIONER).args(
        ["cluster", "delete", name].map(str::to_string),
    ))?;
    if out.success() {
        reporter.succeed("deleted");
        Ok(())
    } else {
        let detail = out.stderr_str().to_string();
        reporter.fail(&detail);
        Err(NimbusError::ClusterProvisioner(detail))
    }
}

pub fn status(runner: &dyn CommandRunner, name: &str) -> Result<ClusterStatusReport, NimbusError> {
    let entries = list_raw(runner)?;
    let entry = entries
        .into_iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| NimbusError::Unknown(format!("cluster '{name}' not found")))?;

    let status = if entry.servers_running == 0 {
        ClusterStatus::Stopped
    } else if entry.servers_running >= entry.servers_count {
        ClusterStatus::Running
    } else {
        ClusterStatus::Degraded
    };

    Ok(ClusterStatusReport {
        name: entry.name,
        status,
        node_count: entry.servers_count + entry.agents_count,
        endpoint: resolve_api_endpoint(runner, name).ok(),
        controller_pods_summary: None,
    })
}

/// A stronger delete: removes the cluster plus any per-run artifacts this
/// engine wrote (kube-config fragments, cached provisioner configs) for it.
pub fn cleanup(
    runner: &dyn CommandRunner,
    reporter: &Reporter,
    state_dir: &Path,
    name: &str,
) -> Result<(), NimbusError> {
    delete(runner, reporter, name)?;

    reporter.start_step("remove per-run artifacts");
    let mut removed = 0;
    for suffix in [".yaml", "-kubeconfig"] {
        let path: PathBuf = state_dir.join(format!("{name}-provisioner{suffix}"));
        if path.exists() {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
        let alt = state_dir.join(format!("{name}{suffix}"));
        if alt.exists() {
            std::fs::remove_file(&alt)?;
            removed += 1;
        }
    }
    reporter.succeed(&format!("{removed} artifact(s) removed"));
    Ok(())
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

    #[test]
    fn create_fails_on_name_conflict() {
        let runner = ScriptedRunner::new();
        runner.script(
            "k3d cluster list --output json",
            ScriptedResponse::ok(br#"[{"name":"demo-1","serversRunning":1,"serversCount":1,"agentsCount":0}]"#.to_vec()),
        );
        let (reporter, dir) = reporter();
        let spec = ClusterSpec {
            name: "demo-1".to_string(),
            node_count: 1,
            k8s_version: None,
            port_publish: vec![],
            local_registry: false,
        };
        let result = create(&runner, &reporter, dir.path(), &spec);
        assert!(matches!(result, Err(NimbusError::ClusterNameConflict(_))));
    }

    #[test]
    fn delete_is_idempotent_when_cluster_missing() {
        let runner = ScriptedRunner::new();
        runner.script(
            "k3d cluster list --output json",
            ScriptedResponse::ok(b"[]".to_vec()),
        );
        let (reporter, _dir) = reporter();
        let result = delete(&runner, &reporter, "ghost");
        assert!(result.is_ok());
    }

    #[test]
    fn parses_port_in_use_from_stderr() {
        let stderr = "Error: failed to create cluster: port 6443 is already in use (address already in use)";
        assert_eq!(parse_port_in_use(stderr), Some(6443));
    }

    #[test]
    fn list_maps_provisioner_entries_to_status() {
        let runner = ScriptedRunner::new();
        runner.script(
            "k3d cluster list --output json",
            ScriptedResponse::ok(
                br#"[{"name":"demo-1","serversRunning":1,"serversCount":1,"agentsCount":2},{"name":"demo-2","serversRunning":0,"serversCount":1,"agentsCount":0}]"#
                    .to_vec(),
            ),
        );
        let entries = list(&runner).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, ClusterStatus::Running);
        assert_eq!(entries[0].nodes, 3);
        assert_eq!(entries[1].status, ClusterStatus::Stopped);
    }
}
