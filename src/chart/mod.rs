//! The GitOps controller and root-application engine (spec component C6).
//!
//! The controller (`argocd`) and the Kubernetes client (`kubectl`) are both
//! opaque subprocesses here, exactly as the cluster engine treats `k3d`.
//! Registration is idempotent: re-running `chart install` against an
//! existing root application applies the same manifest again rather than
//! erroring.

pub mod git;

use crate::command_runner::{CommandRunner, CommandSpec};
use crate::config::{DeploymentMode, RunConfig};
use crate::error::NimbusError;
use crate::output::{Confirmer, Reporter};
use std::path::Path;

const CONTROLLER_NAMESPACE: &str = "argocd";
const CONTROLLER_INSTALL_MANIFEST: &str =
    "https://raw.githubusercontent.com/argoproj/argo-cd/stable/manifests/install.yaml";

#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub repo_url: String,
    pub revision: String,
    pub deployment_mode: DeploymentMode,
    pub values_yaml: String,
}

/// Resolves the values document from, in order of precedence: an explicit
/// CLI value (not modeled here, applied by the command layer before this is
/// called), an on-disk values file, an interactive wizard, then built-in
/// defaults. Rendered exactly once; nothing downstream re-resolves it.
pub fn resolve_values(
    config: &RunConfig,
    confirmer: &dyn Confirmer,
) -> Result<String, NimbusError> {
    if let Some(path) = &config.values_file {
        return std::fs::read_to_string(path)
            .map_err(|err| NimbusError::Usage(format!("reading values file {}: {err}", path.display())));
    }

    if let Some(mode) = config.deployment_mode {
        return Ok(default_values_for(mode));
    }

    if config.interactive {
        let options = vec![
            DeploymentMode::OssTenant.as_str().to_string(),
            DeploymentMode::SaasTenant.as_str().to_string(),
            DeploymentMode::SaasShared.as_str().to_string(),
        ];
        let chosen = confirmer
            .select_one("deployment mode?", &options)
            .unwrap_or_else(|| DeploymentMode::OssTenant.as_str().to_string());
        let mode = match chosen.as_str() {
            "saas-tenant" => DeploymentMode::SaasTenant,
            "saas-shared" => DeploymentMode::SaasShared,
            _ => DeploymentMode::OssTenant,
        };
        return Ok(default_values_for(mode));
    }

    Err(NimbusError::Usage(
        "no values source resolved: pass --deployment-mode, --values, or run interactively".to_string(),
    ))
}

fn default_values_for(mode: DeploymentMode) -> String {
    format!("deploymentMode: {}\nreplicaCount: 1\n", mode.as_str())
}

/// Installs the GitOps controller into its own namespace via a pinned
/// manifest, then waits for its own deployments to roll out before
/// returning, so `register_root_app` never races an unready API server.
pub fn install_gitops_controller(
    runner: &dyn CommandRunner,
    reporter: &Reporter,
    kubeconfig: &Path,
) -> Result<(), NimbusError> {
    reporter.start_step("create argocd namespace");
    let ns = runner.run(
        &CommandSpec::new("kubectl", "kubectl")
            .args(["create", "namespace", CONTROLLER_NAMESPACE, "--kubeconfig"].map(str::to_string))
            .host_path_arg(kubeconfig.display().to_string())
            .args(["--dry-run=client", "-o", "yaml"].map(str::to_string)),
    )?;
    if !ns.success() {
        reporter.fail(&ns.stderr_str());
        return Err(NimbusError::ChartInstall(format!(
            "rendering namespace manifest: {}",
            ns.stderr_str()
        )));
    }
    let apply_ns = runner.run(
        &CommandSpec::new("kubectl", "kubectl")
            .args(["apply", "--kubeconfig"].map(str::to_string))
            .host_path_arg(kubeconfig.display().to_string())
            .args(["-f", "-"].map(str::to_string))
            .stdin_bytes(ns.stdout.clone()),
    )?;
    if !apply_ns.success() {
        reporter.fail(&apply_ns.stderr_str());
        return Err(NimbusError::ChartInstall(format!(
            "creating namespace: {}",
            apply_ns.stderr_str()
        )));
    }
    reporter.succeed("namespace ready");

    reporter.start_step("install GitOps controller");
    let apply = runner.run(
        &CommandSpec::new("kubectl", "kubectl")
            .args(["apply", "-n", CONTROLLER_NAMESPACE, "--kubeconfig"].map(str::to_string))
            .host_path_arg(kubeconfig.display().to_string())
            .args(["-f", CONTROLLER_INSTALL_MANIFEST].map(str::to_string)),
    )?;
    if !apply.success() {
        let detail = apply.stderr_str().to_string();
        reporter.fail(&detail);
        return Err(NimbusError::ChartInstall(detail));
    }
    reporter.succeed("manifests applied");

    reporter.start_step("wait for controller rollout");
    let rollout = runner.run(
        &CommandSpec::new("kubectl", "kubectl")
            .args(
                [
                    "rollout",
                    "status",
                    "deployment/argocd-server",
                    "-n",
                    CONTROLLER_NAMESPACE,
                    "--kubeconfig",
                ]
                .map(str::to_string),
            )
            .host_path_arg(kubeconfig.display().to_string())
            .arg("--timeout=180s")
            .timeout(std::time::Duration::from_secs(200)),
    )?;
    if !rollout.success() {
        let detail = rollout.stderr_str().to_string();
        reporter.fail(&detail);
        return Err(NimbusError::ChartInstall(format!(
            "controller did not become ready: {detail}"
        )));
    }
    reporter.succeed("controller is ready");

    Ok(())
}

/// Registers (or re-registers) the root Application pointing at the cloned
/// repository. Idempotent per spec §6: if an existing Application already
/// has the same rendered spec, the step is reported `skipped` rather than
/// reapplying it; a differing (or absent) spec is applied as an `update`.
pub fn register_root_app(
    runner: &dyn CommandRunner,
    reporter: &Reporter,
    kubeconfig: &Path,
    spec: &ChartSpec,
) -> Result<(), NimbusError> {
    reporter.start_step("register root application");

    let manifest = render_root_application(spec);

    if existing_matches(runner, kubeconfig, &manifest)? {
        reporter.skip("root application already matches the desired spec");
        return Ok(());
    }

    let apply = runner.run(
        &CommandSpec::new("kubectl", "kubectl")
            .args(["apply", "-n", CONTROLLER_NAMESPACE, "--kubeconfig"].map(str::to_string))
            .host_path_arg(kubeconfig.display().to_string())
            .args(["-f", "-"].map(str::to_string))
            .stdin_bytes(manifest.into_bytes()),
    )?;

    if !apply.success() {
        let detail = apply.stderr_str().to_string();
        reporter.fail(&detail);
        return Err(NimbusError::ChartInstall(detail));
    }
    reporter.succeed("root application registered");
    Ok(())
}

/// Compares the rendered manifest's identifying fields (repo, revision,
/// values) against whatever is already applied, if anything. A missing
/// Application or a `kubectl get` failure (not yet installed, or the
/// controller CRD isn't registered yet) is treated as "does not match" so
/// registration proceeds rather than silently skipping a first install.
fn existing_matches(
    runner: &dyn CommandRunner,
    kubeconfig: &Path,
    rendered: &str,
) -> Result<bool, NimbusError> {
    let get = runner.run(
        &CommandSpec::new("kubectl", "kubectl")
            .args(["get", "application", "root", "-n", CONTROLLER_NAMESPACE, "--kubeconfig"].map(str::to_string))
            .host_path_arg(kubeconfig.display().to_string())
            .args(["-o", "yaml"].map(str::to_string)),
    );
    let Ok(get) = get else { return Ok(false) };
    if !get.success() {
        return Ok(false);
    }
    let existing = String::from_utf8_lossy(&get.stdout);
    Ok(spec_fields(&existing) == spec_fields(rendered))
}

/// Extracts the lines this crate considers part of the Application's
/// identifying spec (everything from `spec:` on), ignoring controller-added
/// status/metadata noise that would otherwise make every comparison differ.
fn spec_fields(manifest: &str) -> Vec<&str> {
    manifest
        .lines()
        .skip_while(|line| *line != "spec:")
        .collect()
}

fn render_root_application(spec: &ChartSpec) -> String {
    let indented_values: String = spec
        .values_yaml
        .lines()
        .map(|line| format!("        {line}\n"))
        .collect();
    format!(
        "apiVersion: argoproj.io/v1alpha1\n\
kind: Application\n\
metadata:\n\
  name: root\n\
  namespace: {ns}\n\
spec:\n\
  project: default\n\
  source:\n\
    repoURL: {repo}\n\
    targetRevision: {rev}\n\
    path: .\n\
    helm:\n\
      valuesObject:\n\
{values}\
  destination:\n\
    server: https://kubernetes.default.svc\n\
    namespace: default\n\
  syncPolicy:\n\
    automated:\n\
      prune: true\n\
      selfHeal: true\n",
        ns = CONTROLLER_NAMESPACE,
        repo = spec.repo_url,
        rev = spec.revision,
        values = indented_values,
    )
}

/// Removes the controller and everything it manages. Cascades through
/// `kubectl delete namespace`, which Kubernetes garbage-collects
/// dependents of, rather than deleting each Application individually.
pub fn uninstall_all(
    runner: &dyn CommandRunner,
    reporter: &Reporter,
    kubeconfig: &Path,
) -> Result<(), NimbusError> {
    reporter.start_step("remove GitOps controller");
    let result = runner.run(
        &CommandSpec::new("kubectl", "kubectl")
            .args(["delete", "namespace", CONTROLLER_NAMESPACE, "--kubeconfig"].map(str::to_string))
            .host_path_arg(kubeconfig.display().to_string())
            .arg("--ignore-not-found"),
    )?;
    if result.success() {
        reporter.succeed("removed");
        Ok(())
    } else {
        let detail = result.stderr_str().to_string();
        reporter.fail(&detail);
        Err(NimbusError::ChartInstall(detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::RunLedger;
    use crate::output::{LineSink, NonInteractiveConfirmer, Reporter};
    use crate::testutil::{ScriptedResponse, ScriptedRunner};
    use std::path::PathBuf;

    fn reporter() -> (Reporter, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RunLedger::create(dir.path().join("ledger.jsonl")).unwrap();
        (Reporter::new(Box::new(LineSink), ledger), dir)
    }

    #[test]
    fn resolve_values_prefers_deployment_mode_over_wizard() {
        let config = RunConfig {
            deployment_mode: Some(DeploymentMode::SaasShared),
            interactive: true,
            ..RunConfig::default()
        };
        let yaml = resolve_values(&config, &NonInteractiveConfirmer).unwrap();
        assert!(yaml.contains("saas-shared"));
    }

    #[test]
    fn resolve_values_errors_non_interactively_with_nothing_resolved() {
        let config = RunConfig {
            interactive: false,
            ..RunConfig::default()
        };
        assert!(resolve_values(&config, &NonInteractiveConfirmer).is_err());
    }

    #[test]
    fn root_application_manifest_embeds_repo_and_revision() {
        let spec = ChartSpec {
            repo_url: "https://example.com/fleet.git".to_string(),
            revision: "main".to_string(),
            deployment_mode: DeploymentMode::OssTenant,
            values_yaml: String::new(),
        };
        let manifest = render_root_application(&spec);
        assert!(manifest.contains("https://example.com/fleet.git"));
        assert!(manifest.contains("targetRevision: main"));
    }

    #[test]
    fn register_root_app_skips_when_existing_spec_matches() {
        let spec = ChartSpec {
            repo_url: "https://example.com/fleet.git".to_string(),
            revision: "main".to_string(),
            deployment_mode: DeploymentMode::OssTenant,
            values_yaml: String::new(),
        };
        let manifest = render_root_application(&spec);
        let runner = ScriptedRunner::new();
        runner.script(
            "kubectl get application root -n argocd --kubeconfig /tmp/kubeconfig -o yaml",
            ScriptedResponse::ok(manifest.into_bytes()),
        );
        let (reporter, _dir) = reporter();
        let result = register_root_app(&runner, &reporter, Path::new("/tmp/kubeconfig"), &spec);
        assert!(result.is_ok());
        assert!(!runner.calls().iter().any(|c| c.contains("apply")));
    }

    #[test]
    fn register_root_app_applies_when_no_existing_application() {
        let spec = ChartSpec {
            repo_url: "https://example.com/fleet.git".to_string(),
            revision: "main".to_string(),
            deployment_mode: DeploymentMode::OssTenant,
            values_yaml: String::new(),
        };
        let runner = ScriptedRunner::new();
        runner.script(
            "kubectl get application root -n argocd --kubeconfig /tmp/kubeconfig -o yaml",
            ScriptedResponse::failure(1, "applications.argoproj.io \"root\" not found"),
        );
        runner.script(
            "kubectl apply -n argocd --kubeconfig /tmp/kubeconfig -f -",
            ScriptedResponse::ok(Vec::new()),
        );
        let (reporter, _dir) = reporter();
        let result = register_root_app(&runner, &reporter, Path::new("/tmp/kubeconfig"), &spec);
        assert!(result.is_ok());
        assert!(runner.calls().iter().any(|c| c.contains("apply")));
    }

    #[test]
    fn uninstall_all_is_ok_when_namespace_already_gone() {
        let runner = ScriptedRunner::new();
        runner.script("kubectl", ScriptedResponse::ok(Vec::new()));
        let (reporter, dir) = reporter();
        let result = uninstall_all(&runner, &reporter, &PathBuf::from(dir.path().join("kubeconfig")));
        assert!(result.is_ok());
    }
}
