use super::{probe_version, ToolCategory, ToolDescriptor};
use crate::command_runner::{CommandRunner, CommandSpec};
use crate::error::NimbusError;
use crate::platform::HostProfile;
use std::path::PathBuf;

/// The container-runtime requirement is satisfied by either member; see
/// [`ToolDescriptor::runtime_group`].
const RUNTIME_GROUP: Option<&str> = Some("container-runtime");

pub const CATALOG: &[ToolDescriptor] = &[
    ToolDescriptor {
        id: "docker",
        category: ToolCategory::Cluster,
        is_runtime: true,
        installable: true,
        runtime_group: RUNTIME_GROUP,
        manual_help: "install Docker Desktop, or Docker Engine on Linux, from docker.com",
        probe: probe_docker,
        operational_probe: Some(docker_operational),
        installer: install_docker,
    },
    ToolDescriptor {
        id: "podman",
        category: ToolCategory::Cluster,
        is_runtime: true,
        installable: true,
        runtime_group: RUNTIME_GROUP,
        manual_help: "install Podman from podman.io",
        probe: probe_podman,
        operational_probe: Some(podman_operational),
        installer: install_podman,
    },
    ToolDescriptor {
        id: "k3d",
        category: ToolCategory::Cluster,
        is_runtime: false,
        installable: true,
        runtime_group: None,
        manual_help: "install k3d from k3d.io/#installation",
        probe: probe_k3d,
        operational_probe: None,
        installer: install_k3d,
    },
    ToolDescriptor {
        id: "kubectl",
        category: ToolCategory::Cluster,
        is_runtime: false,
        installable: true,
        runtime_group: None,
        manual_help: "install kubectl from kubernetes.io/docs/tasks/tools",
        probe: probe_kubectl,
        operational_probe: None,
        installer: install_kubectl,
    },
    ToolDescriptor {
        id: "argocd",
        category: ToolCategory::Chart,
        is_runtime: false,
        installable: true,
        runtime_group: None,
        manual_help: "install the Argo CD CLI from argo-cd.readthedocs.io/en/stable/cli_installation",
        probe: probe_argocd,
        operational_probe: None,
        installer: install_argocd,
    },
    ToolDescriptor {
        id: "git",
        category: ToolCategory::Chart,
        is_runtime: false,
        installable: false,
        runtime_group: None,
        manual_help: "install git via your platform's package manager; nimbus never installs it automatically",
        probe: probe_git,
        operational_probe: None,
        installer: never_install,
    },
    ToolDescriptor {
        id: "mkcert",
        category: ToolCategory::Chart,
        is_runtime: false,
        installable: true,
        runtime_group: None,
        manual_help: "install mkcert from github.com/FiloSottile/mkcert",
        probe: probe_mkcert,
        operational_probe: None,
        installer: install_mkcert,
    },
];

fn probe_docker(runner: &dyn CommandRunner) -> bool {
    probe_version(runner, "docker", &["version", "--format", "{{.Server.Version}}"])
}

fn docker_operational(runner: &dyn CommandRunner) -> bool {
    probe_version(runner, "docker", &["info"])
}

fn probe_podman(runner: &dyn CommandRunner) -> bool {
    probe_version(runner, "podman", &["--version"])
}

fn podman_operational(runner: &dyn CommandRunner) -> bool {
    probe_version(runner, "podman", &["info"])
}

fn probe_k3d(runner: &dyn CommandRunner) -> bool {
    probe_version(runner, "k3d", &["--version"])
}

fn probe_kubectl(runner: &dyn CommandRunner) -> bool {
    probe_version(runner, "kubectl", &["version", "--client"])
}

fn probe_argocd(runner: &dyn CommandRunner) -> bool {
    probe_version(runner, "argocd", &["version", "--client"])
}

fn probe_git(runner: &dyn CommandRunner) -> bool {
    probe_version(runner, "git", &["--version"])
}

fn probe_mkcert(runner: &dyn CommandRunner) -> bool {
    probe_version(runner, "mkcert", &["-version"])
}

fn never_install(_runner: &dyn CommandRunner, _host: &HostProfile) -> Result<(), NimbusError> {
    Err(NimbusError::PreflightInstall {
        tool: "git".to_string(),
        detail: "git is never installed automatically; see manual_help".to_string(),
    })
}

/// Directory nimbus installs downloaded binaries into; prepended to `PATH`
/// by the shell integration the manual-help text points users at.
pub fn install_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".local").join("bin"))
        .unwrap_or_else(|| PathBuf::from(".local/bin"))
}

fn try_package_manager(
    runner: &dyn CommandRunner,
    host: &HostProfile,
    package: &str,
) -> bool {
    for manager in &host.package_managers {
        let (program, args): (&str, Vec<&str>) = match *manager {
            "apt-get" => ("apt-get", vec!["install", "-y", package]),
            "dnf" => ("dnf", vec!["install", "-y", package]),
            "pacman" => ("pacman", vec!["-S", "--noconfirm", package]),
            "brew" => ("brew", vec!["install", package]),
            _ => continue,
        };
        let spec = CommandSpec::new(package, program).args(args.iter().map(|s| s.to_string()));
        if matches!(runner.run(&spec), Ok(result) if result.success()) {
            return true;
        }
    }
    false
}

fn install_via_package_manager_then_fetch(
    runner: &dyn CommandRunner,
    host: &HostProfile,
    package: &str,
    github_repo: &str,
    binary_name: &str,
) -> Result<(), NimbusError> {
    if matches!(
        host.family,
        crate::platform::HostFamily::Windows
    ) {
        return Err(NimbusError::PreflightInstall {
            tool: binary_name.to_string(),
            detail: "automatic installation is not attempted on bare Windows".to_string(),
        });
    }

    if try_package_manager(runner, host, package) {
        return Ok(());
    }

    let platform = nimbus_fetch::Platform::current();
    nimbus_fetch::fetch_github_release(github_repo, binary_name, &install_dir(), &platform)
        .map(|_| ())
        .map_err(|err| NimbusError::PreflightInstall {
            tool: binary_name.to_string(),
            detail: err.to_string(),
        })
}

fn install_docker(runner: &dyn CommandRunner, host: &HostProfile) -> Result<(), NimbusError> {
    if try_package_manager(runner, host, "docker") {
        Ok(())
    } else {
        Err(NimbusError::PreflightInstall {
            tool: "docker".to_string(),
            detail: "no package manager succeeded; install Docker manually".to_string(),
        })
    }
}

fn install_podman(runner: &dyn CommandRunner, host: &HostProfile) -> Result<(), NimbusError> {
    if try_package_manager(runner, host, "podman") {
        Ok(())
    } else {
        Err(NimbusError::PreflightInstall {
            tool: "podman".to_string(),
            detail: "no package manager succeeded; install Podman manually".to_string(),
        })
    }
}

fn install_k3d(runner: &dyn CommandRunner, host: &HostProfile) -> Result<(), NimbusError> {
    install_via_package_manager_then_fetch(runner, host, "k3d", "k3d-io/k3d", "k3d")
}

fn install_kubectl(runner: &dyn CommandRunner, host: &HostProfile) -> Result<(), NimbusError> {
    install_via_package_manager_then_fetch(
        runner,
        host,
        "kubectl",
        "kubernetes/kubernetes",
        "kubectl",
    )
}

fn install_argocd(runner: &dyn CommandRunner, host: &HostProfile) -> Result<(), NimbusError> {
    install_via_package_manager_then_fetch(runner, host, "argocd", "argoproj/argo-cd", "argocd")
}

fn install_mkcert(runner: &dyn CommandRunner, host: &HostProfile) -> Result<(), NimbusError> {
    install_via_package_manager_then_fetch(
        runner,
        host,
        "mkcert",
        "FiloSottile/mkcert",
        "mkcert",
    )
}
