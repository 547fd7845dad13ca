//! Integration tests for the nimbus CLI.
//!
//! These tests run the compiled binary and verify its output. They stick to
//! subcommands and flags that don't require a real container runtime,
//! `k3d`, or `kubectl` on the test host (schema/completions/help), since CI
//! doesn't provision those tools.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

fn nimbus() -> Command {
    cargo_bin_cmd!("nimbus")
}

#[test]
fn cli_no_args_shows_usage_and_fails() {
    nimbus()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn cli_help_flag_shows_help() {
    nimbus()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Bring a local Kubernetes environment",
        ));
}

#[test]
fn cli_version_flag_shows_version() {
    nimbus()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nimbus"));
}

#[test]
fn bootstrap_help_lists_global_and_bootstrap_flags() {
    nimbus()
        .args(["bootstrap", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--non-interactive"))
        .stdout(predicate::str::contains("--deployment-mode"))
        .stdout(predicate::str::contains("--repo"))
        .stdout(predicate::str::contains("--branch"));
}

#[test]
fn cluster_help_lists_subcommands() {
    nimbus()
        .args(["cluster", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("cleanup"));
}

#[test]
fn chart_install_help_shows_deployment_mode_flag() {
    nimbus()
        .args(["chart", "install", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--deployment-mode"));
}

#[test]
fn schema_prints_json_schema_to_stdout() {
    nimbus()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\""))
        .stdout(predicate::str::contains("RunConfig"));
}

#[test]
fn schema_writes_to_requested_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("schema.json");
    nimbus()
        .args(["schema", "--output"])
        .arg(&out)
        .assert()
        .success();
    let contents = std::fs::read_to_string(&out).unwrap();
    assert!(contents.contains("RunConfig"));
}

#[test]
fn completions_bash_includes_binary_name() {
    nimbus()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nimbus"));
}

#[test]
fn completions_requires_a_known_shell() {
    nimbus()
        .args(["completions", "powershell"])
        .assert()
        .failure();
}

#[test]
fn cluster_create_rejects_invalid_cluster_name() {
    nimbus()
        .args(["cluster", "create", "Not_A_Valid_Name!", "--non-interactive"])
        .assert()
        .failure();
}
