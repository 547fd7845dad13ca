//! Run configuration resolution and validation (spec component C10).
//!
//! Precedence, highest wins: CLI flags > environment variables > an on-disk
//! values file > built-in defaults. The whole aggregate is validated before
//! any side effect runs.

use crate::error::NimbusError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    OssTenant,
    SaasTenant,
    SaasShared,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::OssTenant => "oss-tenant",
            DeploymentMode::SaasTenant => "saas-tenant",
            DeploymentMode::SaasShared => "saas-shared",
        }
    }
}

/// Resolved, validated configuration for a single `bootstrap` run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunConfig {
    pub cluster_name: String,
    pub deployment_mode: Option<DeploymentMode>,
    pub interactive: bool,
    pub force: bool,
    pub verbose: bool,
    pub repo_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_node_count")]
    pub node_count: u32,
    pub k8s_version: Option<String>,
    pub values_file: Option<PathBuf>,
    /// How long `await_convergence` waits before giving up. Not exposed as a
    /// CLI flag; set it through a values file when the default is too short
    /// for a large app-of-apps tree.
    #[serde(default = "default_convergence_deadline_secs")]
    pub convergence_deadline_secs: u64,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_node_count() -> u32 {
    3
}

fn default_convergence_deadline_secs() -> u64 {
    30 * 60
}

pub const DEFAULT_REPO_URL: &str = "https://github.com/example-org/gitops-fleet.git";

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cluster_name: "local".to_string(),
            deployment_mode: None,
            interactive: true,
            force: false,
            verbose: false,
            repo_url: DEFAULT_REPO_URL.to_string(),
            branch: default_branch(),
            node_count: default_node_count(),
            k8s_version: None,
            values_file: None,
            convergence_deadline_secs: default_convergence_deadline_secs(),
        }
    }
}

impl RunConfig {
    /// Validates the aggregate configuration. Called once, before any side
    /// effect, so an invalid configuration never leaves partial state.
    pub fn validate(&self) -> Result<(), NimbusError> {
        validate_cluster_name(&self.cluster_name)?;
        validate_branch(&self.branch)?;
        validate_node_count(self.node_count)?;

        if !self.interactive && self.deployment_mode.is_none() && self.values_file.is_none() {
            return Err(NimbusError::Usage(
                "--non-interactive requires --deployment-mode or --values".to_string(),
            ));
        }

        Ok(())
    }

    /// Serializes this configuration to YAML. Used to snapshot the resolved
    /// config into the per-run state directory for later inspection, and by
    /// `nimbus schema`. Distinct from `--values`, which points at a
    /// deployment values document (spec component C6), not a `RunConfig`.
    pub fn to_yaml(&self) -> Result<String, NimbusError> {
        serde_yaml::to_string(self)
            .map_err(|err| NimbusError::Unknown(format!("serializing run config: {err}")))
    }

    pub fn from_yaml(contents: &str) -> Result<Self, NimbusError> {
        serde_yaml::from_str(contents)
            .map_err(|err| NimbusError::Usage(format!("invalid values file: {err}")))
    }
}

/// `[a-z0-9][-a-z0-9]*[a-z0-9]`, at most 63 characters (DNS label length).
pub fn validate_cluster_name(name: &str) -> Result<(), NimbusError> {
    if name.is_empty() || name.len() > 63 {
        return Err(NimbusError::Usage(format!(
            "cluster name must be 1-63 characters, got {}",
            name.len()
        )));
    }
    if name.len() == 1 {
        if !name.chars().next().unwrap().is_ascii_lowercase()
            && !name.chars().next().unwrap().is_ascii_digit()
        {
            return Err(NimbusError::Usage(format!(
                "invalid cluster name '{name}'"
            )));
        }
        return Ok(());
    }

    let bytes: Vec<char> = name.chars().collect();
    let first = bytes[0];
    let last = *bytes.last().unwrap();
    let valid_edge = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let valid_middle = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';

    if !valid_edge(first) || !valid_edge(last) {
        return Err(NimbusError::Usage(format!(
            "cluster name '{name}' must start and end with a lowercase letter or digit"
        )));
    }
    if !bytes[1..bytes.len() - 1].iter().all(|c| valid_middle(*c)) {
        return Err(NimbusError::Usage(format!(
            "cluster name '{name}' may only contain lowercase letters, digits, and hyphens"
        )));
    }

    Ok(())
}

pub fn validate_branch(branch: &str) -> Result<(), NimbusError> {
    let valid = !branch.is_empty()
        && branch
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/'));
    if valid {
        Ok(())
    } else {
        Err(NimbusError::Usage(format!("invalid branch ref '{branch}'")))
    }
}

pub fn validate_node_count(count: u32) -> Result<(), NimbusError> {
    if (1..=50).contains(&count) {
        Ok(())
    } else {
        Err(NimbusError::Usage(format!(
            "node count must be between 1 and 50, got {count}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_name_at_max_length() {
        let name = "a".repeat(63);
        assert!(validate_cluster_name(&name).is_ok());
    }

    #[test]
    fn rejects_name_over_max_length() {
        let name = "a".repeat(64);
        assert!(validate_cluster_name(&name).is_err());
    }

    #[test]
    fn rejects_uppercase_and_leading_hyphen() {
        assert!(validate_cluster_name("Demo-1").is_err());
        assert!(validate_cluster_name("-demo").is_err());
        assert!(validate_cluster_name("demo-").is_err());
    }

    #[test]
    fn accepts_single_character_name() {
        assert!(validate_cluster_name("a").is_ok());
        assert!(validate_cluster_name("1").is_ok());
    }

    #[test]
    fn node_count_boundaries() {
        assert!(validate_node_count(1).is_ok());
        assert!(validate_node_count(50).is_ok());
        assert!(validate_node_count(0).is_err());
        assert!(validate_node_count(51).is_err());
    }

    #[test]
    fn non_interactive_requires_mode_or_values_file() {
        let mut config = RunConfig {
            interactive: false,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
        config.deployment_mode = Some(DeploymentMode::OssTenant);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn round_trips_through_yaml() {
        let config = RunConfig {
            cluster_name: "demo-1".to_string(),
            deployment_mode: Some(DeploymentMode::SaasShared),
            ..RunConfig::default()
        };
        let yaml = config.to_yaml().unwrap();
        let parsed = RunConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.cluster_name, config.cluster_name);
        assert_eq!(parsed.deployment_mode, config.deployment_mode);
        assert_eq!(parsed.branch, config.branch);
    }

    #[test]
    fn rejects_malformed_branch() {
        assert!(validate_branch("feature branch with spaces").is_err());
        assert!(validate_branch("feature/fix-1").is_ok());
    }
}
