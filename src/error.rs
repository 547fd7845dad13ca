//! Crate-wide error taxonomy.
//!
//! Library code returns [`NimbusError`]; the command layer wraps these with
//! [`anyhow::Context`] for user-facing messages and maps [`NimbusError::exit_code`]
//! to the process exit code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NimbusError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("insufficient memory: {available_mb}MB available, {recommended_mb}MB recommended")]
    PreflightMemory {
        available_mb: u64,
        recommended_mb: u64,
    },

    #[error("failed to install {tool}: {detail}")]
    PreflightInstall { tool: String, detail: String },

    #[error("failed to start runtime {tool}: {detail}")]
    PreflightRuntime { tool: String, detail: String },

    #[error("a cluster named '{0}' already exists")]
    ClusterNameConflict(String),

    #[error("cluster provisioner failed: {0}")]
    ClusterProvisioner(String),

    #[error("cluster API did not become reachable within the deadline")]
    ClusterApiUnreachable,

    #[error("port {0} is already in use")]
    ClusterPortInUse(u16),

    #[error("chart install failed: {0}")]
    ChartInstall(String),

    #[error("application '{app}' is stuck: {message}")]
    ChartStuck { app: String, message: String },

    #[error("convergence timed out waiting for all applications to become healthy")]
    ConvergenceTimeout,

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("canceled")]
    Canceled,

    #[error("{0}")]
    Unknown(String),

    #[error("process execution error: {0}")]
    Process(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NimbusError {
    /// Maps an error to the process exit code defined in the external
    /// interfaces section of the specification.
    pub fn exit_code(&self) -> i32 {
        match self {
            NimbusError::Usage(_) => 2,
            NimbusError::PreflightMemory { .. }
            | NimbusError::PreflightInstall { .. }
            | NimbusError::PreflightRuntime { .. } => 3,
            NimbusError::ClusterNameConflict(_)
            | NimbusError::ClusterProvisioner(_)
            | NimbusError::ClusterApiUnreachable
            | NimbusError::ClusterPortInUse(_) => 4,
            NimbusError::ChartInstall(_)
            | NimbusError::ChartStuck { .. }
            | NimbusError::ConvergenceTimeout => 5,
            NimbusError::Canceled => 130,
            NimbusError::TransientNetwork(_)
            | NimbusError::Unknown(_)
            | NimbusError::Process(_)
            | NimbusError::Io(_) => 1,
        }
    }

    /// The taxonomy key used in the ledger and in `--verbose` error chains,
    /// e.g. `cluster.port-in-use`.
    pub fn kind(&self) -> &'static str {
        match self {
            NimbusError::Usage(_) => "usage",
            NimbusError::PreflightMemory { .. } => "preflight.memory",
            NimbusError::PreflightInstall { .. } => "preflight.install",
            NimbusError::PreflightRuntime { .. } => "preflight.runtime",
            NimbusError::ClusterNameConflict(_) => "cluster.name-conflict",
            NimbusError::ClusterProvisioner(_) => "cluster.provisioner",
            NimbusError::ClusterApiUnreachable => "cluster.api-unreachable",
            NimbusError::ClusterPortInUse(_) => "cluster.port-in-use",
            NimbusError::ChartInstall(_) => "chart.install",
            NimbusError::ChartStuck { .. } => "chart.stuck",
            NimbusError::ConvergenceTimeout => "convergence.timeout",
            NimbusError::TransientNetwork(_) => "transient.network",
            NimbusError::Canceled => "canceled",
            NimbusError::Process(_) => "process",
            NimbusError::Io(_) | NimbusError::Unknown(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_taxonomy() {
        assert_eq!(NimbusError::Usage("bad".into()).exit_code(), 2);
        assert_eq!(
            NimbusError::PreflightMemory {
                available_mb: 1,
                recommended_mb: 2
            }
            .exit_code(),
            3
        );
        assert_eq!(NimbusError::ClusterPortInUse(6443).exit_code(), 4);
        assert_eq!(NimbusError::ConvergenceTimeout.exit_code(), 5);
        assert_eq!(NimbusError::Canceled.exit_code(), 130);
    }

    #[test]
    fn kind_strings_are_dotted_taxonomy_keys() {
        assert_eq!(NimbusError::ClusterPortInUse(1).kind(), "cluster.port-in-use");
        assert_eq!(NimbusError::ConvergenceTimeout.kind(), "convergence.timeout");
    }
}
