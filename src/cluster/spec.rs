use chrono::{DateTime, Utc};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ClusterSpec {
    pub name: String,
    pub node_count: u32,
    pub k8s_version: Option<String>,
    pub port_publish: Vec<u16>,
    pub local_registry: bool,
}

#[derive(Debug, Clone)]
pub struct ClusterHandle {
    pub name: String,
    pub api_endpoint: String,
    pub kubeconfig_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    Running,
    Degraded,
    Stopped,
}

impl ClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::Running => "running",
            ClusterStatus::Degraded => "degraded",
            ClusterStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterListEntry {
    pub name: String,
    pub status: ClusterStatus,
    pub nodes: u32,
    /// Wall-clock age since creation, rendered by the caller. `None` when the
    /// provisioner's listing doesn't carry a creation timestamp for this
    /// entry (k3d's `cluster list -o json` does not).
    pub age: Option<chrono::Duration>,
}

#[derive(Debug, Clone)]
pub struct ClusterStatusReport {
    pub name: String,
    pub status: ClusterStatus,
    pub node_count: u32,
    pub endpoint: Option<String>,
    pub controller_pods_summary: Option<String>,
}
