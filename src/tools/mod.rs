//! The tool catalog (spec component C3).
//!
//! A module-level constant table, not a trait-object hierarchy: new tools
//! are added by appending an entry, following the same data-driven catalog
//! idiom this codebase already uses for its schema registry. Each entry's
//! probe/install behavior is a plain function, selected per tool, so the
//! table itself stays data.

mod catalog;

pub use catalog::CATALOG;

use crate::command_runner::{CommandRunner, CommandSpec, OutputMode};
use crate::error::NimbusError;
use crate::platform::HostProfile;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Cluster,
    Chart,
}

pub struct ToolDescriptor {
    pub id: &'static str,
    pub category: ToolCategory,
    /// True for tools with a long-running daemon/socket (the container
    /// runtime); only these are ever checked with `is_operational`.
    pub is_runtime: bool,
    /// False for tools this crate will never attempt to install (e.g. Git).
    pub installable: bool,
    /// Tools sharing the same group id satisfy a single runtime requirement
    /// interchangeably (docker vs. podman): the requirement is met by
    /// *either* being present and operational, and preflight treats the
    /// group — not each member — as the thing that can be missing/dormant.
    /// `None` for every tool that has no alternative.
    pub runtime_group: Option<&'static str>,
    pub manual_help: &'static str,
    pub probe: fn(&dyn CommandRunner) -> bool,
    pub operational_probe: Option<fn(&dyn CommandRunner) -> bool>,
    pub installer: fn(&dyn CommandRunner, &HostProfile) -> Result<(), NimbusError>,
}

pub fn find(id: &str) -> Option<&'static ToolDescriptor> {
    CATALOG.iter().find(|tool| tool.id == id)
}

/// Runs `<program> --version` (or an equivalent cheap probe) with a 5s
/// timeout; a zero exit code is treated as "present" regardless of output
/// content, since many tools print version info to stderr.
pub(crate) fn probe_version(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> bool {
    let spec = CommandSpec::new(program, program)
        .args(args.iter().map(|s| s.to_string()))
        .timeout(Duration::from_secs(5));
    matches!(runner.run(&spec), Ok(result) if result.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_unique_ids() {
        let mut ids: Vec<&str> = CATALOG.iter().map(|tool| tool.id).collect();
        ids.sort_unstable();
        let mut unique = ids.clone();
        unique.dedup();
        assert_eq!(ids, unique);
    }

    #[test]
    fn only_the_container_runtime_entries_are_runtime_tools() {
        let runtime_ids: Vec<&str> = CATALOG
            .iter()
            .filter(|tool| tool.is_runtime)
            .map(|tool| tool.id)
            .collect();
        assert_eq!(runtime_ids, vec!["docker", "podman"]);
    }

    #[test]
    fn git_is_never_installable() {
        let git = find("git").expect("git in catalog");
        assert!(!git.installable);
    }

    #[test]
    fn find_returns_none_for_unknown_tool() {
        assert!(find("not-a-real-tool").is_none());
    }
}
