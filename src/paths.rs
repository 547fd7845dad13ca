//! Per-run on-disk layout (spec §6 External interfaces).
//!
//! Every run gets its own directory under the per-user cache root:
//! `<cache_dir>/nimbus/runs/<timestamp>/{kubeconfig, values.yaml, workdir/,
//! ledger.jsonl}`. Nothing outside this directory is ever written by a run,
//! so cleanup is always "remove this one directory".

use crate::error::NimbusError;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// A fresh, sortable run identifier derived from the current time.
pub fn new_run_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

fn cache_root() -> Result<PathBuf, NimbusError> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.cache_dir().join("nimbus"))
        .ok_or_else(|| NimbusError::Unknown("could not determine the per-user cache directory".to_string()))
}

/// The directory a single run owns: `<cache>/nimbus/runs/<timestamp>/`.
pub fn run_state_dir(timestamp: &str) -> Result<PathBuf, NimbusError> {
    Ok(cache_root()?.join("runs").join(timestamp))
}

pub fn kubeconfig_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("kubeconfig")
}

pub fn values_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("values.yaml")
}

pub fn workdir_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("workdir")
}

pub fn ledger_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("ledger.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_is_sortable_and_filesystem_safe() {
        let ts = new_run_timestamp(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(ts, "20260102T030405Z");
        assert!(!ts.contains(':'));
    }

    #[test]
    fn layout_nests_under_a_single_run_directory() {
        let state_dir = PathBuf::from("/tmp/nimbus/runs/20260101T000000Z");
        assert_eq!(kubeconfig_path(&state_dir), state_dir.join("kubeconfig"));
        assert_eq!(values_path(&state_dir), state_dir.join("values.yaml"));
        assert_eq!(workdir_path(&state_dir), state_dir.join("workdir"));
        assert_eq!(ledger_path(&state_dir), state_dir.join("ledger.jsonl"));
    }
}
