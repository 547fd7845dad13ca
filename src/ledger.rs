//! The per-run append-only ledger (`runs/<timestamp>/ledger.jsonl`).
//!
//! Every [`crate::output::Reporter`] call appends one JSON line here. The
//! ledger and the `tracing` log are two serializations of the same
//! underlying stream of steps, not separate bookkeeping.

use crate::error::NimbusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Warn,
    Err,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallStep {
    pub ts: DateTime<Utc>,
    pub state: String,
    pub phase: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub struct RunLedger {
    path: PathBuf,
    file: File,
}

impl RunLedger {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, NimbusError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(
        &mut self,
        state: &str,
        phase: &str,
        label: &str,
        outcome: Option<Outcome>,
        detail: Option<&str>,
    ) -> Result<(), NimbusError> {
        let step = InstallStep {
            ts: Utc::now(),
            state: state.to_string(),
            phase: phase.to_string(),
            label: label.to_string(),
            outcome,
            detail: detail.map(|d| d.to_string()),
        };
        let line = serde_json::to_string(&step)
            .map_err(|err| NimbusError::Unknown(format!("ledger serialization: {err}")))?;
        writeln!(self.file, "{line}")?;
        self.file.flush()?;
        Ok(())
    }

    /// Reads back every step recorded so far. Used by `nimbus cluster status
    /// --detailed` and by tests asserting on ledger contents.
    pub fn read_all(path: &Path) -> Result<Vec<InstallStep>, NimbusError> {
        let contents = std::fs::read_to_string(path)?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|err| NimbusError::Unknown(format!("ledger parse: {err}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_and_reads_back_steps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut ledger = RunLedger::create(&path).unwrap();
        ledger
            .append("preflight", "begin", "memory check", None, None)
            .unwrap();
        ledger
            .append(
                "preflight",
                "end",
                "memory check",
                Some(Outcome::Ok),
                Some("32000MB"),
            )
            .unwrap();

        let steps = RunLedger::read_all(&path).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].outcome, Some(Outcome::Ok));
        assert_eq!(steps[1].detail.as_deref(), Some("32000MB"));
    }

    #[test]
    fn outcome_serializes_lowercase() {
        let json = serde_json::to_string(&Outcome::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
    }
}
