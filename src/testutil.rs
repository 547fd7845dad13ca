//! Scripted [`CommandRunner`] fake shared by unit tests across the crate.
//! Mirrors the record-and-replay `MockCommandRunner` pattern this codebase
//! uses to test command-execution call sites without spawning subprocesses.
#![cfg(test)]

use crate::command_runner::{CommandResult, CommandRunner, CommandSpec};
use crate::error::NimbusError;
use std::collections::HashMap;
use std::sync::Mutex;

pub struct ScriptedResponse {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ScriptedResponse {
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }
}

/// Keyed by `"<program> <args joined by space>"`. Falls back to a
/// program-only key when no exact argument match is scripted, so tests can
/// script a generic "whatever you call kubectl with, return this" response.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, ScriptedResponse>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, key: impl Into<String>, response: ScriptedResponse) {
        self.responses.lock().unwrap().insert(key.into(), response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandResult, NimbusError> {
        let full_key = format!("{} {}", spec.program, spec.args.join(" "));
        self.calls.lock().unwrap().push(full_key.clone());

        let responses = self.responses.lock().unwrap();
        let (exit_code, stdout, stderr) = match responses
            .get(&full_key)
            .or_else(|| responses.get(&spec.program))
        {
            Some(response) => (
                response.exit_code,
                response.stdout.clone(),
                response.stderr.clone(),
            ),
            None => (Some(127), Vec::new(), Vec::new()),
        };

        Ok(CommandResult {
            exit_code,
            stdout,
            stderr,
            truncated: false,
        })
    }
}
