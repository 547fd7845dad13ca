//! `RunContext` — the bundle of shared, read-only handles threaded through
//! C4-C8 for a single invocation, instead of process-wide globals.
//!
//! This is the one struct every engine takes by reference; nothing in this
//! crate reaches for a global logger, a global confirmer, or a global
//! command runner the way the tool this crate's style is drawn from does.

use crate::cancel::CancellationToken;
use crate::command_runner::CommandRunner;
use crate::output::{Confirmer, Reporter};
use crate::platform::HostProfile;
use std::path::PathBuf;
use std::sync::Arc;

pub struct RunContext {
    pub runner: Arc<dyn CommandRunner>,
    pub host: HostProfile,
    pub reporter: Reporter,
    pub confirmer: Arc<dyn Confirmer>,
    pub cancel: CancellationToken,
    /// The directory this run owns: `<cache>/nimbus/runs/<timestamp>/`.
    pub state_dir: PathBuf,
    pub verbose: bool,
}

impl RunContext {
    /// Detects the host profile once and shares it with both `self.host`
    /// and, via `build_runner`, the command runner — so platform-dependent
    /// decisions (path translation, package manager choice) are made from
    /// one observation of the host rather than two.
    pub fn new(
        build_runner: impl FnOnce(HostProfile) -> Arc<dyn CommandRunner>,
        reporter: Reporter,
        confirmer: Arc<dyn Confirmer>,
        state_dir: PathBuf,
        verbose: bool,
    ) -> Self {
        let host = HostProfile::detect();
        Self {
            runner: build_runner(host.clone()),
            host,
            reporter,
            confirmer,
            cancel: CancellationToken::new(),
            state_dir,
            verbose,
        }
    }
}
