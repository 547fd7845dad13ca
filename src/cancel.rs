//! A single root cancellation flag (spec's "root cancellation scope").
//!
//! One [`CancellationToken`] is created per run and cloned into every
//! suspension point in C1 (process waits), C6/C7 (Kubernetes-client I/O),
//! C7 (poll sleeps), and C9 (confirmer prompts). A SIGINT/SIGTERM handler
//! installed once in `main` is the only thing that ever calls `cancel()`.

use crate::error::NimbusError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Err(NimbusError::Canceled)` iff this token has been tripped;
    /// called at every suspension point so cancellation is honored promptly
    /// rather than only at state boundaries.
    pub fn check(&self) -> Result<(), NimbusError> {
        if self.is_cancelled() {
            Err(NimbusError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Installs a process-wide SIGINT/SIGTERM handler that trips this token.
    /// Must be called at most once per process; `ctrlc` itself enforces this.
    pub fn install_signal_handler(&self) -> Result<(), NimbusError> {
        let token = self.clone();
        ctrlc::set_handler(move || token.cancel())
            .map_err(|err| NimbusError::Unknown(format!("installing signal handler: {err}")))
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(NimbusError::Canceled)));
    }
}
