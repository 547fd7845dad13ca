//! Command handlers: the thin layer between [`crate::cli`] and the engines
//! (C4-C8). Each submodule owns one subcommand's wiring — building a
//! [`crate::context::RunContext`], resolving a [`crate::config::RunConfig`]
//! or equivalent ad hoc arguments, and printing the final summary.

pub mod bootstrap;
pub mod chart;
pub mod cluster;
pub mod completions;
pub mod schema;

use crate::output::{Confirmer, InteractiveConfirmer, LineSink, NonInteractiveConfirmer, ReportSink, TtySink};
use is_terminal::IsTerminal;
use std::sync::Arc;

/// Picks the presentation sink and confirmer for one command invocation.
/// A non-interactive run always gets the line-oriented sink and a
/// confirmer that returns defaults without blocking, even on a TTY.
pub(crate) fn presentation(interactive: bool) -> (Box<dyn ReportSink>, Arc<dyn Confirmer>) {
    if !interactive {
        return (Box::new(LineSink), Arc::new(NonInteractiveConfirmer));
    }
    let sink: Box<dyn ReportSink> = if std::io::stdout().is_terminal() {
        Box::new(TtySink)
    } else {
        Box::new(LineSink)
    };
    (sink, Arc::new(InteractiveConfirmer))
}
