//! Progress reporting and interactive confirmation (spec component C9).
//!
//! [`Reporter`] is the single sink every component reports through. It owns
//! the underlying presentation ([`ReportSink`] — TTY-rich or line-oriented)
//! and, independent of which sink is in use, appends every call to the
//! run's [`crate::ledger::RunLedger`] and emits a matching `tracing` event.
//! Concurrent callers (C7's worker threads, C4's parallel probes) all funnel
//! through the same `Reporter`, which serializes itself behind a mutex so
//! the ledger transcript stays monotonic.

use crate::ledger::{Outcome, RunLedger};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::sync::Mutex;
use std::time::Instant;

/// The presentation backend a [`Reporter`] delegates to.
pub trait ReportSink: Send + Sync {
    fn start_step(&self, label: &str);
    fn succeed(&self, label: &str, payload: &str);
    fn warn(&self, label: &str, payload: &str);
    fn fail(&self, label: &str, err: &str);
    fn skip(&self, label: &str, payload: &str);
    fn info(&self, line: &str);
    fn table(&self, headers: &[&str], rows: &[Vec<String>]);
    fn gauge(&self, fraction: f64, label: &str);
}

struct ActiveStep {
    label: String,
    started_at: Instant,
}

pub struct Reporter {
    sink: Box<dyn ReportSink>,
    ledger: Mutex<RunLedger>,
    active: Mutex<Option<ActiveStep>>,
    state: Mutex<String>,
}

impl Reporter {
    pub fn new(sink: Box<dyn ReportSink>, ledger: RunLedger) -> Self {
        Self {
            sink,
            ledger: Mutex::new(ledger),
            active: Mutex::new(None),
            state: Mutex::new("init".to_string()),
        }
    }

    /// Sets the orchestrator state name attached to subsequent ledger
    /// entries (e.g. `"preflight"`, `"create_cluster"`).
    pub fn set_state(&self, state: &str) {
        *self.state.lock().unwrap() = state.to_string();
    }

    pub fn start_step(&self, label: &str) {
        *self.active.lock().unwrap() = Some(ActiveStep {
            label: label.to_string(),
            started_at: Instant::now(),
        });
        self.sink.start_step(label);
        self.append("begin", label, None, None);
        tracing::info!(step = %label, "step started");
    }

    pub fn succeed(&self, payload: &str) {
        let label = self.take_label();
        self.sink.succeed(&label, payload);
        self.append("end", &label, Some(Outcome::Ok), Some(payload));
        tracing::info!(step = %label, payload = %payload, "step succeeded");
    }

    pub fn warn(&self, payload: &str) {
        let label = self.take_label();
        self.sink.warn(&label, payload);
        self.append("end", &label, Some(Outcome::Warn), Some(payload));
        tracing::warn!(step = %label, payload = %payload, "step warned");
    }

    pub fn fail(&self, err: &str) {
        let label = self.take_label();
        self.sink.fail(&label, err);
        self.append("end", &label, Some(Outcome::Err), Some(err));
        tracing::error!(step = %label, error = %err, "step failed");
    }

    pub fn skip(&self, payload: &str) {
        let label = self.take_label();
        self.sink.skip(&label, payload);
        self.append("end", &label, Some(Outcome::Skipped), Some(payload));
        tracing::info!(step = %label, payload = %payload, "step skipped");
    }

    pub fn info(&self, line: &str) {
        self.sink.info(line);
        self.append("info", line, None, None);
        tracing::info!("{line}");
    }

    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        self.sink.table(headers, rows);
    }

    pub fn gauge(&self, fraction: f64, label: &str) {
        self.sink.gauge(fraction, label);
    }

    fn take_label(&self) -> String {
        self.active
            .lock()
            .unwrap()
            .take()
            .map(|step| step.label)
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn append(&self, phase: &str, label: &str, outcome: Option<Outcome>, detail: Option<&str>) {
        let state = self.state.lock().unwrap().clone();
        let mut ledger = self.ledger.lock().unwrap();
        if let Err(err) = ledger.append(&state, phase, label, outcome, detail) {
            tracing::warn!(error = %err, "failed to append to ledger");
        }
    }
}

/// TTY-rich sink using `indicatif` spinners and `owo-colors` status glyphs,
/// matching this codebase's existing cargo-like status line conventions.
pub struct TtySink;

impl ReportSink for TtySink {
    fn start_step(&self, label: &str) {
        println!("{} {label}", "→".blue().bold());
    }

    fn succeed(&self, label: &str, payload: &str) {
        if payload.is_empty() {
            println!("{} {label}", "✓".green().bold());
        } else {
            println!("{} {label}: {payload}", "✓".green().bold());
        }
    }

    fn warn(&self, label: &str, payload: &str) {
        println!("{} {label}: {payload}", "⚠".yellow().bold());
    }

    fn fail(&self, label: &str, err: &str) {
        println!("{} {label}: {err}", "✗".red().bold());
    }

    fn skip(&self, label: &str, payload: &str) {
        println!("{} {label} (skipped): {payload}", "·".dimmed());
    }

    fn info(&self, line: &str) {
        println!("  {line}");
    }

    fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        println!("  {}", headers.join("  "));
        for row in rows {
            println!("  {}", row.join("  "));
        }
    }

    fn gauge(&self, fraction: f64, label: &str) {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}% {msg}") {
            bar.set_style(style);
        }
        bar.set_position((fraction * 100.0).round() as u64);
        bar.set_message(label.to_string());
        bar.tick();
    }
}

/// Line-oriented sink used under `--non-interactive` or when stdout is not
/// a terminal, so redirected output and CI logs stay legible without ANSI
/// escapes.
pub struct LineSink;

impl ReportSink for LineSink {
    fn start_step(&self, label: &str) {
        println!("-> {label}");
    }

    fn succeed(&self, label: &str, payload: &str) {
        println!("ok {label}: {payload}");
    }

    fn warn(&self, label: &str, payload: &str) {
        println!("warn {label}: {payload}");
    }

    fn fail(&self, label: &str, err: &str) {
        println!("fail {label}: {err}");
    }

    fn skip(&self, label: &str, payload: &str) {
        println!("skip {label}: {payload}");
    }

    fn info(&self, line: &str) {
        println!("info {line}");
    }

    fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        println!("{}", headers.join("\t"));
        for row in rows {
            println!("{}", row.join("\t"));
        }
    }

    fn gauge(&self, fraction: f64, label: &str) {
        println!("progress {:.0}% {label}", fraction * 100.0);
    }
}

/// Prompts for confirmation/selection/free text (spec's `Confirmer` contract).
pub trait Confirmer: Send + Sync {
    fn confirm(&self, prompt: &str, default: bool) -> bool;
    fn select_one(&self, prompt: &str, options: &[String]) -> Option<String>;
    fn prompt_text(&self, prompt: &str, default: &str) -> String;
}

/// Always returns the caller-supplied default without blocking, used for
/// `--non-interactive` runs.
pub struct NonInteractiveConfirmer;

impl Confirmer for NonInteractiveConfirmer {
    fn confirm(&self, _prompt: &str, default: bool) -> bool {
        default
    }

    fn select_one(&self, _prompt: &str, options: &[String]) -> Option<String> {
        options.first().cloned()
    }

    fn prompt_text(&self, _prompt: &str, default: &str) -> String {
        default.to_string()
    }
}

/// Interactive confirmer backed by `cliclack` prompts.
pub struct InteractiveConfirmer;

impl Confirmer for InteractiveConfirmer {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        cliclack::confirm(prompt)
            .initial_value(default)
            .interact()
            .unwrap_or(default)
    }

    fn select_one(&self, prompt: &str, options: &[String]) -> Option<String> {
        if options.is_empty() {
            return None;
        }
        let mut select = cliclack::select(prompt);
        for option in options {
            select = select.item(option.clone(), option.clone(), "");
        }
        select.interact().ok()
    }

    fn prompt_text(&self, prompt: &str, default: &str) -> String {
        cliclack::input(prompt)
            .default_input(default)
            .interact()
            .unwrap_or_else(|_| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::RunLedger;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        successes: AtomicUsize,
        failures: AtomicUsize,
    }

    impl ReportSink for CountingSink {
        fn start_step(&self, _label: &str) {}
        fn succeed(&self, _label: &str, _payload: &str) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }
        fn warn(&self, _label: &str, _payload: &str) {}
        fn fail(&self, _label: &str, _err: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        fn skip(&self, _label: &str, _payload: &str) {}
        fn info(&self, _line: &str) {}
        fn table(&self, _headers: &[&str], _rows: &[Vec<String>]) {}
        fn gauge(&self, _fraction: f64, _label: &str) {}
    }

    #[test]
    fn start_then_succeed_appends_begin_and_end_to_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RunLedger::create(dir.path().join("ledger.jsonl")).unwrap();
        let reporter = Reporter::new(
            Box::new(CountingSink {
                successes: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
            }),
            ledger,
        );
        reporter.set_state("preflight");
        reporter.start_step("memory check");
        reporter.succeed("32000MB available");

        let contents = std::fs::read_to_string(dir.path().join("ledger.jsonl")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"phase\":\"begin\""));
        assert!(lines[1].contains("\"phase\":\"end\""));
        assert!(lines[1].contains("\"outcome\":\"ok\""));
    }

    #[test]
    fn non_interactive_confirmer_never_blocks() {
        let confirmer = NonInteractiveConfirmer;
        assert!(confirmer.confirm("continue?", true));
        assert!(!confirmer.confirm("continue?", false));
        assert_eq!(confirmer.prompt_text("name?", "demo-1"), "demo-1");
        assert_eq!(
            confirmer.select_one("pick", &["a".to_string(), "b".to_string()]),
            Some("a".to_string())
        );
    }
}
