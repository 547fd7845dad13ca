//! Abstraction over external process execution (spec component C1).
//!
//! Every external tool in this crate — the container runtime, the cluster
//! provisioner, the GitOps controller CLI, `kubectl`, `git` — is invoked
//! through [`CommandRunner`] rather than `std::process::Command` directly,
//! so the preflight gate, cluster engine, and chart engine can all be
//! exercised against a scripted fake without touching the host.

use crate::error::NimbusError;
use crate::platform::HostProfile;
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How a command's output should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Buffer stdout/stderr in memory, no live forwarding.
    Capture,
    /// Forward each line to the stream sink as it's produced; do not retain it.
    Stream,
    /// Both forward lines live and retain them, bounded to 1 MiB total.
    StreamAndCapture,
}

/// The maximum number of bytes retained per stream in `StreamAndCapture` mode.
pub const CAPTURE_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct CommandSpec {
    pub tool_id: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    pub mode: OutputMode,
    /// Receives `"<tool_id>: <line>"` as output is produced, for Stream and
    /// StreamAndCapture modes. Ignored in Capture mode.
    pub stream_sink: Option<Sender<String>>,
    /// Indices into `args` that name a host filesystem path, so
    /// `RealCommandRunner` can apply the Linux-under-Windows translation
    /// (spec §1) before spawning. `cwd` is always translated; plain
    /// argument strings need to opt in because not every argument is a path.
    pub host_path_args: HashSet<usize>,
}

impl CommandSpec {
    pub fn new(tool_id: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            stdin: None,
            timeout: None,
            mode: OutputMode::Capture,
            stream_sink: None,
            host_path_args: HashSet::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends `path` as the next argument and marks it as a host filesystem
    /// path, so it is translated for the Linux-under-Windows layer the same
    /// way `cwd` is.
    pub fn host_path_arg(mut self, path: impl Into<String>) -> Self {
        self.host_path_args.insert(self.args.len());
        self.args.push(path.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn stdin_bytes(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn stream_sink(mut self, sink: Sender<String>) -> Self {
        self.stream_sink = Some(sink);
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    /// `None` only if the process was killed by a signal rather than exiting.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// True if capture was truncated because it exceeded [`CAPTURE_LIMIT_BYTES`].
    pub truncated: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// Trait implemented by the real subprocess runner and by test fakes.
///
/// A non-zero exit code is never itself an `Err` — callers inspect
/// [`CommandResult::exit_code`]. Only spawn failures, I/O errors, and
/// timeouts surface as `Err(NimbusError)`.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<CommandResult, NimbusError>;
}

/// Production implementation backed by [`std::process::Command`].
pub struct RealCommandRunner {
    host: HostProfile,
}

impl RealCommandRunner {
    pub fn new(host: HostProfile) -> Self {
        Self { host }
    }
}

impl CommandRunner for RealCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandResult, NimbusError> {
        let start = Instant::now();
        tracing::debug!(tool = %spec.tool_id, program = %spec.program, args = ?spec.args, "running command");

        let translated_args: Vec<String> = spec
            .args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                if spec.host_path_args.contains(&i) {
                    self.host.translate_path(arg)
                } else {
                    arg.clone()
                }
            })
            .collect();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&translated_args);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(self.host.translate_path(&cwd.display().to_string()));
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|err| {
            NimbusError::Process(format!("failed to spawn '{}': {err}", spec.program))
        })?;

        if let Some(input) = &spec.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(input);
            }
        } else {
            drop(child.stdin.take());
        }

        let result = match spec.mode {
            OutputMode::Capture => run_captured(&mut child, spec)?,
            OutputMode::Stream | OutputMode::StreamAndCapture => run_streamed(&mut child, spec)?,
        };

        tracing::debug!(tool = %spec.tool_id, elapsed_ms = start.elapsed().as_millis(), exit_code = ?result.exit_code, "command finished");
        Ok(result)
    }
}

fn run_captured(child: &mut Child, spec: &CommandSpec) -> Result<CommandResult, NimbusError> {
    if let Some(timeout) = spec.timeout {
        let status = wait_with_timeout(child, timeout, &spec.tool_id)?;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = std::io::Read::read_to_end(&mut out, &mut stdout);
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = std::io::Read::read_to_end(&mut err, &mut stderr);
        }
        Ok(CommandResult {
            exit_code: status.and_then(|s| s.code()),
            stdout,
            stderr,
            truncated: false,
        })
    } else {
        let output = child
            .wait_with_output()
            .map_err(|err| NimbusError::Process(format!("'{}' failed: {err}", spec.program)))?;
        Ok(CommandResult {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
            truncated: false,
        })
    }
}

fn run_streamed(child: &mut Child, spec: &CommandSpec) -> Result<CommandResult, NimbusError> {
    let keep = spec.mode == OutputMode::StreamAndCapture;
    let captured_out = Arc::new(Mutex::new((Vec::<u8>::new(), false)));
    let captured_err = Arc::new(Mutex::new((Vec::<u8>::new(), false)));

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_handle = spawn_line_reader(
        stdout,
        spec.tool_id.clone(),
        spec.stream_sink.clone(),
        keep,
        captured_out.clone(),
    );
    let err_handle = spawn_line_reader(
        stderr,
        spec.tool_id.clone(),
        spec.stream_sink.clone(),
        keep,
        captured_err.clone(),
    );

    let status = if let Some(timeout) = spec.timeout {
        wait_with_timeout(child, timeout, &spec.tool_id)?
    } else {
        Some(
            child
                .wait()
                .map_err(|err| NimbusError::Process(format!("'{}' failed: {err}", spec.program)))?,
        )
    };

    if let Some(handle) = out_handle {
        let _ = handle.join();
    }
    if let Some(handle) = err_handle {
        let _ = handle.join();
    }

    let (stdout, out_truncated) = Arc::try_unwrap(captured_out)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_default();
    let (stderr, err_truncated) = Arc::try_unwrap(captured_err)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_default();

    Ok(CommandResult {
        exit_code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        truncated: out_truncated || err_truncated,
    })
}

fn spawn_line_reader<R: std::io::Read + Send + 'static>(
    source: Option<R>,
    tool_id: String,
    sink: Option<Sender<String>>,
    keep: bool,
    captured: Arc<Mutex<(Vec<u8>, bool)>>,
) -> Option<std::thread::JoinHandle<()>> {
    let source = source?;
    Some(std::thread::spawn(move || {
        let reader = BufReader::new(source);
        for line in reader.lines().map_while(Result::ok) {
            if let Some(sink) = &sink {
                let _ = sink.send(format!("{tool_id}: {line}"));
            }
            if keep {
                let mut guard = captured.lock().unwrap();
                if guard.0.len() < CAPTURE_LIMIT_BYTES {
                    guard.0.extend_from_slice(line.as_bytes());
                    guard.0.push(b'\n');
                    if guard.0.len() > CAPTURE_LIMIT_BYTES {
                        guard.0.truncate(CAPTURE_LIMIT_BYTES);
                        guard.0.extend_from_slice(b"...\n");
                        guard.1 = true;
                    }
                } else {
                    guard.1 = true;
                }
            }
        }
    }))
}

/// Polls the child at a short interval until it exits or `timeout` elapses,
/// in which case it sends SIGTERM, waits a short grace period, then SIGKILL.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    tool_id: &str,
) -> Result<Option<std::process::ExitStatus>, NimbusError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|err| NimbusError::Process(err.to_string()))?
        {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            tracing::warn!(tool = %tool_id, "command exceeded timeout, terminating");
            terminate_then_kill(child);
            return Err(NimbusError::Process(format!(
                "'{tool_id}' timed out after {:?}",
                timeout
            )));
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn terminate_then_kill(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let pid = Pid::from_raw(child.id() as i32);
        let _ = kill(pid, Signal::SIGTERM);
        for _ in 0..20 {
            if let Ok(Some(_)) = child.try_wait() {
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_code() {
        let runner = RealCommandRunner::new(HostProfile::detect());
        let spec = CommandSpec::new("echo", "echo").arg("hello");
        let result = runner.run(&spec).unwrap();
        assert!(result.success());
        assert_eq!(result.stdout_str().trim(), "hello");
    }

    #[test]
    fn non_zero_exit_is_not_an_error() {
        let runner = RealCommandRunner::new(HostProfile::detect());
        let spec = CommandSpec::new("false", "false");
        let result = runner.run(&spec).unwrap();
        assert_eq!(result.exit_code, Some(1));
    }

    #[test]
    fn timeout_produces_process_error() {
        let runner = RealCommandRunner::new(HostProfile::detect());
        let spec = CommandSpec::new("sleep", "sleep")
            .arg("5")
            .timeout(Duration::from_millis(200));
        let result = runner.run(&spec);
        assert!(result.is_err());
    }

    #[test]
    fn stream_mode_forwards_prefixed_lines() {
        let (tx, rx) = std::sync::mpsc::channel();
        let runner = RealCommandRunner::new(HostProfile::detect());
        let spec = CommandSpec::new("printer", "printf")
            .arg("line1\nline2\n")
            .mode(OutputMode::Stream)
            .stream_sink(tx);
        let result = runner.run(&spec).unwrap();
        assert!(result.success());
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(lines, vec!["printer: line1", "printer: line2"]);
    }
}
