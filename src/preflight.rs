//! The preflight gate (spec component C4).
//!
//! State machine: `init -> memory_check -> tool_scan -> classify -> install
//! -> runtime_start -> done`, with abort branches at each state. Memory is
//! checked first so the gate fails fast before touching anything else.

use crate::command_runner::CommandRunner;
use crate::config::RunConfig;
use crate::error::NimbusError;
use crate::output::{Confirmer, Reporter};
use crate::platform::HostProfile;
use crate::tools::{ToolDescriptor, CATALOG};
use std::time::{Duration, Instant};

pub const RECOMMENDED_MEMORY_MB: u64 = 24_000;

#[derive(Debug, Clone, Copy)]
pub struct MemoryReading {
    pub available_mb: u64,
    pub recommended_mb: u64,
}

impl MemoryReading {
    pub fn sufficient(&self) -> bool {
        self.available_mb >= self.recommended_mb
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightDecision {
    Proceed,
    Abort(String),
}

#[derive(Debug, Clone)]
pub struct PreflightResult {
    pub missing_installable: Vec<String>,
    pub missing_runtime_dormant: Vec<String>,
    pub missing_non_installable: Vec<String>,
    pub memory: MemoryReading,
    pub decision: PreflightDecision,
}

impl PreflightResult {
    pub fn proceeds(&self) -> bool {
        self.decision == PreflightDecision::Proceed
    }
}

/// Reads available memory. On Linux this parses `/proc/meminfo`'s
/// `MemAvailable` line directly (not through [`CommandRunner`] — this is
/// file I/O, not a subprocess); other platforms fall back to treating the
/// recommended amount as available, since there is no reliable
/// dependency-free probe and preflight must never block on this.
pub fn read_memory() -> MemoryReading {
    let available_mb = read_proc_meminfo("/proc/meminfo").unwrap_or(RECOMMENDED_MEMORY_MB);
    MemoryReading {
        available_mb,
        recommended_mb: RECOMMENDED_MEMORY_MB,
    }
}

fn read_proc_meminfo(path: &str) -> Option<u64> {
    let contents = std::fs::read_to_string(path).ok()?;
    parse_mem_available_kb(&contents).map(|kb| kb / 1024)
}

fn parse_mem_available_kb(contents: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        rest.trim().split_whitespace().next()?.parse::<u64>().ok()
    })
}

/// Runs the preflight gate to completion, honoring `config.force` and
/// `config.interactive` at every confirmation point.
pub fn run(
    runner: &dyn CommandRunner,
    host: &HostProfile,
    reporter: &Reporter,
    confirmer: &dyn Confirmer,
    config: &RunConfig,
) -> Result<PreflightResult, NimbusError> {
    reporter.set_state("preflight");

    // memory_check
    reporter.start_step("memory check");
    let memory = read_memory();
    if !memory.sufficient() {
        if config.force || !config.interactive {
            reporter.warn(&format!(
                "{}MB available, {}MB recommended; continuing",
                memory.available_mb, memory.recommended_mb
            ));
        } else if confirmer.confirm("memory is below the recommendation; continue anyway?", false) {
            reporter.warn(&format!(
                "{}MB available, {}MB recommended; continuing at user request",
                memory.available_mb, memory.recommended_mb
            ));
        } else {
            reporter.fail("insufficient memory");
            return Ok(PreflightResult {
                missing_installable: Vec::new(),
                missing_runtime_dormant: Vec::new(),
                missing_non_installable: Vec::new(),
                memory,
                decision: PreflightDecision::Abort("insufficient-memory".to_string()),
            });
        }
    } else {
        reporter.succeed(&format!("{}MB available", memory.available_mb));
    }

    // tool_scan
    reporter.start_step("tool scan");
    let mut present = Vec::new();
    let mut missing = Vec::new();
    for tool in CATALOG {
        if (tool.probe)(runner) {
            present.push(tool);
        } else {
            missing.push(tool);
        }
    }
    reporter.succeed(&format!(
        "{} present, {} missing",
        present.len(),
        missing.len()
    ));

    // classify: tools in the same runtime_group (docker/podman) are
    // alternatives for one runtime requirement, not independent tools —
    // the requirement is satisfied by whichever member is present and
    // operational, so the group contributes at most one dormant or missing
    // entry, never one per member (spec §4.C4: "for the runtime descriptor
    // only"). A present runtime tool whose socket isn't reachable is
    // reclassified as dormant, never as missing (the binary IS there).
    let mut runtime_dormant: Vec<&ToolDescriptor> = Vec::new();
    let mut installable_missing: Vec<&ToolDescriptor> = Vec::new();

    let mut groups: Vec<&'static str> = CATALOG.iter().filter_map(|tool| tool.runtime_group).collect();
    groups.sort_unstable();
    groups.dedup();

    for group in groups {
        let members: Vec<&ToolDescriptor> = CATALOG
            .iter()
            .filter(|tool| tool.runtime_group == Some(group))
            .collect();
        let present_members: Vec<&ToolDescriptor> = members
            .iter()
            .copied()
            .filter(|tool| present.iter().any(|p| p.id == tool.id))
            .collect();

        if present_members.is_empty() {
            // Nothing in the group is installed; one representative stands
            // in for the whole requirement so install only attempts one.
            if let Some(representative) = members.first() {
                installable_missing.push(representative);
            }
            continue;
        }

        let operational = present_members.iter().any(|tool| {
            (tool.operational_probe.expect("runtime tool has operational probe"))(runner)
        });
        if !operational {
            runtime_dormant.push(present_members[0]);
        }
    }

    let installable_missing: Vec<&ToolDescriptor> = installable_missing
        .into_iter()
        .chain(
            missing
                .iter()
                .filter(|tool| tool.runtime_group.is_none() && tool.installable)
                .copied(),
        )
        .collect();
    let non_installable_missing: Vec<&ToolDescriptor> = missing
        .iter()
        .filter(|tool| tool.runtime_group.is_none() && !tool.installable)
        .copied()
        .collect();

    // install
    if !installable_missing.is_empty() {
        if let Some(abort) = install_missing(
            runner,
            host,
            reporter,
            confirmer,
            config,
            &installable_missing,
        )? {
            return Ok(PreflightResult {
                missing_installable: installable_missing.iter().map(|t| t.id.to_string()).collect(),
                missing_runtime_dormant: runtime_dormant.iter().map(|t| t.id.to_string()).collect(),
                missing_non_installable: non_installable_missing
                    .iter()
                    .map(|t| t.id.to_string())
                    .collect(),
                memory,
                decision: abort,
            });
        }
    }

    if !non_installable_missing.is_empty() {
        for tool in &non_installable_missing {
            reporter.start_step(&format!("{} (manual install required)", tool.id));
            reporter.fail(tool.manual_help);
        }
        return Ok(PreflightResult {
            missing_installable: installable_missing.iter().map(|t| t.id.to_string()).collect(),
            missing_runtime_dormant: runtime_dormant.iter().map(|t| t.id.to_string()).collect(),
            missing_non_installable: non_installable_missing
                .iter()
                .map(|t| t.id.to_string())
                .collect(),
            memory,
            decision: PreflightDecision::Abort("manual-install-required".to_string()),
        });
    }

    // runtime_start
    for tool in &runtime_dormant {
        if let Some(abort) = start_runtime(runner, reporter, confirmer, config, tool)? {
            return Ok(PreflightResult {
                missing_installable: installable_missing.iter().map(|t| t.id.to_string()).collect(),
                missing_runtime_dormant: runtime_dormant.iter().map(|t| t.id.to_string()).collect(),
                missing_non_installable: non_installable_missing
                    .iter()
                    .map(|t| t.id.to_string())
                    .collect(),
                memory,
                decision: abort,
            });
        }
    }

    Ok(PreflightResult {
        missing_installable: installable_missing.iter().map(|t| t.id.to_string()).collect(),
        missing_runtime_dormant: runtime_dormant.iter().map(|t| t.id.to_string()).collect(),
        missing_non_installable: non_installable_missing
            .iter()
            .map(|t| t.id.to_string())
            .collect(),
        memory,
        decision: PreflightDecision::Proceed,
    })
}

fn install_missing(
    runner: &dyn CommandRunner,
    host: &HostProfile,
    reporter: &Reporter,
    confirmer: &dyn Confirmer,
    config: &RunConfig,
    tools: &[&ToolDescriptor],
) -> Result<Option<PreflightDecision>, NimbusError> {
    let names: Vec<&str> = tools.iter().map(|t| t.id).collect();
    reporter.info(&format!("installable tools missing: {}", names.join(", ")));

    let proceed = config.force
        || !config.interactive
        || confirmer.confirm(
            &format!("install missing tools ({})?", names.join(", ")),
            true,
        );

    if !proceed {
        return Ok(Some(PreflightDecision::Abort("no-consent".to_string())));
    }

    for tool in tools {
        // Cert tooling installed non-interactively is a no-op skip: its
        // absence is a warning, never a failure.
        if tool.id == "mkcert" && !config.interactive {
            reporter.start_step(&format!("install {}", tool.id));
            reporter.skip("non-interactive runs do not install certificate tooling");
            continue;
        }

        reporter.start_step(&format!("install {}", tool.id));
        match (tool.installer)(runner, host) {
            Ok(()) => reporter.succeed("installed"),
            Err(err) => {
                if config.interactive && !config.force {
                    reporter.fail(&err.to_string());
                    return Ok(Some(PreflightDecision::Abort(format!(
                        "install-failed:{}",
                        tool.id
                    ))));
                } else {
                    reporter.warn(&format!("{err}; continuing"));
                }
            }
        }
    }

    Ok(None)
}

fn start_runtime(
    runner: &dyn CommandRunner,
    reporter: &Reporter,
    confirmer: &dyn Confirmer,
    config: &RunConfig,
    tool: &ToolDescriptor,
) -> Result<Option<PreflightDecision>, NimbusError> {
    let attempt = config.force
        || !config.interactive
        || confirmer.confirm(&format!("start {}?", tool.id), true);

    if !attempt {
        return Ok(Some(PreflightDecision::Abort(format!(
            "no-consent:start-{}",
            tool.id
        ))));
    }

    reporter.start_step(&format!("start {}", tool.id));
    let deadline = Instant::now() + Duration::from_secs(60);
    let operational = tool.operational_probe.expect("runtime tool must have an operational probe");

    while Instant::now() < deadline {
        if operational(runner) {
            reporter.succeed(&format!("{} is running", tool.id));
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(500));
    }

    let detail = format!("{} did not become operational within 60s", tool.id);
    if config.interactive && !config.force {
        reporter.fail(&detail);
        Ok(Some(PreflightDecision::Abort(format!(
            "runtime-start-failed:{}",
            tool.id
        ))))
    } else {
        reporter.warn(&format!("{detail}; continuing"));
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_is_sufficient_at_exact_recommendation() {
        let reading = MemoryReading {
            available_mb: 24_000,
            recommended_mb: 24_000,
        };
        assert!(reading.sufficient());
    }

    #[test]
    fn memory_is_insufficient_below_recommendation() {
        let reading = MemoryReading {
            available_mb: 18_000,
            recommended_mb: 24_000,
        };
        assert!(!reading.sufficient());
    }

    #[test]
    fn parses_mem_available_from_proc_meminfo_format() {
        let contents = "MemTotal:       32859140 kB\nMemFree:        10234 kB\nMemAvailable:   24576000 kB\n";
        assert_eq!(parse_mem_available_kb(contents), Some(24_576_000));
    }

    #[test]
    fn missing_mem_available_line_returns_none() {
        let contents = "MemTotal:       32859140 kB\n";
        assert_eq!(parse_mem_available_kb(contents), None);
    }

    fn reporter() -> (Reporter, tempfile::TempDir) {
        use crate::ledger::RunLedger;
        use crate::output::LineSink;
        let dir = tempfile::tempdir().unwrap();
        let ledger = RunLedger::create(dir.path().join("ledger.jsonl")).unwrap();
        (Reporter::new(Box::new(LineSink), ledger), dir)
    }

    fn non_interactive_config() -> RunConfig {
        RunConfig {
            interactive: false,
            force: true,
            deployment_mode: Some(crate::config::DeploymentMode::OssTenant),
            ..RunConfig::default()
        }
    }

    /// docker and podman are alternatives for one runtime requirement: a
    /// present+operational docker must not leave podman classified as
    /// missing or trigger an attempt to install it.
    #[test]
    fn an_operational_alternate_runtime_satisfies_the_group() {
        use crate::output::NonInteractiveConfirmer;
        use crate::testutil::{ScriptedResponse, ScriptedRunner};

        let runner = ScriptedRunner::new();
        for program in ["docker", "k3d", "kubectl", "argocd", "git", "mkcert"] {
            runner.script(program, ScriptedResponse::ok(Vec::new()));
        }
        // podman is left unscripted; the generic fallback returns exit 127
        // (not present).

        let (reporter, _dir) = reporter();
        let host = HostProfile::detect();
        let config = non_interactive_config();
        let result = run(&runner, &host, &reporter, &NonInteractiveConfirmer, &config).unwrap();

        assert!(result.proceeds());
        assert!(!result.missing_installable.contains(&"podman".to_string()));
        assert!(result.missing_runtime_dormant.is_empty());
        assert!(!runner.calls().iter().any(|c| c.starts_with("podman")));
    }

    /// Neither runtime present: only one representative of the group is
    /// reported as missing/installed, not both.
    #[test]
    fn missing_group_reports_a_single_representative() {
        use crate::output::NonInteractiveConfirmer;
        use crate::testutil::{ScriptedResponse, ScriptedRunner};

        let runner = ScriptedRunner::new();
        for program in ["k3d", "kubectl", "argocd", "git", "mkcert"] {
            runner.script(program, ScriptedResponse::ok(Vec::new()));
        }
        // docker and podman are both left unscripted (neither present).

        let (reporter, _dir) = reporter();
        let host = HostProfile::detect();
        let config = non_interactive_config();
        let result = run(&runner, &host, &reporter, &NonInteractiveConfirmer, &config).unwrap();

        let runtime_missing: Vec<&String> = result
            .missing_installable
            .iter()
            .filter(|id| id.as_str() == "docker" || id.as_str() == "podman")
            .collect();
        assert_eq!(runtime_missing.len(), 1);
    }
}
