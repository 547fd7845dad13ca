//! Git access for the chart engine. Shells out to `git` the same way the
//! cluster engine shells out to `k3d` — no `git2`/libgit2 binding, since the
//! only operations needed are a shallow clone and, for pinned commits, a
//! checkout.

use crate::command_runner::{CommandRunner, CommandSpec};
use crate::error::NimbusError;
use crate::output::Reporter;
use std::path::{Path, PathBuf};

/// A 7-40 character hex string is treated as a commit id rather than a
/// branch or tag, since `--depth 1 --branch <rev>` cannot fetch an arbitrary
/// commit on most Git servers.
fn looks_like_commit_id(revision: &str) -> bool {
    (7..=40).contains(&revision.len()) && revision.chars().all(|c| c.is_ascii_hexdigit())
}

/// Clones `repo_url` at `revision` into `dest`, which must not already
/// exist. Branch/tag revisions get a depth-1 clone; commit ids get a full
/// clone followed by a checkout, since shallow clones can't fetch an
/// arbitrary commit.
pub fn clone_repo(
    runner: &dyn CommandRunner,
    reporter: &Reporter,
    repo_url: &str,
    revision: &str,
    dest: &Path,
) -> Result<PathBuf, NimbusError> {
    reporter.start_step(&format!("clone {repo_url}@{revision}"));

    let result = if looks_like_commit_id(revision) {
        let clone = runner.run(
            &CommandSpec::new("git", "git")
                .args(["clone", repo_url].map(str::to_string))
                .host_path_arg(dest.display().to_string()),
        )?;
        if !clone.success() {
            reporter.fail(&clone.stderr_str());
            return Err(NimbusError::ChartInstall(format!(
                "git clone failed: {}",
                clone.stderr_str()
            )));
        }
        runner.run(
            &CommandSpec::new("git", "git")
                .args(["checkout", revision].map(str::to_string))
                .cwd(dest.to_path_buf()),
        )?
    } else {
        runner.run(
            &CommandSpec::new("git", "git")
                .args(["clone", "--depth", "1", "--branch", revision, repo_url].map(str::to_string))
                .host_path_arg(dest.display().to_string()),
        )?
    };

    if !result.success() {
        let detail = result.stderr_str().to_string();
        reporter.fail(&detail);
        return Err(NimbusError::ChartInstall(format!("git checkout failed: {detail}")));
    }

    reporter.succeed(&dest.display().to_string());
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_ids_are_recognized_by_length_and_hex_digits() {
        assert!(looks_like_commit_id("a1b2c3d"));
        assert!(looks_like_commit_id(&"a".repeat(40)));
        assert!(!looks_like_commit_id("main"));
        assert!(!looks_like_commit_id("release-1.2"));
        assert!(!looks_like_commit_id(&"a".repeat(41)));
    }
}
