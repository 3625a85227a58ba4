//! Git operations for working trees.
//!
//! Each branch gets its own clone under the repos root. Operations are:
//! - first-time clone of a single branch
//! - fetch + hard reset to `origin/<branch>` on subsequent builds
//! - `ls-remote --heads` for startup reconciliation (no checkout needed)
//!
//! All commands run through a [`ProcessRunner`] with a clean git
//! environment and a bounded timeout.

pub mod remote;

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::process::{CommandSpec, ProcessError, ProcessRunner};
use crate::types::{BranchName, RepositoryUrl};

pub use remote::parse_ls_remote_heads;

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git ran but exited unsuccessfully.
    #[error("git command failed: {command}\n{detail}")]
    CommandFailed { command: String, detail: String },

    /// Git could not be run to completion.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Preparing the working tree location failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Git client bound to a process runner and a per-command timeout.
pub struct Git<'a, R> {
    runner: &'a R,
    timeout: Duration,
}

impl<'a, R: ProcessRunner> Git<'a, R> {
    pub fn new(runner: &'a R, timeout: Duration) -> Self {
        Git { runner, timeout }
    }

    /// Clones only `branch` of `url` into `dest`.
    ///
    /// The parent of `dest` is created if needed; `dest` itself must not
    /// exist yet.
    pub async fn clone_branch(
        &self,
        url: &RepositoryUrl,
        branch: &BranchName,
        dest: &Path,
    ) -> GitResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let dest_str = dest.to_string_lossy();
        let spec = self
            .command(None)
            .args(["clone", "--branch", branch.as_str(), "--single-branch"])
            .arg("--")
            .arg(url.expose())
            .arg(dest_str.as_ref());
        let shown = format!(
            "git clone --branch {branch} --single-branch -- {} {dest_str}",
            url.redacted()
        );

        self.run(spec, shown).await.map(|_| ())
    }

    /// Fetches all remotes in an existing working tree.
    pub async fn fetch_all(&self, tree: &Path) -> GitResult<()> {
        let spec = self.command(Some(tree)).args(["fetch", "--all", "--prune"]);
        let shown = spec.display();
        self.run(spec, shown).await.map(|_| ())
    }

    /// Hard-resets the working tree to `origin/<branch>`.
    pub async fn reset_hard(&self, tree: &Path, branch: &BranchName) -> GitResult<()> {
        let target = format!("origin/{branch}");
        let spec = self
            .command(Some(tree))
            .args(["reset", "--hard", target.as_str()]);
        let shown = spec.display();
        self.run(spec, shown).await.map(|_| ())
    }

    /// Lists the branch heads of a remote repository without cloning it.
    pub async fn ls_remote_heads(&self, url: &RepositoryUrl) -> GitResult<Vec<BranchName>> {
        let spec = self
            .command(None)
            .args(["ls-remote", "--heads", "--"])
            .arg(url.expose());
        let shown = format!("git ls-remote --heads -- {}", url.redacted());

        let stdout = self.run(spec, shown).await?;
        Ok(parse_ls_remote_heads(&stdout))
    }

    /// Base git command with a reproducible, non-interactive environment.
    ///
    /// With a working tree, `-C <tree>` is passed so the command never
    /// depends on the process cwd.
    fn command(&self, tree: Option<&Path>) -> CommandSpec {
        let mut spec = CommandSpec::new("git", self.timeout)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_CONFIG_GLOBAL", "/dev/null")
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(tree) = tree {
            spec = spec.arg("-C").arg(tree.to_string_lossy());
        }
        spec
    }

    /// Runs a git command, mapping a non-zero exit to [`GitError::CommandFailed`].
    ///
    /// `shown` is the command as it may appear in logs (credentials removed).
    async fn run(&self, spec: CommandSpec, shown: String) -> GitResult<String> {
        debug!(command = %shown, "Running git");
        let output = self.runner.run(spec).await?;

        if output.success() {
            Ok(output.stdout)
        } else {
            let detail = match output.diagnostic() {
                "" => output.exit_description(),
                text => text.to_string(),
            };
            Err(GitError::CommandFailed {
                command: shown,
                detail,
            })
        }
    }
}
