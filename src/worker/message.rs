//! Jobs sent to a per-branch worker.

use crate::types::RepositoryUrl;

/// A unit of work for one branch.
///
/// Workers receive these via `tokio::sync::mpsc` and run them one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchJob {
    /// Sync, build and publish the branch.
    Build {
        url: RepositoryUrl,
        /// Whether status notifications are sent for this build.
        /// Startup reconciliation builds run silently.
        notify: bool,
    },

    /// Remove the branch's published output.
    Delete,
}

impl BranchJob {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BranchJob::Build { .. } => "build",
            BranchJob::Delete => "delete",
        }
    }
}
