//! Startup backfill of deployments for branches that were never built.
//!
//! Lists the remote's heads once and queues a silent build for every branch
//! without published output. Branches that already have output are left
//! alone; they are rebuilt on their next push.

use thiserror::Error;
use tracing::{debug, info};

use crate::git::{Git, GitError};
use crate::notify::Notifier;
use crate::process::ProcessRunner;
use crate::types::{BranchName, RepositoryUrl};
use crate::worker::{BranchJob, DispatchError, Dispatcher};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to list remote branches: {0}")]
    ListHeads(#[from] GitError),

    #[error("failed to queue build: {0}")]
    Dispatch(#[from] DispatchError),
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Number of branch heads on the remote.
    pub listed: usize,
    /// Branches queued for a build, in remote order.
    pub queued: Vec<BranchName>,
}

/// Runs one reconciliation pass against `url`.
///
/// The first error abandons the pass; builds queued before it still run.
pub async fn reconcile<R: ProcessRunner, N: Notifier>(
    dispatcher: &Dispatcher<R, N>,
    url: &RepositoryUrl,
) -> Result<ReconcileReport, ReconcileError> {
    let deployer = dispatcher.deployer();
    let git = Git::new(deployer.runner(), deployer.config().git_timeout);

    info!(repository = %url, "Reconciling deployments with remote branches");
    let heads = git.ls_remote_heads(url).await?;

    let mut report = ReconcileReport {
        listed: heads.len(),
        queued: Vec::new(),
    };
    for branch in heads {
        if deployer.store().exists(&branch) {
            debug!(branch = %branch, "Deployment present");
            continue;
        }
        dispatcher
            .submit(
                &branch,
                BranchJob::Build {
                    url: url.clone(),
                    notify: false,
                },
            )
            .await?;
        report.queued.push(branch);
    }

    info!(
        listed = report.listed,
        queued = report.queued.len(),
        "Reconciliation queued missing builds"
    );
    Ok(report)
}
