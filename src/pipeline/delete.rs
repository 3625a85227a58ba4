use tracing::{debug, error, info};

use super::{DeleteOutcome, Deployer};
use crate::notify::{Notification, Notifier};
use crate::process::ProcessRunner;
use crate::types::BranchName;

impl<R: ProcessRunner, N: Notifier> Deployer<R, N> {
    /// Removes the branch's published output.
    ///
    /// The working tree is kept. A deletion notification is sent only when
    /// something was actually removed.
    pub async fn delete(&self, branch: &BranchName) -> DeleteOutcome {
        match self.store.remove(branch).await {
            Ok(true) => {
                info!(branch = %branch, "Deployment deleted");
                self.notifier
                    .notify(Notification::branch_deleted(
                        branch,
                        self.config.site_url(branch),
                    ))
                    .await;
                DeleteOutcome::Removed
            }
            Ok(false) => {
                debug!(branch = %branch, "No deployment to delete");
                DeleteOutcome::NotPresent
            }
            Err(e) => {
                error!(branch = %branch, error = %e, "Failed to delete deployment");
                DeleteOutcome::Failed(e.to_string())
            }
        }
    }
}
