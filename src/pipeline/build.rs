//! Build pipeline: sync source, run the generator, publish.

use std::path::Path;

use tracing::{Instrument, error, info, info_span, warn};

use super::{BuildOutcome, Deployer, PipelineError, SourceSync};
use crate::build::{BuildVariant, detect_variant, run_build};
use crate::git::Git;
use crate::notify::{Notification, Notifier};
use crate::process::ProcessRunner;
use crate::store::Published;
use crate::types::{BranchName, RepositoryUrl};

impl<R: ProcessRunner, N: Notifier> Deployer<R, N> {
    /// Builds `branch` from `url` and publishes the result.
    ///
    /// With `notify` set, a start notification is sent first and exactly one
    /// success or failure notification at the end. Failures leave any
    /// previously published output untouched.
    pub async fn build(
        &self,
        branch: &BranchName,
        url: &RepositoryUrl,
        notify: bool,
    ) -> BuildOutcome {
        let span = info_span!("build", branch = %branch, repository = %url);
        self.build_inner(branch, url, notify).instrument(span).await
    }

    async fn build_inner(
        &self,
        branch: &BranchName,
        url: &RepositoryUrl,
        notify: bool,
    ) -> BuildOutcome {
        let site_url = self.config.site_url(branch);
        info!(notify, "Build started");
        if notify {
            self.notifier
                .notify(Notification::build_started(branch, &site_url))
                .await;
        }

        match self.run_stages(branch, url).await {
            Ok((variant, source, published)) => {
                info!(
                    variant = %variant,
                    source = ?source,
                    files = published.files,
                    replaced = published.replaced,
                    url = %site_url,
                    "Build published"
                );
                if notify {
                    self.notifier
                        .notify(Notification::build_succeeded(branch, site_url))
                        .await;
                }
                BuildOutcome::Published {
                    variant,
                    source,
                    published,
                }
            }
            Err(e) => {
                let stage = e.stage();
                let detail = e.detail();
                error!(stage = %stage, error = %e, "Build failed");
                if notify {
                    self.notifier
                        .notify(Notification::build_failed(branch, site_url, detail.clone()))
                        .await;
                }
                BuildOutcome::Failed { stage, detail }
            }
        }
    }

    async fn run_stages(
        &self,
        branch: &BranchName,
        url: &RepositoryUrl,
    ) -> Result<(BuildVariant, SourceSync, Published), PipelineError> {
        let tree = self.working_tree(branch);
        let source = self.sync_source(branch, url, &tree).await?;

        let variant = detect_variant(&tree);
        info!(variant = %variant, "Detected site generator");

        let output = run_build(&self.runner, variant, &tree, self.config.build_timeout).await?;
        let published = self.store.publish(branch, &output).await?;
        Ok((variant, source, published))
    }

    /// Clones on first use, otherwise fetches and hard-resets.
    async fn sync_source(
        &self,
        branch: &BranchName,
        url: &RepositoryUrl,
        tree: &Path,
    ) -> Result<SourceSync, PipelineError> {
        let git = Git::new(&self.runner, self.config.git_timeout);

        if is_dir(tree).await && !is_dir(&tree.join(".git")).await {
            // Left behind by an interrupted clone; git refuses to clone over it.
            warn!(tree = %tree.display(), "Working tree is not a git repository, recloning");
            tokio::fs::remove_dir_all(tree)
                .await
                .map_err(|e| PipelineError::SourceControl(e.into()))?;
        }

        if is_dir(tree).await {
            git.fetch_all(tree).await?;
            git.reset_hard(tree, branch).await?;
            info!("Working tree updated");
            Ok(SourceSync::Updated)
        } else {
            git.clone_branch(url, branch, tree).await?;
            info!("Working tree cloned");
            Ok(SourceSync::Cloned)
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
