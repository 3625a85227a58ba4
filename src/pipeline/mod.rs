//! Branch build and deletion pipelines.
//!
//! A [`Deployer`] owns everything a pipeline run needs: the configuration,
//! a [`ProcessRunner`] for git and build tools, a [`Notifier`], and the
//! [`DeploymentStore`]. It has no per-branch state of its own; callers are
//! responsible for never running two pipelines for the same branch at once
//! (the [`crate::worker::Dispatcher`] guarantees this).

mod build;
mod delete;
pub mod reconcile;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::build::{BuildError, BuildVariant};
use crate::config::Config;
use crate::git::GitError;
use crate::notify::Notifier;
use crate::process::ProcessRunner;
use crate::store::{DeploymentStore, PublishError, Published};
use crate::types::BranchName;

pub use reconcile::{ReconcileError, ReconcileReport, reconcile};

/// Pipeline stage at which a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    SourceControl,
    Build,
    Publish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::SourceControl => "source control",
            Stage::Build => "build",
            Stage::Publish => "publish",
        })
    }
}

/// How the working tree was brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSync {
    /// First build of the branch: fresh clone.
    Cloned,
    /// Existing tree fetched and reset to the remote head.
    Updated,
}

/// A failed pipeline run, tagged by stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source control: {0}")]
    SourceControl(#[from] GitError),

    #[error("build: {0}")]
    Build(#[from] BuildError),

    #[error("publish: {0}")]
    Publish(#[from] PublishError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::SourceControl(_) => Stage::SourceControl,
            PipelineError::Build(_) => Stage::Build,
            PipelineError::Publish(_) => Stage::Publish,
        }
    }

    /// Text attached to a failure notification.
    pub fn detail(&self) -> String {
        match self {
            PipelineError::SourceControl(e) => e.to_string(),
            PipelineError::Build(e) => e.excerpt(),
            PipelineError::Publish(e) => e.to_string(),
        }
    }
}

/// Final state of one build run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Published {
        variant: BuildVariant,
        source: SourceSync,
        published: Published,
    },
    Failed {
        stage: Stage,
        detail: String,
    },
}

impl BuildOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, BuildOutcome::Published { .. })
    }
}

/// Final state of one deletion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    /// Nothing was published; no notification was sent.
    NotPresent,
    Failed(String),
}

/// Runs the build and deletion pipelines.
pub struct Deployer<R, N> {
    config: Arc<Config>,
    runner: R,
    notifier: N,
    store: DeploymentStore,
}

impl<R: ProcessRunner, N: Notifier> Deployer<R, N> {
    pub fn new(config: Arc<Config>, runner: R, notifier: N) -> Self {
        let store = DeploymentStore::new(&config.paths.html_root);
        Deployer {
            config,
            runner,
            notifier,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &DeploymentStore {
        &self.store
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Location of the branch's working tree.
    pub fn working_tree(&self, branch: &BranchName) -> PathBuf {
        self.config.paths.repos_root.join(branch.slot_name())
    }
}
