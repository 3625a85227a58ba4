//! Published output, one directory per branch.
//!
//! The store is the only place that mutates the html root. A branch's slot
//! is at any instant either absent or a complete build:
//!
//! 1. the new build is copied into a uniquely named `.staging-*` directory
//! 2. a first build is renamed into the slot; a replacement is exchanged
//!    with the slot in one `renameat2(RENAME_EXCHANGE)`
//! 3. the previous build, now under the staging name, is removed
//!
//! Where the exchange is unavailable the slot is renamed aside to
//! `.retired-*` before the staging directory takes its place, and renamed
//! back if that fails. Hidden names can never collide with a slot because
//! branch names may not start with `.`.

pub mod copy;
pub mod fsync;
pub mod swap;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::BranchName;

use self::copy::copy_tree;
use self::fsync::fsync_dir;

const STAGING_PREFIX: &str = ".staging-";
const RETIRED_PREFIX: &str = ".retired-";

/// Errors from publishing or removing a deployment.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("publish task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PublishError {
    fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> PublishError {
        let path = path.to_path_buf();
        move |source| PublishError::Io {
            action,
            path,
            source,
        }
    }
}

/// Summary of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub path: PathBuf,
    pub files: u64,
    /// True if an earlier build was replaced.
    pub replaced: bool,
}

/// Filesystem store of published branch builds.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    root: PathBuf,
}

impl DeploymentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DeploymentStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the branch's slot (whether or not it exists).
    pub fn slot_path(&self, branch: &BranchName) -> PathBuf {
        self.root.join(branch.slot_name())
    }

    /// Returns true if the branch currently has published output.
    pub fn exists(&self, branch: &BranchName) -> bool {
        self.slot_path(branch).is_dir()
    }

    /// Atomically replaces the branch's output with a copy of `output_dir`.
    pub async fn publish(
        &self,
        branch: &BranchName,
        output_dir: &Path,
    ) -> Result<Published, PublishError> {
        let store = self.clone();
        let slot = self.slot_path(branch);
        let output_dir = output_dir.to_path_buf();
        tokio::task::spawn_blocking(move || store.publish_blocking(&slot, &output_dir)).await?
    }

    /// Removes the branch's output. Returns false if there was none.
    pub async fn remove(&self, branch: &BranchName) -> Result<bool, PublishError> {
        let store = self.clone();
        let slot = self.slot_path(branch);
        tokio::task::spawn_blocking(move || store.remove_blocking(&slot)).await?
    }

    /// Deletes staging and retired directories left behind by a crash.
    ///
    /// Returns how many were removed.
    pub fn sweep_leftovers(&self) -> io::Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(STAGING_PREFIX) || name.starts_with(RETIRED_PREFIX) {
                info!(path = %entry.path().display(), "Removing leftover publish directory");
                std::fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn publish_blocking(&self, slot: &Path, output_dir: &Path) -> Result<Published, PublishError> {
        std::fs::create_dir_all(&self.root).map_err(PublishError::io("create", &self.root))?;

        let staging = self.hidden_path(STAGING_PREFIX);
        std::fs::create_dir(&staging).map_err(PublishError::io("create", &staging))?;

        let files = match copy_tree(output_dir, &staging) {
            Ok(files) => files,
            Err(e) => {
                discard(&staging);
                return Err(PublishError::io("copy build output from", output_dir)(e));
            }
        };
        debug!(staging = %staging.display(), files, "Staged build output");

        let replaced = slot.exists();
        if replaced {
            match self.swap_in(&staging, slot) {
                Ok(previous) => discard(&previous),
                Err(e) => {
                    discard(&staging);
                    return Err(e);
                }
            }
        } else if let Err(e) = std::fs::rename(&staging, slot) {
            discard(&staging);
            return Err(PublishError::io("swap in", slot)(e));
        }

        sync_root(&self.root);

        Ok(Published {
            path: slot.to_path_buf(),
            files,
            replaced,
        })
    }

    /// Puts `staging` in place of the existing `slot`.
    ///
    /// Returns where the previous build now lives. On error `staging` still
    /// holds the new build and `slot` the old one.
    fn swap_in(&self, staging: &Path, slot: &Path) -> Result<PathBuf, PublishError> {
        match swap::exchange(staging, slot) {
            Ok(true) => return Ok(staging.to_path_buf()),
            Ok(false) => debug!(slot = %slot.display(), "Directory exchange unavailable, swapping with renames"),
            Err(e) => return Err(PublishError::io("swap in", slot)(e)),
        }

        let retired = self.hidden_path(RETIRED_PREFIX);
        std::fs::rename(slot, &retired).map_err(PublishError::io("retire", slot))?;
        if let Err(e) = std::fs::rename(staging, slot) {
            if let Err(restore) = std::fs::rename(&retired, slot) {
                warn!(
                    slot = %slot.display(),
                    error = %restore,
                    "Failed to restore previous deployment"
                );
            }
            return Err(PublishError::io("swap in", slot)(e));
        }
        Ok(retired)
    }

    fn remove_blocking(&self, slot: &Path) -> Result<bool, PublishError> {
        if !slot.exists() {
            return Ok(false);
        }

        let retired = self.hidden_path(RETIRED_PREFIX);
        std::fs::rename(slot, &retired).map_err(PublishError::io("retire", slot))?;
        sync_root(&self.root);
        std::fs::remove_dir_all(&retired).map_err(PublishError::io("remove", &retired))?;
        Ok(true)
    }

    fn hidden_path(&self, prefix: &str) -> PathBuf {
        self.root.join(format!("{prefix}{}", Uuid::new_v4().simple()))
    }
}

/// Best-effort removal of a scratch directory.
fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        warn!(path = %path.display(), error = %e, "Failed to remove scratch directory");
    }
}

fn sync_root(root: &Path) {
    if let Err(e) = fsync_dir(root) {
        warn!(root = %root.display(), error = %e, "Failed to fsync html root");
    }
}
