//! Routing of branch jobs to per-branch workers.
//!
//! ```text
//!                                  ┌──────────────────┐
//!                             ┌──► │  branch A queue  │ ──► worker A ──┐
//! ┌───────────┐   ┌────────┐  │    └──────────────────┘                │   ┌───────────┐
//! │  webhook  │──►│ submit │──┤                                        ├──►│ semaphore │
//! │ reconcile │   │   by   │  │    ┌──────────────────┐                │   │ (N jobs)  │
//! └───────────┘   │ branch │  └──► │  branch B queue  │ ──► worker B ──┘   └───────────┘
//!                 └────────┘       └──────────────────┘
//! ```
//!
//! Workers are spawned lazily on the first job for a branch. A worker that
//! has nothing to do releases its entry and exits: after a deletion, or once
//! it has been idle for the idle timeout. Jobs for one branch never overlap;
//! jobs for different branches run concurrently, bounded by a shared
//! semaphore.
//!
//! Jobs are only sent while the registry lock is held, and a worker only
//! releases its entry under the write lock after finding its channel empty,
//! so a job can never land in the channel of a worker that is exiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{RwLock, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use super::branch::BranchWorker;
use super::message::BranchJob;
use crate::notify::Notifier;
use crate::pipeline::Deployer;
use crate::process::ProcessRunner;
use crate::types::BranchName;

/// Errors from submitting a job.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is shut down")]
    Closed,

    #[error("failed to send job to worker: channel closed")]
    ChannelClosed,
}

/// How long a worker waits for another job before exiting.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

struct WorkerHandle {
    id: u64,
    tx: mpsc::UnboundedSender<BranchJob>,
    task: JoinHandle<()>,
}

/// Live workers, keyed by branch.
#[derive(Default)]
pub(super) struct Workers {
    handles: HashMap<BranchName, WorkerHandle>,
    next_id: u64,
    closed: bool,
}

impl Workers {
    /// Removes the entry for `branch` if it still belongs to worker `id`.
    pub(super) fn release(&mut self, branch: &BranchName, id: u64) {
        if self.handles.get(branch).is_some_and(|handle| handle.id == id) {
            self.handles.remove(branch);
            debug!(branch = %branch, "Branch worker released");
        }
    }
}

/// Routes jobs to per-branch workers.
///
/// Safe to share across HTTP handler tasks.
pub struct Dispatcher<R, N> {
    deployer: Arc<Deployer<R, N>>,
    permits: Arc<Semaphore>,
    workers: Arc<RwLock<Workers>>,
    idle_timeout: Duration,
}

impl<R: ProcessRunner, N: Notifier> Dispatcher<R, N> {
    /// Creates a dispatcher allowing `max_concurrent` jobs at once.
    pub fn new(deployer: Arc<Deployer<R, N>>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        info!(max_concurrent, "Creating dispatcher");

        Dispatcher {
            deployer,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            workers: Arc::new(RwLock::new(Workers::default())),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Sets how long an idle worker lingers before exiting.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn deployer(&self) -> &Arc<Deployer<R, N>> {
        &self.deployer
    }

    /// Queues `job` on the branch's worker, spawning the worker if needed.
    ///
    /// Returns once the job is queued, not when it has run.
    #[instrument(skip(self, branch, job), fields(branch = %branch, job = job.kind()))]
    pub async fn submit(&self, branch: &BranchName, job: BranchJob) -> Result<(), DispatchError> {
        let job = {
            let workers = self.workers.read().await;
            if workers.closed {
                return Err(DispatchError::Closed);
            }
            match workers.handles.get(branch) {
                Some(handle) => match handle.tx.send(job) {
                    Ok(()) => {
                        debug!("Job submitted");
                        return Ok(());
                    }
                    Err(mpsc::error::SendError(job)) => job,
                },
                None => job,
            }
        };

        let mut workers = self.workers.write().await;
        if workers.closed {
            return Err(DispatchError::Closed);
        }
        // Double-check after acquiring write lock
        let job = match workers.handles.get(branch) {
            Some(handle) => match handle.tx.send(job) {
                Ok(()) => {
                    debug!("Job submitted");
                    return Ok(());
                }
                Err(mpsc::error::SendError(job)) => {
                    // Workers release their entry before exiting, so this
                    // one died (a job panicked); replace it.
                    error!(branch = %branch, "Branch worker exited unexpectedly, respawning");
                    job
                }
            },
            None => job,
        };

        let tx = self.spawn_worker(&mut workers, branch);
        tx.send(job).map_err(|_| DispatchError::ChannelClosed)?;
        debug!("Job submitted");
        Ok(())
    }

    fn spawn_worker(
        &self,
        workers: &mut Workers,
        branch: &BranchName,
    ) -> mpsc::UnboundedSender<BranchJob> {
        let id = workers.next_id;
        workers.next_id += 1;

        debug!(branch = %branch, id, "Spawning branch worker");
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = BranchWorker::new(
            branch.clone(),
            id,
            Arc::clone(&self.deployer),
            Arc::clone(&self.permits),
            Arc::clone(&self.workers),
            self.idle_timeout,
        );
        let task = tokio::spawn(worker.run(rx));

        workers.handles.insert(
            branch.clone(),
            WorkerHandle {
                id,
                tx: tx.clone(),
                task,
            },
        );
        tx
    }

    /// Returns the number of live workers.
    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.handles.len()
    }

    pub async fn has_worker(&self, branch: &BranchName) -> bool {
        self.workers.read().await.handles.contains_key(branch)
    }

    /// Stops accepting jobs and waits for every worker to finish.
    ///
    /// Jobs already queued still run. Later calls to [`Dispatcher::submit`]
    /// fail with [`DispatchError::Closed`].
    pub async fn close(&self) {
        let handles: Vec<(BranchName, WorkerHandle)> = {
            let mut workers = self.workers.write().await;
            workers.closed = true;
            workers.handles.drain().collect()
        };
        info!(workers = handles.len(), "Closing dispatcher");

        for (branch, handle) in handles {
            drop(handle.tx);
            if let Err(e) = handle.task.await {
                error!(branch = %branch, error = %e, "Branch worker failed");
            }
        }
        info!("All branch workers stopped");
    }
}
