//! The per-branch worker loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{RwLock, Semaphore, mpsc};
use tracing::{debug, info, warn};

use super::dispatch::Workers;
use super::message::BranchJob;
use super::queue::JobQueue;
use crate::notify::Notifier;
use crate::pipeline::Deployer;
use crate::process::ProcessRunner;
use crate::types::BranchName;

/// Runs jobs for one branch, strictly one at a time.
pub(super) struct BranchWorker<R, N> {
    branch: BranchName,
    id: u64,
    deployer: Arc<Deployer<R, N>>,
    permits: Arc<Semaphore>,
    registry: Arc<RwLock<Workers>>,
    idle_timeout: Duration,
    queue: JobQueue,
}

impl<R: ProcessRunner, N: Notifier> BranchWorker<R, N> {
    pub(super) fn new(
        branch: BranchName,
        id: u64,
        deployer: Arc<Deployer<R, N>>,
        permits: Arc<Semaphore>,
        registry: Arc<RwLock<Workers>>,
        idle_timeout: Duration,
    ) -> Self {
        BranchWorker {
            branch,
            id,
            deployer,
            permits,
            registry,
            idle_timeout,
            queue: JobQueue::new(),
        }
    }

    /// Processes jobs until the channel is closed or the worker retires.
    ///
    /// Anything that arrives while a job is running or waiting for a permit
    /// is folded into the queue before the next job is chosen, so bursts of
    /// pushes collapse into a single build.
    pub(super) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BranchJob>) {
        debug!(branch = %self.branch, "Branch worker started");

        loop {
            if self.queue.is_empty() {
                match tokio::time::timeout(self.idle_timeout, rx.recv()).await {
                    Ok(Some(job)) => self.enqueue(job),
                    Ok(None) => break,
                    Err(_) => {
                        if self.retire(&mut rx).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(branch = %self.branch, pending = self.queue.len(), "Job permits closed, dropping queue");
                    break;
                }
            };

            while let Ok(job) = rx.try_recv() {
                self.enqueue(job);
            }

            let Some(job) = self.queue.pop() else {
                continue;
            };
            let deleted = matches!(job, BranchJob::Delete);
            self.execute(job).await;
            drop(permit);

            // A deleted branch is unlikely to see more work soon.
            if deleted && self.queue.is_empty() && self.retire(&mut rx).await {
                break;
            }
        }

        debug!(
            branch = %self.branch,
            coalesced = self.queue.coalesced(),
            "Branch worker stopped"
        );
    }

    /// Releases this worker's registry entry if no job is pending.
    ///
    /// Returns true when the worker should exit.
    async fn retire(&mut self, rx: &mut mpsc::UnboundedReceiver<BranchJob>) -> bool {
        let registry = Arc::clone(&self.registry);
        let mut workers = registry.write().await;
        match rx.try_recv() {
            Ok(job) => {
                self.enqueue(job);
                false
            }
            Err(TryRecvError::Empty) => {
                workers.release(&self.branch, self.id);
                true
            }
            Err(TryRecvError::Disconnected) => true,
        }
    }

    fn enqueue(&mut self, job: BranchJob) {
        let kind = job.kind();
        if self.queue.push(job) {
            info!(branch = %self.branch, "Coalesced queued build");
        } else {
            debug!(branch = %self.branch, job = kind, pending = self.queue.len(), "Job queued");
        }
    }

    async fn execute(&self, job: BranchJob) {
        debug!(branch = %self.branch, job = job.kind(), "Running job");
        match job {
            BranchJob::Build { url, notify } => {
                self.deployer.build(&self.branch, &url, notify).await;
            }
            BranchJob::Delete => {
                self.deployer.delete(&self.branch).await;
            }
        }
    }
}
