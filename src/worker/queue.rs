//! Pending jobs for a single branch.
//!
//! Jobs run in arrival order with one exception: a build queued directly
//! behind another build is merged into it. Building twice in a row would
//! publish the same remote head twice, so the pair collapses to a single
//! build of the newest request, notifying if either request asked to.
//! Deletes are never merged and act as a barrier between builds.

use std::collections::VecDeque;

use super::message::BranchJob;

#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<BranchJob>,
    coalesced: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a job, merging it into a trailing build when possible.
    ///
    /// Returns true if the job was merged rather than appended.
    pub fn push(&mut self, job: BranchJob) -> bool {
        if let (
            Some(BranchJob::Build {
                url: queued_url,
                notify: queued_notify,
            }),
            BranchJob::Build { url, notify },
        ) = (self.jobs.back_mut(), &job)
        {
            *queued_url = url.clone();
            *queued_notify |= *notify;
            self.coalesced += 1;
            return true;
        }

        self.jobs.push_back(job);
        false
    }

    pub fn pop(&mut self) -> Option<BranchJob> {
        self.jobs.pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs merged away since creation.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}
