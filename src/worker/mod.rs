//! Per-branch job processing.
//!
//! Each branch gets a dedicated worker that runs its jobs serially, while
//! different branches build concurrently up to a global limit.
//!
//! # Module Structure
//!
//! - [`dispatch`]: routes jobs to workers, spawning them on demand
//! - [`queue`]: per-branch pending jobs with build coalescing
//! - [`message`]: job types

mod branch;
pub mod dispatch;
mod message;
mod queue;

pub use dispatch::{DispatchError, Dispatcher};
pub use message::BranchJob;
pub use queue::JobQueue;
