//! Docktainer - builds and serves per-branch documentation sites.
//!
//! GitHub push webhooks trigger a clone or update of the pushed branch, a
//! site generator run, and an atomic publish into a per-branch directory.
//! The same server hosts every published branch on its own subdomain.

pub mod build;
pub mod config;
pub mod git;
pub mod notify;
pub mod pipeline;
pub mod process;
pub mod routing;
pub mod server;
pub mod store;
pub mod types;
pub mod webhooks;
pub mod worker;

#[cfg(test)]
pub mod test_utils;
