//! Core domain identifiers.

pub mod branch;

pub use branch::{BRANCH_REF_PREFIX, BranchName, InvalidBranchName, RepositoryUrl};
