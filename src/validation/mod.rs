//! Branch and pull-request validators.
//!
//! These decide whether a branch name is newly usable, detect post-merge
//! reuse, and enforce "at most one live PR per branch lifecycle".

pub mod branch;
pub mod pr;

pub use branch::{BranchAvailability, BranchReuse, BranchValidator};
pub use pr::{PrAction, classify_pr_action};
