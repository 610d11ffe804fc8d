//! Git operations using git2-rs
//!
//! Organized into focused submodules:
//! - `manager` - Core GitManager struct and basic operations
//! - `branches` - Branch operations (create, delete, checkout)
//! - `worktrees` - Worktree management (add, remove, prune)
//! - `merge` - Merge (history-preserving and squash) and conflict detection
//! - `types` - Shared data structures

mod branches;
mod manager;
mod merge;
#[cfg(test)]
mod tests;
mod types;
mod worktrees;

pub use manager::GitManager;
pub use types::{BranchInfo, MergeOutcome, WorktreeInfo};
