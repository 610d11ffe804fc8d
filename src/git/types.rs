//! Git data types shared across git operations

use serde::{Deserialize, Serialize};

/// Represents a git branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub is_head: bool,
    pub commit_id: String,
}

/// Represents a git worktree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub name: String,
    pub path: String,
    pub branch: Option<String>,
    pub is_locked: bool,
}

/// Result of a merge operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub success: bool,
    pub message: String,
    /// Files left in conflict when success is false
    pub conflict_files: Vec<String>,
    /// Paths changed by the merge when success is true
    pub merged_files: Vec<String>,
    pub commit_id: Option<String>,
    pub fast_forward: bool,
}

impl MergeOutcome {
    pub fn up_to_date() -> Self {
        Self {
            success: true,
            message: "Already up to date".to_string(),
            conflict_files: vec![],
            merged_files: vec![],
            commit_id: None,
            fast_forward: false,
        }
    }
}
