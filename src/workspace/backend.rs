//! Version-control backend abstraction
//!
//! The WorkspaceManager only needs two capabilities from version control:
//! create an isolated branch-backed copy, and integrate (or throw away) its
//! changes. Anything satisfying this trait is substitutable, which lets
//! tests run against a fake instead of a real repository.

use crate::git::{GitManager, MergeOutcome};
use crate::utils::ResultExt;
use std::path::Path;

/// Integration mode for a workspace's branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Single combined commit with a supplied message
    Squash,
    /// Preserve the worker's commit history
    Merge,
}

/// Minimal version-control surface required by the WorkspaceManager
pub trait VcsBackend: Send + Sync {
    /// Create a worktree at `path` on a new branch off the current head
    fn create_worktree(&self, repo_path: &Path, branch: &str, path: &Path)
        -> Result<(), String>;

    /// Integrate `branch` into `target` using the given strategy
    fn merge(
        &self,
        repo_path: &Path,
        branch: &str,
        target: &str,
        strategy: MergeStrategy,
        message: &str,
    ) -> Result<MergeOutcome, String>;

    /// Remove the worktree at `path`
    fn remove_worktree(&self, repo_path: &Path, path: &Path) -> Result<(), String>;

    /// Delete `branch` if it exists; missing branches are not an error
    fn delete_branch(&self, repo_path: &Path, branch: &str) -> Result<(), String>;

    /// Clean up stale worktree bookkeeping, returning the number pruned
    fn prune_orphaned(&self, repo_path: &Path) -> Result<u32, String>;
}

/// Production backend built on git2
pub struct GitBackend;

impl GitBackend {
    fn open(&self, repo_path: &Path) -> Result<GitManager, String> {
        GitManager::new(repo_path).with_context("Failed to open git repository")
    }
}

impl VcsBackend for GitBackend {
    fn create_worktree(
        &self,
        repo_path: &Path,
        branch: &str,
        path: &Path,
    ) -> Result<(), String> {
        let git = self.open(repo_path)?;
        git.create_worktree(branch, path)
            .with_context("Failed to create worktree")?;
        Ok(())
    }

    fn merge(
        &self,
        repo_path: &Path,
        branch: &str,
        target: &str,
        strategy: MergeStrategy,
        message: &str,
    ) -> Result<MergeOutcome, String> {
        let git = self.open(repo_path)?;
        let outcome = match strategy {
            MergeStrategy::Squash => git
                .squash_branch(branch, target, message)
                .with_context("Squash merge failed")?,
            MergeStrategy::Merge => git
                .merge_branch(branch, target)
                .with_context("Merge failed")?,
        };

        // A conflicted history-preserving merge leaves the repository in a
        // merge state; reset it so the next workspace can integrate
        if !outcome.success && strategy == MergeStrategy::Merge {
            if let Err(e) = git.merge_abort() {
                log::warn!("[GitBackend] Failed to abort conflicted merge: {}", e);
            }
        }

        Ok(outcome)
    }

    fn remove_worktree(&self, repo_path: &Path, path: &Path) -> Result<(), String> {
        let git = self.open(repo_path)?;
        git.remove_worktree(path)
            .with_context("Failed to remove worktree")
    }

    fn delete_branch(&self, repo_path: &Path, branch: &str) -> Result<(), String> {
        let git = self.open(repo_path)?;
        if git.branch_exists(branch) {
            git.delete_branch(branch)
                .with_context("Failed to delete branch")?;
        }
        Ok(())
    }

    fn prune_orphaned(&self, repo_path: &Path) -> Result<u32, String> {
        let git = self.open(repo_path)?;
        git.prune_orphaned_worktrees()
            .with_context("Failed to prune worktrees")
    }
}
