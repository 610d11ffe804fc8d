//! Branch operations for GitManager

use git2::{Branch, BranchType, Error as GitError, Signature};

use crate::git::types::BranchInfo;
use crate::git::GitManager;

impl GitManager {
    /// Create a new branch from the current HEAD
    pub fn create_branch(&self, name: &str, force: bool) -> Result<BranchInfo, GitError> {
        // Handle the unborn-branch case for freshly initialized repositories
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                log::info!("[GitManager] No commits found, creating initial commit");
                self.create_initial_commit()?;
                self.repo.head()?
            }
            Err(e) => return Err(e),
        };

        let head_commit = head.peel_to_commit()?;
        let branch = self.repo.branch(name, &head_commit, force)?;

        self.branch_to_info(&branch)
    }

    /// Create an initial empty commit for a new repository
    pub(crate) fn create_initial_commit(&self) -> Result<(), GitError> {
        let tree_id = self.repo.index()?.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let signature = self.signature()?;

        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            "Initial commit (created by taskcrew)",
            &tree,
            &[],
        )?;

        Ok(())
    }

    /// Delete a branch
    pub fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        let mut branch = self.repo.find_branch(name, BranchType::Local)?;
        branch.delete()?;
        Ok(())
    }

    /// Check whether a local branch exists
    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    /// Get the currently checked-out branch
    pub fn get_current_branch(&self) -> Result<BranchInfo, GitError> {
        let head = self.repo.head()?;
        if !head.is_branch() {
            return Err(GitError::from_str("HEAD is not on a branch"));
        }

        let name = head
            .shorthand()
            .ok_or_else(|| GitError::from_str("Branch name is not valid UTF-8"))?
            .to_string();
        let commit = head.peel_to_commit()?;

        Ok(BranchInfo {
            name,
            is_head: true,
            commit_id: commit.id().to_string(),
        })
    }

    /// Checkout a branch by name
    pub fn checkout_branch(&self, name: &str) -> Result<(), GitError> {
        let branch = self.repo.find_branch(name, BranchType::Local)?;
        let reference = branch.get();
        let tree = reference.peel_to_tree()?;

        self.repo.checkout_tree(tree.as_object(), None)?;
        self.repo.set_head(
            reference
                .name()
                .ok_or_else(|| GitError::from_str("Branch reference has no name"))?,
        )?;

        Ok(())
    }

    /// Repository signature, falling back to a fixed crew identity
    pub(crate) fn signature(&self) -> Result<Signature<'static>, GitError> {
        self.repo
            .signature()
            .or_else(|_| Signature::now("taskcrew", "crew@taskcrew.local"))
    }

    /// Convert a Branch to BranchInfo
    pub(crate) fn branch_to_info(&self, branch: &Branch) -> Result<BranchInfo, GitError> {
        let name = branch
            .name()?
            .ok_or_else(|| GitError::from_str("Branch name is not valid UTF-8"))?
            .to_string();
        let is_head = branch.is_head();
        let commit = branch.get().peel_to_commit()?;

        Ok(BranchInfo {
            name,
            is_head,
            commit_id: commit.id().to_string(),
        })
    }
}
