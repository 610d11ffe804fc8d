//! Merge handling for GitManager
//!
//! Two integration modes: a history-preserving merge and a squash merge that
//! lands the source branch as one commit. Conflicts are always surfaced as a
//! file list, never auto-resolved.

use git2::{build::CheckoutBuilder, BranchType, Error as GitError, Index, MergeOptions, Tree};

use crate::git::types::MergeOutcome;
use crate::git::GitManager;

impl GitManager {
    /// Merge a source branch into a target branch, preserving history
    pub fn merge_branch(&self, source: &str, target: &str) -> Result<MergeOutcome, GitError> {
        log::info!("[GitManager] Merging {} into {}", source, target);

        self.checkout_branch(target)?;

        let source_ref = self.repo.find_branch(source, BranchType::Local)?;
        let source_commit = source_ref.get().peel_to_commit()?;
        let annotated_commit = self.repo.find_annotated_commit(source_commit.id())?;

        let (analysis, _preference) = self.repo.merge_analysis(&[&annotated_commit])?;

        if analysis.is_up_to_date() {
            log::info!("[GitManager] Already up to date");
            return Ok(MergeOutcome::up_to_date());
        }

        let old_head_tree = self.repo.head()?.peel_to_commit()?.tree()?;

        if analysis.is_fast_forward() {
            log::info!("[GitManager] Fast-forward merge possible");

            let target_ref_name = format!("refs/heads/{}", target);
            let mut target_ref = self.repo.find_reference(&target_ref_name)?;
            target_ref.set_target(
                source_commit.id(),
                &format!("Fast-forward merge {} into {}", source, target),
            )?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::default().force()))?;

            let merged_files = self.changed_paths(&old_head_tree, &source_commit.tree()?)?;

            return Ok(MergeOutcome {
                success: true,
                message: format!("Fast-forward merged {} into {}", source, target),
                conflict_files: vec![],
                merged_files,
                commit_id: Some(source_commit.id().to_string()),
                fast_forward: true,
            });
        }

        // Normal merge
        let mut merge_opts = MergeOptions::new();
        let mut checkout_opts = CheckoutBuilder::new();
        checkout_opts.safe();

        self.repo.merge(
            &[&annotated_commit],
            Some(&mut merge_opts),
            Some(&mut checkout_opts),
        )?;

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            let conflict_files = list_conflicts(&index)?;
            log::warn!("[GitManager] Merge has conflicts: {:?}", conflict_files);
            return Ok(MergeOutcome {
                success: false,
                message: format!("Merge conflicts in {} file(s)", conflict_files.len()),
                conflict_files,
                merged_files: vec![],
                commit_id: None,
                fast_forward: false,
            });
        }

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let head_commit = self.repo.head()?.peel_to_commit()?;
        let signature = self.signature()?;

        let merge_commit = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &format!("Merge branch '{}' into '{}'", source, target),
            &tree,
            &[&head_commit, &source_commit],
        )?;

        self.repo.cleanup_state()?;

        let merged_files = self.changed_paths(&old_head_tree, &tree)?;
        log::info!("[GitManager] Merge successful: {}", merge_commit);

        Ok(MergeOutcome {
            success: true,
            message: format!("Successfully merged {} into {}", source, target),
            conflict_files: vec![],
            merged_files,
            commit_id: Some(merge_commit.to_string()),
            fast_forward: false,
        })
    }

    /// Squash-merge a source branch into a target branch as a single commit
    /// with the supplied message. The source branch's own history is not
    /// carried over.
    pub fn squash_branch(
        &self,
        source: &str,
        target: &str,
        message: &str,
    ) -> Result<MergeOutcome, GitError> {
        log::info!("[GitManager] Squash-merging {} into {}", source, target);

        self.checkout_branch(target)?;

        let source_ref = self.repo.find_branch(source, BranchType::Local)?;
        let source_commit = source_ref.get().peel_to_commit()?;
        let head_commit = self.repo.head()?.peel_to_commit()?;

        // Merge in-memory so a conflicted squash leaves the workdir untouched
        let merge_opts = MergeOptions::new();
        let mut index =
            self.repo
                .merge_commits(&head_commit, &source_commit, Some(&merge_opts))?;

        if index.has_conflicts() {
            let conflict_files = list_conflicts(&index)?;
            log::warn!("[GitManager] Squash merge has conflicts: {:?}", conflict_files);
            return Ok(MergeOutcome {
                success: false,
                message: format!("Merge conflicts in {} file(s)", conflict_files.len()),
                conflict_files,
                merged_files: vec![],
                commit_id: None,
                fast_forward: false,
            });
        }

        let tree_id = index.write_tree_to(&self.repo)?;
        let tree = self.repo.find_tree(tree_id)?;
        let head_tree = head_commit.tree()?;

        if tree.id() == head_tree.id() {
            log::info!("[GitManager] Already up to date");
            return Ok(MergeOutcome::up_to_date());
        }

        let signature = self.signature()?;
        let commit_id = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&head_commit],
        )?;

        self.repo
            .checkout_head(Some(CheckoutBuilder::default().force()))?;

        let merged_files = self.changed_paths(&head_tree, &tree)?;
        log::info!("[GitManager] Squash merge successful: {}", commit_id);

        Ok(MergeOutcome {
            success: true,
            message: format!("Squashed {} into {}", source, target),
            conflict_files: vec![],
            merged_files,
            commit_id: Some(commit_id.to_string()),
            fast_forward: false,
        })
    }

    /// Abort an ongoing merge by resetting to HEAD
    pub fn merge_abort(&self) -> Result<(), GitError> {
        log::info!("[GitManager] Aborting merge");

        let head = self.repo.head()?.peel_to_commit()?;
        self.repo
            .reset(head.as_object(), git2::ResetType::Hard, None)?;
        self.repo.cleanup_state()?;

        Ok(())
    }

    /// Check whether merging source into target would conflict, without
    /// touching the working directory. Returns the conflicting paths.
    pub fn check_merge_conflicts(
        &self,
        source: &str,
        target: &str,
    ) -> Result<Vec<String>, GitError> {
        let source_ref = self.repo.find_branch(source, BranchType::Local)?;
        let target_ref = self.repo.find_branch(target, BranchType::Local)?;

        let source_commit = source_ref.get().peel_to_commit()?;
        let target_commit = target_ref.get().peel_to_commit()?;

        let merge_opts = MergeOptions::new();
        let index =
            self.repo
                .merge_commits(&target_commit, &source_commit, Some(&merge_opts))?;

        if index.has_conflicts() {
            list_conflicts(&index)
        } else {
            Ok(Vec::new())
        }
    }

    /// Paths that differ between two trees
    pub(crate) fn changed_paths(
        &self,
        old_tree: &Tree,
        new_tree: &Tree,
    ) -> Result<Vec<String>, GitError> {
        let diff = self
            .repo
            .diff_tree_to_tree(Some(old_tree), Some(new_tree), None)?;

        let mut paths = Vec::new();
        for delta in diff.deltas() {
            if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                paths.push(path.to_string_lossy().to_string());
            }
        }
        Ok(paths)
    }
}

/// Collect conflicted paths from an index
fn list_conflicts(index: &Index) -> Result<Vec<String>, GitError> {
    let mut conflict_files = Vec::new();
    for conflict in index.conflicts()?.flatten() {
        if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
            conflict_files.push(String::from_utf8_lossy(&entry.path).to_string());
        }
    }
    Ok(conflict_files)
}
