//! Isolated workspace management
//!
//! Every subtask gets its own branch-backed copy of the shared repository.
//! Workers mutate only their own workspace; an explicit, serialized merge
//! step is the only way changes reach the base branch, and conflicts are
//! surfaced rather than resolved.

mod backend;

pub use backend::{GitBackend, MergeStrategy, VcsBackend};

pub use crate::git::MergeOutcome;

use crate::models::{SubTask, Task};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Lifecycle status of a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Active,
    Merged,
    Discarded,
}

/// An isolated, branch-backed copy of the shared repository bound to one
/// (task, subtask) pair
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Owning task ID
    pub task_id: String,
    /// Owning subtask ID
    pub subtask_id: String,
    /// Filesystem path of the working copy
    pub path: PathBuf,
    /// Branch carrying this workspace's changes
    pub branch_name: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Current status
    pub status: WorkspaceStatus,
}

/// Result of integrating a workspace back into the base branch
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub success: bool,
    pub has_conflicts: bool,
    pub conflict_files: Vec<String>,
    pub merged_files: Vec<String>,
    pub commit_id: Option<String>,
    pub message: String,
}

/// Per-file outcome of a configuration sync
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedFile {
    pub path: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Manager owning the branch/filesystem lifecycle of all workspaces
pub struct WorkspaceManager {
    /// Path to the shared repository
    repo_path: PathBuf,
    /// Branch workspaces are created from and merged back into
    base_branch: String,
    /// Version-control backend
    backend: Box<dyn VcsBackend>,
    /// Registry keyed by (task_id, subtask_id)
    workspaces: HashMap<(String, String), Workspace>,
}

impl WorkspaceManager {
    pub fn new(repo_path: &Path, base_branch: &str, backend: Box<dyn VcsBackend>) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            base_branch: base_branch.to_string(),
            backend,
            workspaces: HashMap::new(),
        }
    }

    /// Production constructor using the git2 backend
    pub fn with_git(repo_path: &Path, base_branch: &str) -> Self {
        Self::new(repo_path, base_branch, Box::new(GitBackend))
    }

    /// Get the base branch workspaces merge back into
    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    /// Create an isolated workspace for a subtask
    ///
    /// Creates a new branch off the current head and a worktree for it.
    /// Backend errors (invalid repository, worktree failure) propagate.
    pub fn create_workspace(&mut self, task: &Task, subtask: &SubTask) -> Result<Workspace, String> {
        let key = (task.id.clone(), subtask.id.clone());
        if let Some(existing) = self.workspaces.get(&key) {
            return Ok(existing.clone());
        }

        let branch_name = format!(
            "crew/{}/{}",
            sanitize_branch_name(&task.id),
            sanitize_branch_name(&subtask.id)
        );

        let workspace_path = self
            .repo_path
            .join(".worktrees")
            .join("crew")
            .join(sanitize_path_component(&subtask.id));

        if let Some(parent) = workspace_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create workspace directory: {}", e))?;
        }

        if let Err(e) = self.backend.prune_orphaned(&self.repo_path) {
            log::warn!("[WorkspaceManager] Failed to prune orphaned worktrees: {}", e);
        }

        // Clean up a stale directory left by a crashed run
        if workspace_path.exists() && !workspace_path.join(".git").exists() {
            log::warn!(
                "[WorkspaceManager] Removing invalid workspace at {:?}",
                workspace_path
            );
            if let Err(e) = std::fs::remove_dir_all(&workspace_path) {
                log::warn!("[WorkspaceManager] Failed to remove stale directory: {}", e);
            }
        }

        // A stale branch with the same name would block worktree creation
        if let Err(e) = self.backend.delete_branch(&self.repo_path, &branch_name) {
            log::debug!(
                "[WorkspaceManager] Stale branch {} not removed: {}",
                branch_name,
                e
            );
        }

        self.backend
            .create_worktree(&self.repo_path, &branch_name, &workspace_path)?;

        log::info!(
            "[WorkspaceManager] Created workspace for subtask {} at {:?} on branch {}",
            subtask.id,
            workspace_path,
            branch_name
        );

        let workspace = Workspace {
            task_id: task.id.clone(),
            subtask_id: subtask.id.clone(),
            path: workspace_path,
            branch_name,
            created_at: Utc::now(),
            status: WorkspaceStatus::Active,
        };

        self.workspaces.insert(key, workspace.clone());
        Ok(workspace)
    }

    /// Look up a workspace; None for unknown pairs
    pub fn get_workspace(&self, task_id: &str, subtask_id: &str) -> Option<&Workspace> {
        self.workspaces
            .get(&(task_id.to_string(), subtask_id.to_string()))
    }

    /// All workspaces for a task; empty for unknown tasks
    pub fn get_all_workspaces(&self, task_id: &str) -> Vec<&Workspace> {
        let mut result: Vec<&Workspace> = self
            .workspaces
            .values()
            .filter(|w| w.task_id == task_id)
            .collect();
        result.sort_by(|a, b| a.subtask_id.cmp(&b.subtask_id));
        result
    }

    /// Integrate a workspace's branch into the base branch
    ///
    /// Conflicts are reported in the MergeReport, never silently resolved.
    pub fn merge_workspace(
        &mut self,
        task_id: &str,
        subtask_id: &str,
        strategy: MergeStrategy,
        message: &str,
    ) -> Result<MergeReport, String> {
        let key = (task_id.to_string(), subtask_id.to_string());
        let workspace = self
            .workspaces
            .get(&key)
            .ok_or_else(|| format!("Workspace not found for subtask {}", subtask_id))?;
        let branch = workspace.branch_name.clone();

        log::info!(
            "[WorkspaceManager] Merging workspace branch {} into {} ({:?})",
            branch,
            self.base_branch,
            strategy
        );

        let outcome = self.backend.merge(
            &self.repo_path,
            &branch,
            &self.base_branch,
            strategy,
            message,
        )?;

        let report = MergeReport {
            success: outcome.success,
            has_conflicts: !outcome.conflict_files.is_empty(),
            conflict_files: outcome.conflict_files,
            merged_files: outcome.merged_files,
            commit_id: outcome.commit_id,
            message: outcome.message,
        };

        if report.success {
            if let Some(workspace) = self.workspaces.get_mut(&key) {
                workspace.status = WorkspaceStatus::Merged;
            }
        } else {
            log::warn!(
                "[WorkspaceManager] Merge for subtask {} had conflicts: {:?}",
                subtask_id,
                report.conflict_files
            );
        }

        Ok(report)
    }

    /// Copy shared configuration files from the repository into a workspace
    /// before execution. Reports per-file success rather than failing
    /// atomically.
    pub fn sync_configuration(
        &self,
        task_id: &str,
        subtask_id: &str,
        files: &[String],
    ) -> Vec<SyncedFile> {
        let workspace = match self.get_workspace(task_id, subtask_id) {
            Some(w) => w,
            None => {
                return files
                    .iter()
                    .map(|f| SyncedFile {
                        path: f.clone(),
                        success: false,
                        error: Some("Workspace not found".to_string()),
                    })
                    .collect();
            }
        };

        let mut results = Vec::new();
        for file in files {
            let src = self.repo_path.join(file);
            let dst = workspace.path.join(file);

            let result = if !src.exists() {
                Err(format!("Source file does not exist: {:?}", src))
            } else {
                dst.parent()
                    .map(|p| {
                        std::fs::create_dir_all(p)
                            .map_err(|e| format!("Failed to create directory: {}", e))
                    })
                    .unwrap_or(Ok(()))
                    .and_then(|_| {
                        std::fs::copy(&src, &dst)
                            .map(|_| ())
                            .map_err(|e| format!("Failed to copy: {}", e))
                    })
            };

            match result {
                Ok(()) => results.push(SyncedFile {
                    path: file.clone(),
                    success: true,
                    error: None,
                }),
                Err(e) => {
                    log::warn!("[WorkspaceManager] Config sync failed for {}: {}", file, e);
                    results.push(SyncedFile {
                        path: file.clone(),
                        success: false,
                        error: Some(e),
                    });
                }
            }
        }
        results
    }

    /// Tear down a workspace's worktree; removing an unknown workspace is a
    /// no-op. The branch is kept so unmerged work is not lost.
    pub fn remove_workspace(&mut self, task_id: &str, subtask_id: &str) -> Result<(), String> {
        let key = (task_id.to_string(), subtask_id.to_string());
        let mut workspace = match self.workspaces.remove(&key) {
            Some(w) => w,
            None => return Ok(()),
        };

        if workspace.status == WorkspaceStatus::Active {
            workspace.status = WorkspaceStatus::Discarded;
        }

        if let Err(e) = self.backend.remove_worktree(&self.repo_path, &workspace.path) {
            log::warn!("[WorkspaceManager] Failed to remove worktree: {}", e);
        }

        if workspace.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&workspace.path) {
                log::warn!("[WorkspaceManager] Failed to remove workspace directory: {}", e);
            }
        }

        log::info!(
            "[WorkspaceManager] Removed workspace for subtask {} at {:?}",
            subtask_id,
            workspace.path
        );

        Ok(())
    }

    /// Remove every workspace belonging to a task
    pub fn cleanup(&mut self, task_id: &str) -> Result<(), String> {
        let subtask_ids: Vec<String> = self
            .workspaces
            .keys()
            .filter(|(t, _)| t == task_id)
            .map(|(_, s)| s.clone())
            .collect();

        for subtask_id in subtask_ids {
            if let Err(e) = self.remove_workspace(task_id, &subtask_id) {
                log::warn!(
                    "[WorkspaceManager] Failed to remove workspace for {}: {}",
                    subtask_id,
                    e
                );
            }
        }
        Ok(())
    }
}

/// Sanitize a string for use in a branch name
fn sanitize_branch_name(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .to_lowercase()
}

/// Sanitize a string for use as a path component
fn sanitize_path_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
