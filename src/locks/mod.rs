//! Dependency-aware lock manager
//!
//! Admission control for subtask execution: a subtask may only be locked
//! once every declared dependency has released with a success outcome, and
//! each subtask holds at most one unreleased lock at a time. All transitions
//! go through one registry mutex, so two racing acquires for the same
//! subtask yield exactly one success.

use crate::models::{SubTask, SubtaskStatus};
use crate::utils::lock_mutex_recover;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Admission errors; all recoverable by the caller retrying later or skipping
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Subtask not found: {0}")]
    SubtaskNotFound(String),
    #[error("Dependencies not met for {subtask_id}: waiting on {missing:?}")]
    DependenciesNotMet {
        subtask_id: String,
        missing: Vec<String>,
    },
    #[error("Subtask already locked: {0}")]
    AlreadyLocked(String),
    #[error("Subtask not locked: {0}")]
    NotLocked(String),
}

/// Outcome reported when releasing a lock
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl ReleaseOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// One acquisition/release cycle for a subtask
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Worker holding the lock
    pub worker: String,
    pub acquired_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    /// Release outcome; None while the lock is held
    pub success: Option<bool>,
    pub error_message: Option<String>,
}

impl LockRecord {
    fn is_released(&self) -> bool {
        self.released_at.is_some()
    }
}

/// Snapshot of one subtask's lock state
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskState {
    pub subtask_id: String,
    pub status: SubtaskStatus,
    pub dependencies: Vec<String>,
    pub error_message: Option<String>,
    /// Worker currently holding the lock, if any
    pub locked_by: Option<String>,
}

/// Per-subtask bookkeeping
struct SubtaskEntry {
    status: SubtaskStatus,
    dependencies: Vec<String>,
    records: Vec<LockRecord>,
    error_message: Option<String>,
}

/// Lock manager over an in-memory registry
///
/// Clone-able handle; all clones share the same registry.
#[derive(Clone)]
pub struct LockManager {
    registry: Arc<Mutex<HashMap<String, HashMap<String, SubtaskEntry>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Initialize lock bookkeeping for a task's subtasks
    ///
    /// Re-registering a task replaces its previous bookkeeping.
    pub fn register_task(&self, task_id: &str, subtasks: &[SubTask]) {
        let mut registry = lock_mutex_recover(&self.registry);
        let entries = subtasks
            .iter()
            .map(|st| {
                (
                    st.id.clone(),
                    SubtaskEntry {
                        status: SubtaskStatus::Pending,
                        dependencies: st.dependencies.clone(),
                        records: Vec::new(),
                        error_message: None,
                    },
                )
            })
            .collect();
        registry.insert(task_id.to_string(), entries);
        log::debug!(
            "[LockManager] Registered task {} with {} subtasks",
            task_id,
            subtasks.len()
        );
    }

    /// Acquire the execution lock for a subtask
    ///
    /// Fails if the task or subtask is unknown, a dependency has not
    /// completed, or an unreleased lock already exists.
    pub fn acquire_lock(
        &self,
        task_id: &str,
        subtask_id: &str,
        worker: &str,
    ) -> Result<(), LockError> {
        let mut registry = lock_mutex_recover(&self.registry);
        let task = registry
            .get_mut(task_id)
            .ok_or_else(|| LockError::TaskNotFound(task_id.to_string()))?;

        // Dependency check against sibling statuses before borrowing the
        // entry mutably
        let dependencies = task
            .get(subtask_id)
            .ok_or_else(|| LockError::SubtaskNotFound(subtask_id.to_string()))?
            .dependencies
            .clone();

        let missing: Vec<String> = dependencies
            .iter()
            .filter(|dep| {
                task.get(dep.as_str())
                    .map(|e| e.status != SubtaskStatus::Completed)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(LockError::DependenciesNotMet {
                subtask_id: subtask_id.to_string(),
                missing,
            });
        }

        let entry = task
            .get_mut(subtask_id)
            .ok_or_else(|| LockError::SubtaskNotFound(subtask_id.to_string()))?;

        if entry.records.iter().any(|r| !r.is_released()) {
            return Err(LockError::AlreadyLocked(subtask_id.to_string()));
        }

        entry.records.push(LockRecord {
            worker: worker.to_string(),
            acquired_at: Utc::now(),
            released_at: None,
            success: None,
            error_message: None,
        });
        entry.status = SubtaskStatus::Locked;

        log::info!(
            "[LockManager] Lock acquired for {}/{} by {}",
            task_id,
            subtask_id,
            worker
        );
        Ok(())
    }

    /// Mark a locked subtask as running (worker launched)
    pub fn mark_running(&self, task_id: &str, subtask_id: &str) -> Result<(), LockError> {
        let mut registry = lock_mutex_recover(&self.registry);
        let entry = registry
            .get_mut(task_id)
            .ok_or_else(|| LockError::TaskNotFound(task_id.to_string()))?
            .get_mut(subtask_id)
            .ok_or_else(|| LockError::SubtaskNotFound(subtask_id.to_string()))?;

        if !entry.records.iter().any(|r| !r.is_released()) {
            return Err(LockError::NotLocked(subtask_id.to_string()));
        }
        entry.status = SubtaskStatus::Running;
        Ok(())
    }

    /// Release the lock for a subtask, recording the outcome
    ///
    /// The subtask transitions to completed (success) or failed (failure);
    /// it never stays locked.
    pub fn release_lock(
        &self,
        task_id: &str,
        subtask_id: &str,
        outcome: ReleaseOutcome,
    ) -> Result<(), LockError> {
        let mut registry = lock_mutex_recover(&self.registry);
        let entry = registry
            .get_mut(task_id)
            .ok_or_else(|| LockError::TaskNotFound(task_id.to_string()))?
            .get_mut(subtask_id)
            .ok_or_else(|| LockError::SubtaskNotFound(subtask_id.to_string()))?;

        let record = entry
            .records
            .iter_mut()
            .find(|r| !r.is_released())
            .ok_or_else(|| LockError::NotLocked(subtask_id.to_string()))?;

        record.released_at = Some(Utc::now());
        record.success = Some(outcome.success);
        record.error_message = outcome.error.clone();

        if outcome.success {
            entry.status = SubtaskStatus::Completed;
            entry.error_message = None;
        } else {
            entry.status = SubtaskStatus::Failed;
            entry.error_message = outcome.error;
        }

        log::info!(
            "[LockManager] Lock released for {}/{} (success={})",
            task_id,
            subtask_id,
            outcome.success
        );
        Ok(())
    }

    /// Administrative override for timeout/cancellation paths: releases the
    /// lock and marks the subtask failed with a fixed error.
    pub fn force_release_lock(&self, task_id: &str, subtask_id: &str) -> Result<(), LockError> {
        log::warn!(
            "[LockManager] Force-releasing lock for {}/{}",
            task_id,
            subtask_id
        );
        self.release_lock(
            task_id,
            subtask_id,
            ReleaseOutcome::failure("force released"),
        )
    }

    /// Snapshot of all subtask states for a task; empty for unknown tasks
    pub fn get_subtask_states(&self, task_id: &str) -> Vec<SubtaskState> {
        let registry = lock_mutex_recover(&self.registry);
        let mut states: Vec<SubtaskState> = registry
            .get(task_id)
            .map(|task| {
                task.iter()
                    .map(|(id, entry)| SubtaskState {
                        subtask_id: id.clone(),
                        status: entry.status,
                        dependencies: entry.dependencies.clone(),
                        error_message: entry.error_message.clone(),
                        locked_by: entry
                            .records
                            .iter()
                            .find(|r| !r.is_released())
                            .map(|r| r.worker.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        states.sort_by(|a, b| a.subtask_id.cmp(&b.subtask_id));
        states
    }

    /// Status of one subtask, if known
    pub fn get_status(&self, task_id: &str, subtask_id: &str) -> Option<SubtaskStatus> {
        let registry = lock_mutex_recover(&self.registry);
        registry
            .get(task_id)
            .and_then(|task| task.get(subtask_id))
            .map(|entry| entry.status)
    }

    /// Lock history for a subtask
    pub fn get_lock_records(&self, task_id: &str, subtask_id: &str) -> Vec<LockRecord> {
        let registry = lock_mutex_recover(&self.registry);
        registry
            .get(task_id)
            .and_then(|task| task.get(subtask_id))
            .map(|entry| entry.records.clone())
            .unwrap_or_default()
    }

    /// Drop all lock bookkeeping for a task; idempotent on unknown tasks
    pub fn cleanup(&self, task_id: &str) {
        let mut registry = lock_mutex_recover(&self.registry);
        if registry.remove(task_id).is_some() {
            log::debug!("[LockManager] Cleaned up task {}", task_id);
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
