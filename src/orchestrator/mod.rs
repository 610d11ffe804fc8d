//! Orchestration core
//!
//! Decomposes tasks into subtasks and drives them through the full
//! pipeline: lock admission, workspace creation, worker launch, bounded
//! wait, merge or discard, lock release, and result aggregation. One
//! orchestrator handles all strategies; callers observe progress through a
//! pluggable ProgressSink.

pub mod progress;

pub use progress::{ChannelSink, LogSink, NullSink, ProgressEvent, ProgressSink};

use crate::aggregator::{ResultAggregator, TaskSummary};
use crate::config::CrewConfig;
use crate::execution::ExecutionManager;
use crate::locks::{LockError, LockManager, ReleaseOutcome};
use crate::models::{
    ExecutionResult, OrchestrationStrategy, ParallelGroup, Priority, SubTask, SubtaskType, Task,
};
use crate::planning::{ErrorEntry, PhaseStatus, PlanUpdate, PlanningStore};
use crate::utils::lock_mutex_recover;
use crate::workspace::{MergeReport, MergeStrategy, VcsBackend, WorkspaceManager};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Terminal disposition of one subtask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed,
    /// Never started: unmet dependencies, cancellation, or a failed
    /// dependency upstream
    Skipped,
}

/// Final record for one subtask in a report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskOutcome {
    pub subtask_id: String,
    pub status: OutcomeStatus,
    pub error: Option<String>,
    pub duration_secs: f64,
    pub merge: Option<MergeReport>,
}

impl SubtaskOutcome {
    fn skipped(subtask_id: &str, reason: impl Into<String>) -> Self {
        Self {
            subtask_id: subtask_id.to_string(),
            status: OutcomeStatus::Skipped,
            error: Some(reason.into()),
            duration_secs: 0.0,
            merge: None,
        }
    }

    fn failed(subtask_id: &str, reason: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            subtask_id: subtask_id.to_string(),
            status: OutcomeStatus::Failed,
            error: Some(reason.into()),
            duration_secs,
            merge: None,
        }
    }
}

/// Full result of orchestrating one task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationReport {
    pub task_id: String,
    pub outcomes: Vec<SubtaskOutcome>,
    pub summary: TaskSummary,
    pub cancelled: bool,
}

impl OrchestrationReport {
    pub fn completed(&self) -> usize {
        self.count(OutcomeStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::Skipped)
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Drives tasks through decomposition, execution, and integration
pub struct Orchestrator {
    repo_path: PathBuf,
    config: CrewConfig,
    locks: LockManager,
    workspaces: Mutex<WorkspaceManager>,
    execution: ExecutionManager,
    aggregator: ResultAggregator,
    planning: PlanningStore,
    merge_strategy: MergeStrategy,
    sink: Box<dyn ProgressSink>,
    cancelled: Arc<Mutex<bool>>,
}

impl Orchestrator {
    /// Orchestrator over a real git repository
    pub fn new(repo_path: &Path, config: CrewConfig) -> Self {
        let workspaces = WorkspaceManager::with_git(repo_path, &config.base_branch);
        Self::build(repo_path, config, workspaces)
    }

    /// Orchestrator with a caller-supplied VCS backend
    pub fn with_backend(repo_path: &Path, config: CrewConfig, backend: Box<dyn VcsBackend>) -> Self {
        let workspaces = WorkspaceManager::new(repo_path, &config.base_branch, backend);
        Self::build(repo_path, config, workspaces)
    }

    fn build(repo_path: &Path, config: CrewConfig, workspaces: WorkspaceManager) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            config,
            locks: LockManager::new(),
            workspaces: Mutex::new(workspaces),
            execution: ExecutionManager::new(),
            aggregator: ResultAggregator::new(),
            planning: PlanningStore::new(repo_path),
            merge_strategy: MergeStrategy::Squash,
            sink: Box::new(NullSink),
            cancelled: Arc::new(Mutex::new(false)),
        }
    }

    /// Replace the progress sink
    pub fn with_sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use a different merge strategy than the default squash
    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    /// Shared flag that aborts the run when set
    pub fn cancel_handle(&self) -> Arc<Mutex<bool>> {
        self.cancelled.clone()
    }

    /// Request cancellation of the current run
    pub fn cancel(&self) {
        *lock_mutex_recover(&self.cancelled) = true;
    }

    fn is_cancelled(&self) -> bool {
        *lock_mutex_recover(&self.cancelled)
    }

    /// Split a task into subtasks with a review and validation tail
    ///
    /// Each bullet or numbered line in the description becomes an
    /// implementation subtask; a description without list items becomes a
    /// single one. A review subtask depends on every implementation
    /// subtask, and a validation subtask depends on the review. The same
    /// description always yields the same subtask ids and workers.
    pub fn decompose(&self, task: &Task) -> Vec<SubTask> {
        let items = extract_list_items(&task.description);
        let impl_descriptions: Vec<String> = if items.is_empty() {
            vec![task.description.clone()]
        } else {
            items
        };

        let impl_priority = match task.complexity {
            crate::models::Complexity::High => Priority::High,
            crate::models::Complexity::Medium => Priority::Medium,
            crate::models::Complexity::Low => Priority::Low,
        };

        let mut subtasks = Vec::new();
        for (i, description) in impl_descriptions.iter().enumerate() {
            subtasks.push(self.make_subtask(
                task,
                &format!("{}-impl-{}", task.id, i + 1),
                description,
                SubtaskType::Implementation,
                impl_priority,
                vec![],
            ));
        }

        let impl_ids: Vec<String> = subtasks.iter().map(|s| s.id.clone()).collect();
        let review_id = format!("{}-review", task.id);
        subtasks.push(self.make_subtask(
            task,
            &review_id,
            &format!("Review changes for: {}", first_line(&task.description)),
            SubtaskType::Review,
            Priority::Medium,
            impl_ids,
        ));
        subtasks.push(self.make_subtask(
            task,
            &format!("{}-validate", task.id),
            &format!("Validate: {}", first_line(&task.description)),
            SubtaskType::Validation,
            Priority::Low,
            vec![review_id],
        ));

        subtasks
    }

    fn make_subtask(
        &self,
        task: &Task,
        id: &str,
        description: &str,
        subtask_type: SubtaskType,
        priority: Priority,
        dependencies: Vec<String>,
    ) -> SubTask {
        SubTask {
            id: id.to_string(),
            task_id: task.id.clone(),
            description: description.to_string(),
            subtask_type,
            priority,
            dependencies,
            expected_files: vec![],
            worker: self.config.worker_for(subtask_type.capability()),
        }
    }

    /// Decompose and execute a task under the given strategy
    pub async fn run(
        &self,
        task: &Task,
        strategy: &OrchestrationStrategy,
    ) -> Result<OrchestrationReport, String> {
        let subtasks = self.decompose(task);
        self.execute(task, subtasks, strategy).await
    }

    /// Execute pre-decomposed subtasks under the given strategy
    pub async fn execute(
        &self,
        task: &Task,
        subtasks: Vec<SubTask>,
        strategy: &OrchestrationStrategy,
    ) -> Result<OrchestrationReport, String> {
        log::info!(
            "[Orchestrator] Starting task {} with {} subtasks",
            task.id,
            subtasks.len()
        );

        self.planning
            .initialize_task(&task.id, &task.description, &self.repo_path)?;
        self.planning.update_task_plan(
            &task.id,
            &PlanUpdate {
                current_phase: Some("execution".to_string()),
                phases: subtasks
                    .iter()
                    .map(|s| PhaseStatus {
                        name: s.id.clone(),
                        completed: false,
                    })
                    .collect(),
                ..PlanUpdate::default()
            },
        )?;

        self.locks.register_task(&task.id, &subtasks);
        self.sink.emit(ProgressEvent::TaskStarted {
            task_id: task.id.clone(),
            subtask_count: subtasks.len(),
        });

        let mut outcomes: HashMap<String, SubtaskOutcome> = HashMap::new();

        match strategy {
            OrchestrationStrategy::Parallel { max_concurrent } => {
                let slots = (*max_concurrent).max(1);
                self.run_pool(task, &subtasks, slots, &mut outcomes).await;
            }
            OrchestrationStrategy::Sequential => {
                self.run_pool(task, &subtasks, 1, &mut outcomes).await;
            }
            OrchestrationStrategy::Hybrid { groups } => {
                self.run_hybrid(task, &subtasks, groups, &mut outcomes).await;
            }
        }

        // Anything still without an outcome never became runnable
        for subtask in &subtasks {
            if !outcomes.contains_key(&subtask.id) {
                self.record_skip(task, &subtask.id, "never became runnable", &mut outcomes);
            }
        }

        let mut ordered: Vec<SubtaskOutcome> = subtasks
            .iter()
            .filter_map(|s| outcomes.remove(&s.id))
            .collect();
        ordered.sort_by(|a, b| a.subtask_id.cmp(&b.subtask_id));

        let report = OrchestrationReport {
            task_id: task.id.clone(),
            outcomes: ordered,
            summary: self.aggregator.generate_summary(&task.id),
            cancelled: self.is_cancelled(),
        };

        self.sink.emit(ProgressEvent::TaskFinished {
            task_id: task.id.clone(),
            completed: report.completed(),
            failed: report.failed(),
            skipped: report.skipped(),
        });
        let _ = self.planning.add_progress_entry(
            &task.id,
            "orchestrator",
            &format!(
                "Task finished: {} completed, {} failed, {} skipped",
                report.completed(),
                report.failed(),
                report.skipped()
            ),
            &[],
        );
        let _ = self.planning.update_task_plan(
            &task.id,
            &PlanUpdate {
                current_phase: Some("done".to_string()),
                ..PlanUpdate::default()
            },
        );

        log::info!(
            "[Orchestrator] Task {} finished: {} completed, {} failed, {} skipped",
            task.id,
            report.completed(),
            report.failed(),
            report.skipped()
        );
        Ok(report)
    }

    /// Run groups in dependency order, each internally parallel
    async fn run_hybrid(
        &self,
        task: &Task,
        subtasks: &[SubTask],
        groups: &[ParallelGroup],
        outcomes: &mut HashMap<String, SubtaskOutcome>,
    ) {
        let mut done_groups: Vec<String> = Vec::new();
        let mut remaining: Vec<&ParallelGroup> = groups.iter().collect();

        while !remaining.is_empty() {
            let position = remaining.iter().position(|g| {
                g.depends_on
                    .iter()
                    .all(|dep| done_groups.iter().any(|d| d == dep))
            });
            let group = match position {
                Some(i) => remaining.remove(i),
                None => {
                    // Cyclic or unknown group dependencies: skip the rest
                    for group in &remaining {
                        log::warn!(
                            "[Orchestrator] Group '{}' has unsatisfiable dependencies, skipping",
                            group.name
                        );
                        for id in &group.subtask_ids {
                            self.record_skip(
                                task,
                                id,
                                format!("group '{}' has unsatisfiable dependencies", group.name),
                                outcomes,
                            );
                        }
                    }
                    return;
                }
            };

            log::info!("[Orchestrator] Running group '{}'", group.name);
            let members: Vec<SubTask> = subtasks
                .iter()
                .filter(|s| group.subtask_ids.contains(&s.id))
                .cloned()
                .collect();
            self.run_pool(task, &members, self.config.max_concurrent, outcomes)
                .await;
            done_groups.push(group.name.clone());

            if self.is_cancelled() {
                break;
            }
        }

        // Subtasks outside every group run last
        let leftovers: Vec<SubTask> = subtasks
            .iter()
            .filter(|s| !groups.iter().any(|g| g.subtask_ids.contains(&s.id)))
            .cloned()
            .collect();
        if !leftovers.is_empty() && !self.is_cancelled() {
            self.run_pool(task, &leftovers, self.config.max_concurrent, outcomes)
                .await;
        }
    }

    /// Core dispatch loop: admit runnable subtasks up to `slots`, poll the
    /// running ones, integrate finishers, until every subtask is resolved
    async fn run_pool(
        &self,
        task: &Task,
        subtasks: &[SubTask],
        slots: usize,
        outcomes: &mut HashMap<String, SubtaskOutcome>,
    ) {
        let by_id: HashMap<&str, &SubTask> =
            subtasks.iter().map(|s| (s.id.as_str(), s)).collect();
        // subtask_id -> (terminal_id, admitted at)
        let mut active: HashMap<String, (String, Instant)> = HashMap::new();
        let timeout = Duration::from_secs(self.config.wait_timeout_secs);

        loop {
            if self.is_cancelled() {
                log::warn!("[Orchestrator] Cancelled, aborting {} active subtasks", active.len());
                for (subtask_id, (terminal_id, admitted)) in active.drain() {
                    let _ = self.execution.terminate(&terminal_id);
                    let _ = self.locks.force_release_lock(&task.id, &subtask_id);
                    outcomes.insert(
                        subtask_id.clone(),
                        SubtaskOutcome::failed(
                            &subtask_id,
                            "cancelled",
                            admitted.elapsed().as_secs_f64(),
                        ),
                    );
                }
                for subtask in subtasks {
                    if !outcomes.contains_key(&subtask.id) {
                        self.record_skip(task, &subtask.id, "cancelled", outcomes);
                    }
                }
                return;
            }

            let mut progressed = false;

            // Admission, highest priority first
            let mut pending: Vec<&SubTask> = subtasks
                .iter()
                .filter(|s| !outcomes.contains_key(&s.id) && !active.contains_key(&s.id))
                .collect();
            pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

            for subtask in pending {
                if active.len() >= slots {
                    break;
                }
                match self.locks.acquire_lock(&task.id, &subtask.id, &subtask.worker) {
                    Ok(()) => {
                        progressed = true;
                        match self.admit(task, subtask) {
                            Ok(terminal_id) => {
                                active.insert(subtask.id.clone(), (terminal_id, Instant::now()));
                            }
                            Err(e) => {
                                let _ = self.locks.release_lock(
                                    &task.id,
                                    &subtask.id,
                                    ReleaseOutcome::failure(e.clone()),
                                );
                                self.record_failure(task, subtask, &e, 0.0, None, outcomes);
                            }
                        }
                    }
                    Err(LockError::DependenciesNotMet { missing, .. }) => {
                        // A dependency that already failed or was skipped can
                        // never complete; propagate the skip
                        let dead = missing.iter().find(|dep| {
                            outcomes.get(dep.as_str()).map_or_else(
                                || !by_id.contains_key(dep.as_str()) && self.dep_unresolvable(task, dep),
                                |o| o.status != OutcomeStatus::Completed,
                            )
                        });
                        if let Some(dep) = dead {
                            progressed = true;
                            self.record_skip(
                                task,
                                &subtask.id,
                                format!("dependency {} did not complete", dep),
                                outcomes,
                            );
                        }
                    }
                    Err(e) => {
                        progressed = true;
                        self.record_skip(task, &subtask.id, e.to_string(), outcomes);
                    }
                }
            }

            // Poll running workers
            let running: Vec<(String, String, Instant)> = active
                .iter()
                .map(|(s, (t, at))| (s.clone(), t.clone(), *at))
                .collect();
            for (subtask_id, terminal_id, admitted) in running {
                let still_running = matches!(
                    self.execution.get_status(&terminal_id),
                    Some(crate::execution::TerminalStatus::Running)
                );

                if still_running && admitted.elapsed() < timeout {
                    continue;
                }

                active.remove(&subtask_id);
                progressed = true;

                let result = if still_running {
                    log::warn!(
                        "[Orchestrator] Subtask {} exceeded {}s timeout, terminating",
                        subtask_id,
                        self.config.wait_timeout_secs
                    );
                    self.execution.terminate(&terminal_id).map(|mut terminal| {
                        terminal.error_message = Some(format!(
                            "Timed out after {}s",
                            self.config.wait_timeout_secs
                        ));
                        terminal
                    })
                } else {
                    self.execution.wait_for(&terminal_id, Duration::from_secs(1))
                };

                let subtask = match by_id.get(subtask_id.as_str()) {
                    Some(s) => *s,
                    None => continue,
                };
                match result {
                    Ok(terminal) => self.integrate(task, subtask, terminal, outcomes),
                    Err(e) => {
                        let reason = format!("Worker result unavailable: {}", e);
                        let _ = self.locks.release_lock(
                            &task.id,
                            &subtask.id,
                            ReleaseOutcome::failure(reason.clone()),
                        );
                        self.record_failure(
                            task,
                            subtask,
                            &reason,
                            admitted.elapsed().as_secs_f64(),
                            None,
                            outcomes,
                        );
                    }
                }
            }

            let unresolved = subtasks
                .iter()
                .any(|s| !outcomes.contains_key(&s.id));
            if !unresolved {
                return;
            }

            // No running workers and nothing admitted or finished: the rest
            // are blocked on dependencies that will never complete
            if active.is_empty() && !progressed {
                for subtask in subtasks {
                    if !outcomes.contains_key(&subtask.id) {
                        self.record_skip(
                            task,
                            &subtask.id,
                            "unsatisfiable dependencies",
                            outcomes,
                        );
                    }
                }
                return;
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// A dependency outside the current pool that is not completed and not
    /// locked or pending is unresolvable
    fn dep_unresolvable(&self, task: &Task, dep: &str) -> bool {
        use crate::models::SubtaskStatus;
        match self.locks.get_status(&task.id, dep) {
            Some(SubtaskStatus::Failed) | None => true,
            Some(_) => false,
        }
    }

    /// Lock already held: create the workspace, sync config, launch the worker
    fn admit(&self, task: &Task, subtask: &SubTask) -> Result<String, String> {
        let workspace = {
            let mut workspaces = lock_mutex_recover(&self.workspaces);
            workspaces.create_workspace(task, subtask)?
        };

        if !self.config.sync_files.is_empty() {
            let workspaces = lock_mutex_recover(&self.workspaces);
            for synced in
                workspaces.sync_configuration(&task.id, &subtask.id, &self.config.sync_files)
            {
                if !synced.success {
                    log::warn!(
                        "[Orchestrator] Failed to sync {} into {}: {}",
                        synced.path,
                        subtask.id,
                        synced.error.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }

        let launch = self.execution.launch_for_subtask(
            subtask,
            &workspace.path,
            &self.config.worker_args,
        );
        let terminal_id = match launch.terminal_id {
            Some(id) if launch.success => id,
            _ => {
                return Err(launch
                    .error_message
                    .unwrap_or_else(|| "Worker launch failed".to_string()))
            }
        };

        let _ = self.locks.mark_running(&task.id, &subtask.id);
        self.sink.emit(ProgressEvent::SubtaskStarted {
            task_id: task.id.clone(),
            subtask_id: subtask.id.clone(),
            worker: subtask.worker.clone(),
        });
        let _ = self.planning.add_progress_entry(
            &task.id,
            &subtask.id,
            &format!("Worker {} launched", subtask.worker),
            &[],
        );
        Ok(terminal_id)
    }

    /// Worker finished: merge on success, discard on failure, release the lock
    fn integrate(
        &self,
        task: &Task,
        subtask: &SubTask,
        terminal: crate::execution::TerminalResult,
        outcomes: &mut HashMap<String, SubtaskOutcome>,
    ) {
        self.aggregator.collect_result(
            &task.id,
            ExecutionResult {
                subtask_id: subtask.id.clone(),
                success: terminal.success,
                output: terminal.output.clone(),
                error: terminal.error_message.clone(),
                duration_secs: terminal.duration_secs,
            },
        );

        if !terminal.success {
            let reason = terminal
                .error_message
                .clone()
                .unwrap_or_else(|| "Worker failed".to_string());
            let _ = self.locks.release_lock(
                &task.id,
                &subtask.id,
                ReleaseOutcome::failure(reason.clone()),
            );
            {
                let mut workspaces = lock_mutex_recover(&self.workspaces);
                if let Err(e) = workspaces.remove_workspace(&task.id, &subtask.id) {
                    log::warn!(
                        "[Orchestrator] Failed to discard workspace for {}: {}",
                        subtask.id,
                        e
                    );
                }
            }
            self.record_failure(task, subtask, &reason, terminal.duration_secs, None, outcomes);
            return;
        }

        let message = format!("crew: {} {}", subtask.id, subtask.description);
        let merge = {
            let mut workspaces = lock_mutex_recover(&self.workspaces);
            workspaces.merge_workspace(&task.id, &subtask.id, self.merge_strategy, &message)
        };

        match merge {
            Ok(report) if report.success => {
                self.sink.emit(ProgressEvent::MergeFinished {
                    task_id: task.id.clone(),
                    subtask_id: subtask.id.clone(),
                    merged: true,
                    conflict_files: vec![],
                });
                {
                    let mut workspaces = lock_mutex_recover(&self.workspaces);
                    if let Err(e) = workspaces.remove_workspace(&task.id, &subtask.id) {
                        log::warn!(
                            "[Orchestrator] Failed to remove merged workspace for {}: {}",
                            subtask.id,
                            e
                        );
                    }
                }
                let _ = self
                    .locks
                    .release_lock(&task.id, &subtask.id, ReleaseOutcome::success());
                let _ = self.planning.add_progress_entry(
                    &task.id,
                    &subtask.id,
                    "Completed and merged",
                    &report.merged_files,
                );
                let _ = self.planning.update_task_plan(
                    &task.id,
                    &PlanUpdate {
                        phases: vec![PhaseStatus {
                            name: subtask.id.clone(),
                            completed: true,
                        }],
                        ..PlanUpdate::default()
                    },
                );
                self.sink.emit(ProgressEvent::SubtaskCompleted {
                    task_id: task.id.clone(),
                    subtask_id: subtask.id.clone(),
                    success: true,
                    duration_secs: terminal.duration_secs,
                });
                outcomes.insert(
                    subtask.id.clone(),
                    SubtaskOutcome {
                        subtask_id: subtask.id.clone(),
                        status: OutcomeStatus::Completed,
                        error: None,
                        duration_secs: terminal.duration_secs,
                        merge: Some(report),
                    },
                );
            }
            Ok(report) => {
                // Conflicts: keep the workspace for inspection, fail the
                // subtask
                let reason = format!(
                    "Merge conflicts in: {}",
                    report.conflict_files.join(", ")
                );
                self.sink.emit(ProgressEvent::MergeFinished {
                    task_id: task.id.clone(),
                    subtask_id: subtask.id.clone(),
                    merged: false,
                    conflict_files: report.conflict_files.clone(),
                });
                let _ = self.locks.release_lock(
                    &task.id,
                    &subtask.id,
                    ReleaseOutcome::failure(reason.clone()),
                );
                self.record_failure(
                    task,
                    subtask,
                    &reason,
                    terminal.duration_secs,
                    Some(report),
                    outcomes,
                );
            }
            Err(e) => {
                let reason = format!("Merge failed: {}", e);
                let _ = self.locks.release_lock(
                    &task.id,
                    &subtask.id,
                    ReleaseOutcome::failure(reason.clone()),
                );
                self.record_failure(task, subtask, &reason, terminal.duration_secs, None, outcomes);
            }
        }
    }

    fn record_failure(
        &self,
        task: &Task,
        subtask: &SubTask,
        reason: &str,
        duration_secs: f64,
        merge: Option<MergeReport>,
        outcomes: &mut HashMap<String, SubtaskOutcome>,
    ) {
        log::warn!("[Orchestrator] Subtask {} failed: {}", subtask.id, reason);
        let _ = self.planning.add_progress_entry(
            &task.id,
            &subtask.id,
            &format!("Failed: {}", reason),
            &[],
        );
        let _ = self.planning.update_task_plan(
            &task.id,
            &PlanUpdate {
                errors: vec![ErrorEntry {
                    description: format!("{}: {}", subtask.id, reason),
                    attempts: 1,
                    resolution: None,
                }],
                ..PlanUpdate::default()
            },
        );
        self.sink.emit(ProgressEvent::SubtaskCompleted {
            task_id: task.id.clone(),
            subtask_id: subtask.id.clone(),
            success: false,
            duration_secs,
        });
        let mut outcome = SubtaskOutcome::failed(&subtask.id, reason, duration_secs);
        outcome.merge = merge;
        outcomes.insert(subtask.id.clone(), outcome);
    }

    fn record_skip(
        &self,
        task: &Task,
        subtask_id: &str,
        reason: impl Into<String>,
        outcomes: &mut HashMap<String, SubtaskOutcome>,
    ) {
        let reason = reason.into();
        log::info!("[Orchestrator] Skipping subtask {}: {}", subtask_id, reason);
        self.sink.emit(ProgressEvent::SubtaskSkipped {
            task_id: task.id.clone(),
            subtask_id: subtask_id.to_string(),
            reason: reason.clone(),
        });
        outcomes.insert(
            subtask_id.to_string(),
            SubtaskOutcome::skipped(subtask_id, reason),
        );
    }

    /// Tear down everything associated with a task: processes, workspaces,
    /// locks, and collected results. Planning documents are kept.
    pub fn cleanup_task(&self, task_id: &str) -> Result<(), String> {
        self.execution.cleanup_all();
        {
            let mut workspaces = lock_mutex_recover(&self.workspaces);
            workspaces.cleanup(task_id)?;
        }
        self.locks.cleanup(task_id);
        self.aggregator.clear_results(task_id);
        log::info!("[Orchestrator] Cleaned up task {}", task_id);
        Ok(())
    }

    /// Repository this orchestrator operates on
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn planning(&self) -> &PlanningStore {
        &self.planning
    }
}

/// Extract "- ", "* " and "1."-style list items from a description
fn extract_list_items(description: &str) -> Vec<String> {
    description
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
                return Some(item.trim().to_string());
            }
            let (head, tail) = trimmed.split_once('.')?;
            if head.chars().all(|c| c.is_ascii_digit()) && !head.is_empty() {
                let tail = tail.trim();
                if !tail.is_empty() {
                    return Some(tail.to_string());
                }
            }
            None
        })
        .filter(|item| !item.is_empty())
        .collect()
}

fn first_line(description: &str) -> &str {
    description.lines().next().unwrap_or(description).trim()
}
