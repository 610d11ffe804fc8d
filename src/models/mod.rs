//! Core data model for taskcrew orchestration
//!
//! A `Task` is the externally supplied unit of work. The orchestrator
//! decomposes it into `SubTask`s, each bound to one worker and one isolated
//! workspace. `ExecutionResult` is the immutable record of one worker run.

use serde::{Deserialize, Serialize};

/// Classification of an incoming task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Feature,
    Bugfix,
    Refactor,
    Chore,
}

impl Default for TaskType {
    fn default() -> Self {
        TaskType::Feature
    }
}

/// Rough complexity estimate supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Default for Complexity {
    fn default() -> Self {
        Complexity::Medium
    }
}

/// An identified unit of work submitted by a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task ID
    pub id: String,
    /// Free-text description of the work
    pub description: String,
    /// Type classification
    #[serde(default)]
    pub task_type: TaskType,
    /// Estimated complexity
    #[serde(default)]
    pub complexity: Complexity,
    /// IDs of tasks this task depends on (bookkeeping for the caller)
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Role a subtask plays within its parent task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskType {
    Implementation,
    Review,
    Validation,
}

impl SubtaskType {
    /// Capability tag used for worker assignment
    pub fn capability(&self) -> &'static str {
        match self {
            SubtaskType::Implementation => "implementation",
            SubtaskType::Review => "review",
            SubtaskType::Validation => "validation",
        }
    }
}

/// Dispatch priority among equally admissible subtasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Lifecycle status of a subtask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Locked,
    Running,
    Completed,
    Failed,
}

/// A decomposition unit owned by exactly one task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    /// Subtask ID
    pub id: String,
    /// Parent task ID
    pub task_id: String,
    /// What this subtask should accomplish
    pub description: String,
    /// Role within the parent task
    pub subtask_type: SubtaskType,
    /// Dispatch priority
    #[serde(default)]
    pub priority: Priority,
    /// IDs of subtasks that must complete successfully first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Files this subtask is expected to touch
    #[serde(default)]
    pub expected_files: Vec<String>,
    /// Assigned worker name (opaque, resolved externally to a command)
    pub worker: String,
}

/// Execution strategy chosen by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum OrchestrationStrategy {
    /// All admissible subtasks dispatched simultaneously, bounded by a
    /// concurrency limit; newly unblocked subtasks fill freed slots.
    Parallel {
        #[serde(default = "default_max_concurrent")]
        max_concurrent: usize,
    },
    /// Strict dependency order, one subtask at a time.
    Sequential,
    /// Named groups, each internally parallel, ordered by group dependencies.
    Hybrid { groups: Vec<ParallelGroup> },
}

fn default_max_concurrent() -> usize {
    3
}

impl Default for OrchestrationStrategy {
    fn default() -> Self {
        OrchestrationStrategy::Parallel {
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// A named group of subtasks for hybrid execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelGroup {
    /// Group name
    pub name: String,
    /// Subtask IDs belonging to this group
    pub subtask_ids: Vec<String>,
    /// Names of groups that must finish before this one starts
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Immutable record of one worker run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Subtask the worker ran for
    pub subtask_id: String,
    /// Whether the worker exited successfully
    pub success: bool,
    /// Captured stdout/stderr of the worker
    pub output: String,
    /// Error description for failed runs
    pub error: Option<String>,
    /// Wall-clock duration of the run in seconds
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_serialization() {
        let strategy = OrchestrationStrategy::Parallel { max_concurrent: 3 };
        let json = serde_json::to_string(&strategy).unwrap();
        assert!(json.contains("\"mode\":\"parallel\""));

        let parsed: OrchestrationStrategy = serde_json::from_str("{\"mode\":\"sequential\"}").unwrap();
        assert_eq!(parsed, OrchestrationStrategy::Sequential);
    }

    #[test]
    fn test_parallel_defaults_max_concurrent() {
        let parsed: OrchestrationStrategy = serde_json::from_str("{\"mode\":\"parallel\"}").unwrap();
        assert_eq!(
            parsed,
            OrchestrationStrategy::Parallel { max_concurrent: 3 }
        );
    }

    #[test]
    fn test_subtask_status_serialization() {
        let status = SubtaskStatus::Locked;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"locked\"");
    }
}
