//! Result aggregation
//!
//! Collects per-subtask execution results, detects likely file conflicts
//! from worker output, and produces task-level summaries and follow-up
//! recommendations.

use crate::models::ExecutionResult;
use crate::utils::lock_mutex_recover;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Two subtasks reporting changes to the same file
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConflict {
    pub file: String,
    /// Subtasks whose output mentioned the file, in collection order
    pub subtask_ids: Vec<String>,
}

/// Task-level rollup of collected results
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub success_rate: f64,
    /// Sum of worker run times
    pub total_duration_secs: f64,
    pub conflicts: Vec<FileConflict>,
    pub recommendations: Vec<String>,
    /// Per-subtask detail, in collection order
    pub results: Vec<ExecutionResult>,
}

/// Collects and analyzes subtask results for one or more tasks
#[derive(Clone)]
pub struct ResultAggregator {
    results: Arc<Mutex<HashMap<String, Vec<ExecutionResult>>>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a subtask result under its task
    ///
    /// Collecting a second result for the same subtask replaces the first,
    /// so retried subtasks report their latest outcome.
    pub fn collect_result(&self, task_id: &str, result: ExecutionResult) {
        let mut results = lock_mutex_recover(&self.results);
        let entries = results.entry(task_id.to_string()).or_default();
        if let Some(existing) = entries
            .iter_mut()
            .find(|r| r.subtask_id == result.subtask_id)
        {
            *existing = result;
        } else {
            entries.push(result);
        }
    }

    /// Record a batch of subtask results
    pub fn collect_results(&self, task_id: &str, results: &[ExecutionResult]) {
        for result in results {
            self.collect_result(task_id, result.clone());
        }
    }

    /// All collected results for a task, in collection order
    pub fn get_results(&self, task_id: &str) -> Vec<ExecutionResult> {
        let results = lock_mutex_recover(&self.results);
        results.get(task_id).cloned().unwrap_or_default()
    }

    /// Scan collected outputs for files touched by more than one subtask
    ///
    /// Heuristic only: matches "Modified:", "Created:", "Updated:" and
    /// "Deleted:" lines in worker output. Conflicts are ordered by first
    /// mention.
    pub fn detect_conflicts(&self, task_id: &str) -> Vec<FileConflict> {
        let results = self.get_results(task_id);
        // unwrap: pattern is a compile-time constant
        let pattern = Regex::new(r"(?m)^\s*(?:Modified|Created|Updated|Deleted):\s*(\S+)").unwrap();

        // file -> subtasks that mentioned it, preserving first-seen order
        let mut order: Vec<String> = Vec::new();
        let mut mentions: HashMap<String, Vec<String>> = HashMap::new();

        for result in &results {
            for capture in pattern.captures_iter(&result.output) {
                let file = capture[1].to_string();
                let entry = mentions.entry(file.clone()).or_insert_with(|| {
                    order.push(file.clone());
                    Vec::new()
                });
                if !entry.contains(&result.subtask_id) {
                    entry.push(result.subtask_id.clone());
                }
            }
        }

        order
            .into_iter()
            .filter_map(|file| {
                let subtask_ids = mentions.remove(&file)?;
                if subtask_ids.len() >= 2 {
                    Some(FileConflict { file, subtask_ids })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Fraction of collected results that succeeded; 0.0 when none collected
    pub fn calculate_success_rate(&self, task_id: &str) -> f64 {
        let results = self.get_results(task_id);
        if results.is_empty() {
            return 0.0;
        }
        let completed = results.iter().filter(|r| r.success).count();
        completed as f64 / results.len() as f64
    }

    /// Suggested follow-ups: a retry per failed subtask and a resolution
    /// step per detected conflict
    pub fn generate_recommendations(&self, task_id: &str) -> Vec<String> {
        let results = self.get_results(task_id);
        let mut recommendations = Vec::new();

        for result in results.iter().filter(|r| !r.success) {
            let reason = result
                .error
                .as_deref()
                .unwrap_or("unknown error");
            recommendations.push(format!(
                "Retry subtask {} (failed: {})",
                result.subtask_id, reason
            ));
        }

        for conflict in self.detect_conflicts(task_id) {
            recommendations.push(format!(
                "Resolve conflicting changes to {} between subtasks {}",
                conflict.file,
                conflict.subtask_ids.join(", ")
            ));
        }

        recommendations
    }

    /// Full rollup for a task
    pub fn generate_summary(&self, task_id: &str) -> TaskSummary {
        let results = self.get_results(task_id);
        let completed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - completed;

        TaskSummary {
            task_id: task_id.to_string(),
            total: results.len(),
            completed,
            failed,
            success_rate: self.calculate_success_rate(task_id),
            total_duration_secs: results.iter().map(|r| r.duration_secs).sum(),
            conflicts: self.detect_conflicts(task_id),
            recommendations: self.generate_recommendations(task_id),
            results,
        }
    }

    /// Drop all collected results for a task; idempotent
    pub fn clear_results(&self, task_id: &str) {
        let mut results = lock_mutex_recover(&self.results);
        results.remove(task_id);
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(subtask_id: &str, success: bool, output: &str) -> ExecutionResult {
        ExecutionResult {
            subtask_id: subtask_id.to_string(),
            success,
            output: output.to_string(),
            error: if success {
                None
            } else {
                Some("worker exited with code 1".to_string())
            },
            duration_secs: 1.5,
        }
    }

    #[test]
    fn test_collect_and_get_results() {
        let aggregator = ResultAggregator::new();
        aggregator.collect_result("task-1", result("st-1", true, ""));
        aggregator.collect_result("task-1", result("st-2", false, ""));

        let results = aggregator.get_results("task-1");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].subtask_id, "st-1");
    }

    #[test]
    fn test_recollect_replaces_previous_result() {
        let aggregator = ResultAggregator::new();
        aggregator.collect_result("task-1", result("st-1", false, ""));
        aggregator.collect_result("task-1", result("st-1", true, "retried"));

        let results = aggregator.get_results("task-1");
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
    }

    #[test]
    fn test_detect_conflicts_two_subtasks_same_file() {
        let aggregator = ResultAggregator::new();
        aggregator.collect_result(
            "task-1",
            result("st-1", true, "Modified: src/app.ts\nCreated: src/new.ts"),
        );
        aggregator.collect_result("task-1", result("st-2", true, "Updated: src/app.ts"));

        let conflicts = aggregator.detect_conflicts("task-1");
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].file, "src/app.ts");
        assert_eq!(conflicts[0].subtask_ids, vec!["st-1", "st-2"]);
    }

    #[test]
    fn test_detect_conflicts_single_mention_is_not_conflict() {
        let aggregator = ResultAggregator::new();
        aggregator.collect_result("task-1", result("st-1", true, "Modified: src/only.ts"));
        assert!(aggregator.detect_conflicts("task-1").is_empty());
    }

    #[test]
    fn test_detect_conflicts_same_subtask_twice_is_not_conflict() {
        let aggregator = ResultAggregator::new();
        aggregator.collect_result(
            "task-1",
            result("st-1", true, "Modified: src/a.ts\nUpdated: src/a.ts"),
        );
        assert!(aggregator.detect_conflicts("task-1").is_empty());
    }

    #[test]
    fn test_success_rate() {
        let aggregator = ResultAggregator::new();
        aggregator.collect_result("task-1", result("st-1", true, ""));
        aggregator.collect_result("task-1", result("st-2", true, ""));
        aggregator.collect_result("task-1", result("st-3", false, ""));

        let rate = aggregator.calculate_success_rate("task-1");
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_success_rate_empty_is_zero() {
        let aggregator = ResultAggregator::new();
        assert_eq!(aggregator.calculate_success_rate("task-1"), 0.0);
    }

    #[test]
    fn test_recommendations_cover_failures_and_conflicts() {
        let aggregator = ResultAggregator::new();
        aggregator.collect_result("task-1", result("st-1", true, "Modified: src/app.ts"));
        aggregator.collect_result("task-1", result("st-2", false, "Modified: src/app.ts"));

        let recommendations = aggregator.generate_recommendations("task-1");
        assert_eq!(recommendations.len(), 2);
        assert!(recommendations[0].contains("Retry subtask st-2"));
        assert!(recommendations[1].contains("src/app.ts"));
    }

    #[test]
    fn test_summary_counts() {
        let aggregator = ResultAggregator::new();
        aggregator.collect_result("task-1", result("st-1", true, ""));
        aggregator.collect_result("task-1", result("st-2", false, ""));

        let summary = aggregator.generate_summary("task-1");
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert!((summary.success_rate - 0.5).abs() < 1e-9);
        assert!((summary.total_duration_secs - 3.0).abs() < 1e-9);
        assert_eq!(summary.results.len(), 2);
    }

    #[test]
    fn test_clear_results() {
        let aggregator = ResultAggregator::new();
        aggregator.collect_result("task-1", result("st-1", true, ""));
        aggregator.clear_results("task-1");
        aggregator.clear_results("task-1");
        assert!(aggregator.get_results("task-1").is_empty());
    }
}
