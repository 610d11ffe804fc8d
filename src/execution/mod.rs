//! Worker process lifecycle
//!
//! Launches worker CLI processes inside workspace directories, captures their
//! output on reader threads, and supports polling, bounded waits, and
//! termination. Worker commands are opaque here: callers decide what binary
//! and arguments each subtask runs.

use crate::models::SubTask;
use crate::utils::lock_mutex_recover;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle state of a launched terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Running,
    Completed,
    Failed,
}

/// Result of attempting to launch a worker for one subtask
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResult {
    pub subtask_id: String,
    pub success: bool,
    /// Present only when the launch succeeded
    pub terminal_id: Option<String>,
    pub error_message: Option<String>,
}

/// Final result of a finished terminal
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalResult {
    pub terminal_id: String,
    pub subtask_id: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error_message: Option<String>,
    pub duration_secs: f64,
}

/// Snapshot of one tracked terminal
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalInfo {
    pub terminal_id: String,
    pub subtask_id: String,
    pub worker: String,
    pub status: TerminalStatus,
    pub started_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
}

/// Per-terminal bookkeeping
struct TerminalEntry {
    subtask_id: String,
    worker: String,
    status: TerminalStatus,
    started_at: DateTime<Utc>,
    started_instant: Instant,
    /// Lines captured from the child's stdout/stderr by reader threads
    output: Arc<Mutex<Vec<String>>>,
    /// Reader threads, joined once the child is reaped so the buffer holds
    /// every line the worker wrote before exiting
    readers: Vec<thread::JoinHandle<()>>,
    exit_code: Option<i32>,
}

/// Launches and tracks worker processes
pub struct ExecutionManager {
    processes: Arc<Mutex<HashMap<String, Child>>>,
    terminals: Arc<Mutex<HashMap<String, TerminalEntry>>>,
}

impl ExecutionManager {
    pub fn new() -> Self {
        Self {
            processes: Arc::new(Mutex::new(HashMap::new())),
            terminals: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Launch a worker process for one subtask inside its workspace
    ///
    /// Never returns Err for an unlaunchable worker; the failure is reported
    /// in the LaunchResult so callers can record it and continue with other
    /// subtasks.
    pub fn launch_for_subtask(
        &self,
        subtask: &SubTask,
        workspace_path: &Path,
        args: &[String],
    ) -> LaunchResult {
        let program = match which::which(&subtask.worker) {
            Ok(path) => path,
            Err(e) => {
                log::error!(
                    "[ExecutionManager] Worker '{}' not found for subtask {}: {}",
                    subtask.worker,
                    subtask.id,
                    e
                );
                return LaunchResult {
                    subtask_id: subtask.id.clone(),
                    success: false,
                    terminal_id: None,
                    error_message: Some(format!("Worker '{}' not found: {}", subtask.worker, e)),
                };
            }
        };

        log::info!(
            "[ExecutionManager] Launching {} {:?} in {} for subtask {}",
            program.display(),
            args,
            workspace_path.display(),
            subtask.id
        );

        let child = match Command::new(&program)
            .args(args)
            .current_dir(workspace_path)
            .stdin(Stdio::null()) // Prevent stdin issues causing early exit
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                log::error!(
                    "[ExecutionManager] Failed to spawn worker for subtask {}: {}",
                    subtask.id,
                    e
                );
                return LaunchResult {
                    subtask_id: subtask.id.clone(),
                    success: false,
                    terminal_id: None,
                    error_message: Some(format!("Failed to spawn worker: {}", e)),
                };
            }
        };

        let terminal_id = format!("term-{}", uuid::Uuid::new_v4());
        self.track_child(&terminal_id, &subtask.id, &subtask.worker, child);

        LaunchResult {
            subtask_id: subtask.id.clone(),
            success: true,
            terminal_id: Some(terminal_id),
            error_message: None,
        }
    }

    /// Launch workers for every subtask of a task, one terminal each
    ///
    /// Subtasks whose worker cannot be launched get a failed LaunchResult;
    /// the rest launch normally.
    pub fn launch_for_task(
        &self,
        subtasks: &[SubTask],
        workspace_paths: &HashMap<String, PathBuf>,
        args: &[String],
    ) -> Vec<LaunchResult> {
        subtasks
            .iter()
            .map(|subtask| match workspace_paths.get(&subtask.id) {
                Some(path) => self.launch_for_subtask(subtask, path, args),
                None => LaunchResult {
                    subtask_id: subtask.id.clone(),
                    success: false,
                    terminal_id: None,
                    error_message: Some(format!("No workspace for subtask {}", subtask.id)),
                },
            })
            .collect()
    }

    fn track_child(&self, terminal_id: &str, subtask_id: &str, worker: &str, mut child: Child) {
        let output = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::new();

        if let Some(stdout) = child.stdout.take() {
            let output = output.clone();
            let terminal_id_clone = terminal_id.to_string();
            readers.push(thread::spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            let mut buffer = lock_mutex_recover(&output);
                            buffer.push(line);
                        }
                        Err(e) => {
                            log::debug!(
                                "[ExecutionManager] Stdout reader for {} stopped: {}",
                                terminal_id_clone,
                                e
                            );
                            break;
                        }
                    }
                }
            }));
        }

        if let Some(stderr) = child.stderr.take() {
            let output = output.clone();
            let terminal_id_clone = terminal_id.to_string();
            readers.push(thread::spawn(move || {
                let reader = BufReader::new(stderr);
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            let mut buffer = lock_mutex_recover(&output);
                            buffer.push(line);
                        }
                        Err(e) => {
                            log::debug!(
                                "[ExecutionManager] Stderr reader for {} stopped: {}",
                                terminal_id_clone,
                                e
                            );
                            break;
                        }
                    }
                }
            }));
        }

        {
            let mut processes = lock_mutex_recover(&self.processes);
            processes.insert(terminal_id.to_string(), child);
        }
        {
            let mut terminals = lock_mutex_recover(&self.terminals);
            terminals.insert(
                terminal_id.to_string(),
                TerminalEntry {
                    subtask_id: subtask_id.to_string(),
                    worker: worker.to_string(),
                    status: TerminalStatus::Running,
                    started_at: Utc::now(),
                    started_instant: Instant::now(),
                    output,
                    readers,
                    exit_code: None,
                },
            );
        }
    }

    /// Current status of a terminal; None for unknown or cleaned-up terminals
    ///
    /// Polls the child so a terminal that exited since the last call reports
    /// its terminal status.
    pub fn get_status(&self, terminal_id: &str) -> Option<TerminalStatus> {
        self.get_info(terminal_id).map(|info| info.status)
    }

    /// Full snapshot of a terminal; None for unknown or cleaned-up terminals
    pub fn get_info(&self, terminal_id: &str) -> Option<TerminalInfo> {
        self.poll_terminal(terminal_id);
        let terminals = lock_mutex_recover(&self.terminals);
        terminals.get(terminal_id).map(|entry| TerminalInfo {
            terminal_id: terminal_id.to_string(),
            subtask_id: entry.subtask_id.clone(),
            worker: entry.worker.clone(),
            status: entry.status,
            started_at: entry.started_at,
            exit_code: entry.exit_code,
        })
    }

    /// Reap the child if it has exited and record the outcome
    fn poll_terminal(&self, terminal_id: &str) {
        let exit = {
            let mut processes = lock_mutex_recover(&self.processes);
            match processes.get_mut(terminal_id) {
                Some(child) => match child.try_wait() {
                    Ok(Some(status)) => {
                        processes.remove(terminal_id);
                        Some(status.code())
                    }
                    Ok(None) => None,
                    Err(e) => {
                        log::warn!(
                            "[ExecutionManager] try_wait failed for {}: {}",
                            terminal_id,
                            e
                        );
                        processes.remove(terminal_id);
                        Some(None)
                    }
                },
                None => None,
            }
        };

        if let Some(code) = exit {
            let readers = {
                let mut terminals = lock_mutex_recover(&self.terminals);
                match terminals.get_mut(terminal_id) {
                    Some(entry) => {
                        entry.exit_code = code;
                        entry.status = if code == Some(0) {
                            TerminalStatus::Completed
                        } else {
                            TerminalStatus::Failed
                        };
                        log::info!(
                            "[ExecutionManager] Terminal {} exited with code {:?}",
                            terminal_id,
                            code
                        );
                        std::mem::take(&mut entry.readers)
                    }
                    None => Vec::new(),
                }
            };
            // The child is gone so its pipes are closed; the readers drain
            // whatever was still buffered and exit
            for reader in readers {
                let _ = reader.join();
            }
        }
    }

    /// Wait for a terminal to finish, up to a timeout
    ///
    /// On timeout the process is killed and the result is a failure with a
    /// timeout error message. Err only for unknown terminals.
    pub fn wait_for(&self, terminal_id: &str, timeout: Duration) -> Result<TerminalResult> {
        let deadline = Instant::now() + timeout;
        let poll_interval = Duration::from_millis(100);

        loop {
            match self.get_status(terminal_id) {
                None => return Err(anyhow!("Unknown terminal: {}", terminal_id)),
                Some(TerminalStatus::Running) => {
                    if Instant::now() >= deadline {
                        log::warn!(
                            "[ExecutionManager] Terminal {} timed out after {:?}",
                            terminal_id,
                            timeout
                        );
                        self.kill_terminal(terminal_id);
                        return self.finish(
                            terminal_id,
                            Some(format!("Timed out after {}s", timeout.as_secs())),
                        );
                    }
                    thread::sleep(poll_interval);
                }
                Some(_) => return self.finish(terminal_id, None),
            }
        }
    }

    /// Terminate a running terminal; returns its (failed) result
    pub fn terminate(&self, terminal_id: &str) -> Result<TerminalResult> {
        {
            let terminals = lock_mutex_recover(&self.terminals);
            if !terminals.contains_key(terminal_id) {
                return Err(anyhow!("Unknown terminal: {}", terminal_id));
            }
        }
        self.kill_terminal(terminal_id);
        self.finish(terminal_id, Some("Terminated".to_string()))
    }

    fn kill_terminal(&self, terminal_id: &str) {
        let mut processes = lock_mutex_recover(&self.processes);
        if let Some(mut child) = processes.remove(terminal_id) {
            let _ = child.kill(); // Best effort
            let _ = child.wait();
        }
        drop(processes);

        let readers = {
            let mut terminals = lock_mutex_recover(&self.terminals);
            match terminals.get_mut(terminal_id) {
                Some(entry) => {
                    if entry.status == TerminalStatus::Running {
                        entry.status = TerminalStatus::Failed;
                    }
                    std::mem::take(&mut entry.readers)
                }
                None => Vec::new(),
            }
        };
        for reader in readers {
            let _ = reader.join();
        }
    }

    /// Build the final TerminalResult for a finished terminal
    fn finish(&self, terminal_id: &str, error_message: Option<String>) -> Result<TerminalResult> {
        let terminals = lock_mutex_recover(&self.terminals);
        let entry = terminals
            .get(terminal_id)
            .ok_or_else(|| anyhow!("Unknown terminal: {}", terminal_id))?;

        let output = {
            let buffer = lock_mutex_recover(&entry.output);
            buffer.join("\n")
        };
        let success = entry.status == TerminalStatus::Completed && error_message.is_none();

        Ok(TerminalResult {
            terminal_id: terminal_id.to_string(),
            subtask_id: entry.subtask_id.clone(),
            success,
            exit_code: entry.exit_code,
            output,
            error_message: if success {
                None
            } else {
                error_message.or_else(|| Some(format!("Exited with code {:?}", entry.exit_code)))
            },
            duration_secs: entry.started_instant.elapsed().as_secs_f64(),
        })
    }

    /// Captured output so far for a terminal
    pub fn get_output(&self, terminal_id: &str) -> Option<String> {
        let terminals = lock_mutex_recover(&self.terminals);
        terminals.get(terminal_id).map(|entry| {
            let buffer = lock_mutex_recover(&entry.output);
            buffer.join("\n")
        })
    }

    /// Kill all tracked processes and drop all terminal bookkeeping
    pub fn cleanup_all(&self) {
        let terminal_ids: Vec<String> = {
            let processes = lock_mutex_recover(&self.processes);
            processes.keys().cloned().collect()
        };
        for terminal_id in terminal_ids {
            self.kill_terminal(&terminal_id);
        }

        let mut terminals = lock_mutex_recover(&self.terminals);
        let count = terminals.len();
        terminals.clear();
        if count > 0 {
            log::info!("[ExecutionManager] Cleaned up {} terminals", count);
        }
    }
}

impl Default for ExecutionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExecutionManager {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, SubtaskType};
    use tempfile::TempDir;

    fn subtask_with_worker(worker: &str) -> SubTask {
        SubTask {
            id: "st-1".to_string(),
            task_id: "task-1".to_string(),
            description: "test".to_string(),
            subtask_type: SubtaskType::Implementation,
            priority: Priority::Medium,
            dependencies: vec![],
            expected_files: vec![],
            worker: worker.to_string(),
        }
    }

    #[test]
    fn test_launch_unknown_worker_reports_failure() {
        let manager = ExecutionManager::new();
        let dir = TempDir::new().unwrap();

        let result = manager.launch_for_subtask(
            &subtask_with_worker("definitely-not-a-real-worker-xyz"),
            dir.path(),
            &[],
        );

        assert!(!result.success);
        assert!(result.terminal_id.is_none());
        assert!(result.error_message.unwrap().contains("not found"));
    }

    #[test]
    fn test_launch_and_wait_success() {
        let manager = ExecutionManager::new();
        let dir = TempDir::new().unwrap();

        let launch = manager.launch_for_subtask(
            &subtask_with_worker("echo"),
            dir.path(),
            &["hello".to_string()],
        );
        assert!(launch.success);

        let terminal_id = launch.terminal_id.unwrap();
        let result = manager
            .wait_for(&terminal_id, Duration::from_secs(10))
            .unwrap();

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.output.contains("hello"));
        assert_eq!(result.subtask_id, "st-1");
    }

    #[test]
    fn test_wait_captures_failing_exit_code() {
        let manager = ExecutionManager::new();
        let dir = TempDir::new().unwrap();

        let launch = manager.launch_for_subtask(&subtask_with_worker("false"), dir.path(), &[]);
        assert!(launch.success);

        let result = manager
            .wait_for(&launch.terminal_id.unwrap(), Duration::from_secs(10))
            .unwrap();
        assert!(!result.success);
        assert_ne!(result.exit_code, Some(0));
        assert!(result.error_message.is_some());
    }

    #[test]
    fn test_wait_returns_every_output_line() {
        let manager = ExecutionManager::new();
        let dir = TempDir::new().unwrap();

        // A worker that floods stdout and exits immediately; the tail lines
        // are still in the pipe buffer when the child is reaped
        let script = "i=0; while [ $i -lt 200 ]; do echo \"Modified: src/file$i.rs\"; i=$((i+1)); done";
        let launch = manager.launch_for_subtask(
            &subtask_with_worker("sh"),
            dir.path(),
            &["-c".to_string(), script.to_string()],
        );
        assert!(launch.success);

        let result = manager
            .wait_for(&launch.terminal_id.unwrap(), Duration::from_secs(10))
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output.lines().count(), 200);
        assert!(result.output.contains("Modified: src/file199.rs"));
    }

    #[test]
    fn test_wait_timeout_kills_process() {
        let manager = ExecutionManager::new();
        let dir = TempDir::new().unwrap();

        let launch = manager.launch_for_subtask(
            &subtask_with_worker("sleep"),
            dir.path(),
            &["30".to_string()],
        );
        let terminal_id = launch.terminal_id.unwrap();

        let result = manager
            .wait_for(&terminal_id, Duration::from_millis(300))
            .unwrap();

        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("Timed out"));
        assert_eq!(
            manager.get_status(&terminal_id),
            Some(TerminalStatus::Failed)
        );
    }

    #[test]
    fn test_terminate_running_process() {
        let manager = ExecutionManager::new();
        let dir = TempDir::new().unwrap();

        let launch = manager.launch_for_subtask(
            &subtask_with_worker("sleep"),
            dir.path(),
            &["30".to_string()],
        );
        let terminal_id = launch.terminal_id.unwrap();

        let result = manager.terminate(&terminal_id).unwrap();
        assert!(!result.success);
        assert_eq!(
            manager.get_status(&terminal_id),
            Some(TerminalStatus::Failed)
        );
    }

    #[test]
    fn test_get_status_unknown_terminal() {
        let manager = ExecutionManager::new();
        assert_eq!(manager.get_status("nope"), None);
        assert!(manager.get_info("nope").is_none());
    }

    #[test]
    fn test_get_info_reports_worker_and_subtask() {
        let manager = ExecutionManager::new();
        let dir = TempDir::new().unwrap();

        let launch = manager.launch_for_subtask(
            &subtask_with_worker("sleep"),
            dir.path(),
            &["5".to_string()],
        );
        let terminal_id = launch.terminal_id.unwrap();

        let info = manager.get_info(&terminal_id).unwrap();
        assert_eq!(info.subtask_id, "st-1");
        assert_eq!(info.worker, "sleep");
        assert_eq!(info.status, TerminalStatus::Running);

        manager.cleanup_all();
    }

    #[test]
    fn test_cleanup_all_forgets_terminals() {
        let manager = ExecutionManager::new();
        let dir = TempDir::new().unwrap();

        let launch = manager.launch_for_subtask(
            &subtask_with_worker("sleep"),
            dir.path(),
            &["30".to_string()],
        );
        let terminal_id = launch.terminal_id.unwrap();
        assert!(manager.get_status(&terminal_id).is_some());

        manager.cleanup_all();
        assert_eq!(manager.get_status(&terminal_id), None);
    }

    #[test]
    fn test_launch_for_task_missing_workspace() {
        let manager = ExecutionManager::new();
        let results = manager.launch_for_task(&[subtask_with_worker("echo")], &HashMap::new(), &[]);

        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].error_message.as_ref().unwrap().contains("No workspace"));
    }
}
