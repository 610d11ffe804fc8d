//! Planning document storage
//!
//! Manages the `.taskcrew/planning/{task-id}/` directory structure holding
//! the per-task audit trail: the plan (phases, questions, decisions,
//! errors), findings discovered along the way, and a timestamped progress
//! log. Documents are plain markdown so workers and humans can read them
//! without tooling.

use crate::storage::{atomic_write, ensure_dir, get_taskcrew_dir, FileResult};
use crate::utils::ResultExt;
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Planning file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanningFile {
    /// plan.md - Phases, key questions, decisions and errors
    Plan,
    /// findings.md - Categorized discoveries recorded during execution
    Findings,
    /// progress.md - Timestamped progress log
    Progress,
}

impl PlanningFile {
    pub fn filename(&self) -> &'static str {
        match self {
            PlanningFile::Plan => "plan.md",
            PlanningFile::Findings => "findings.md",
            PlanningFile::Progress => "progress.md",
        }
    }
}

/// Status of one phase in a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStatus {
    pub name: String,
    pub completed: bool,
}

/// A recorded decision with its rationale
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub description: String,
    pub rationale: String,
}

/// A recorded error with attempt count and eventual resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub description: String,
    pub attempts: u32,
    pub resolution: Option<String>,
}

/// Partial update applied to a task's plan
///
/// Every field is optional or appendable; an empty update is a no-op apart
/// from the updated timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdate {
    /// Replaces the current phase marker
    pub current_phase: Option<String>,
    /// Updates matching phases in place, appends unknown ones
    pub phases: Vec<PhaseStatus>,
    /// Appended to the key questions list
    pub key_questions: Vec<String>,
    /// Appended with a timestamp
    pub decisions: Vec<Decision>,
    /// Appended with attempt counts
    pub errors: Vec<ErrorEntry>,
}

/// Structured snapshot reconstructed from the persisted documents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlanningState {
    pub task_id: String,
    pub current_phase: Option<String>,
    pub phases: Vec<PhaseStatus>,
    pub findings_count: usize,
    pub progress_entries: usize,
    pub last_updated: Option<String>,
}

/// Get the planning base directory for a project
pub fn get_planning_base_dir(project_path: &Path) -> PathBuf {
    get_taskcrew_dir(project_path).join("planning")
}

/// Get the planning directory for a specific task
pub fn get_task_planning_dir(project_path: &Path, task_id: &str) -> PathBuf {
    get_planning_base_dir(project_path).join(task_id)
}

/// Get the path for a planning file
pub fn get_planning_file_path(project_path: &Path, task_id: &str, file: PlanningFile) -> PathBuf {
    get_task_planning_dir(project_path, task_id).join(file.filename())
}

/// Per-project planning document store
pub struct PlanningStore {
    project_path: PathBuf,
}

impl PlanningStore {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
        }
    }

    /// Create the planning directory and seed the three documents
    ///
    /// Idempotent: existing documents are left untouched so re-running a
    /// task never loses its audit trail.
    pub fn initialize_task(
        &self,
        task_id: &str,
        description: &str,
        workspace_path: &Path,
    ) -> FileResult<PathBuf> {
        let dir = get_task_planning_dir(&self.project_path, task_id);
        ensure_dir(&dir)?;

        let now = Utc::now().to_rfc3339();
        self.seed_file(
            task_id,
            PlanningFile::Plan,
            &format!(
                "# Plan: {task_id}\n\n\
                 > Created: {now}\n\
                 > Workspace: {workspace}\n\n\
                 ## Description\n\n{description}\n\n\
                 ## Current Phase\n\n_none_\n\n\
                 ## Phases\n\n\
                 ## Key Questions\n\n\
                 ## Decisions\n\n\
                 ## Errors\n",
                task_id = task_id,
                now = now,
                workspace = workspace_path.display(),
                description = description
            ),
        )?;
        self.seed_file(
            task_id,
            PlanningFile::Findings,
            &format!("# Findings: {}\n\n> Created: {}\n", task_id, now),
        )?;
        self.seed_file(
            task_id,
            PlanningFile::Progress,
            &format!("# Progress: {}\n\n> Created: {}\n", task_id, now),
        )?;

        log::info!("[PlanningStore] Initialized planning for task {}", task_id);
        Ok(dir)
    }

    fn seed_file(&self, task_id: &str, file: PlanningFile, content: &str) -> FileResult<()> {
        let path = get_planning_file_path(&self.project_path, task_id, file);
        if path.exists() {
            return Ok(());
        }
        atomic_write(&path, content)
    }

    /// Apply a partial update to the task's plan document
    pub fn update_task_plan(&self, task_id: &str, update: &PlanUpdate) -> FileResult<()> {
        let path = get_planning_file_path(&self.project_path, task_id, PlanningFile::Plan);
        if !path.exists() {
            return Err(format!("Planning not initialized for task {}", task_id));
        }

        self.with_write_lock(task_id, || {
            let content = fs::read_to_string(&path)
                .with_context(&format!("Failed to read {:?}", path))?;
            let mut doc = PlanDocument::parse(&content);

            if let Some(phase) = &update.current_phase {
                doc.set_section("Current Phase", phase.clone());
            }
            for phase in &update.phases {
                doc.upsert_phase(phase);
            }
            for question in &update.key_questions {
                doc.append_line("Key Questions", format!("- {}", question));
            }
            let now = Utc::now().to_rfc3339();
            for decision in &update.decisions {
                doc.append_line(
                    "Decisions",
                    format!("- [{}] {} - {}", now, decision.description, decision.rationale),
                );
            }
            for error in &update.errors {
                let resolution = error.resolution.as_deref().unwrap_or("unresolved");
                doc.append_line(
                    "Errors",
                    format!(
                        "- {} (attempts: {}) - {}",
                        error.description, error.attempts, resolution
                    ),
                );
            }

            atomic_write(&path, &doc.render())
        })
    }

    /// Append a categorized finding, timestamped, with optional related files
    pub fn add_finding(
        &self,
        task_id: &str,
        category: &str,
        finding: &str,
        files: &[String],
    ) -> FileResult<()> {
        self.ensure_initialized(task_id)?;

        let mut entry = format!(
            "\n## {} ({})\n\n{}\n",
            Utc::now().to_rfc3339(),
            category,
            finding
        );
        for file in files {
            entry.push_str(&format!("- `{}`\n", file));
        }

        self.locked_append(task_id, PlanningFile::Findings, &entry)
    }

    /// Append a progress entry, timestamped, with optional touched files
    pub fn add_progress_entry(
        &self,
        task_id: &str,
        source: &str,
        message: &str,
        files: &[String],
    ) -> FileResult<()> {
        self.ensure_initialized(task_id)?;

        let mut entry = format!(
            "\n- **{}** [{}] {}\n",
            Utc::now().to_rfc3339(),
            source,
            message
        );
        for file in files {
            entry.push_str(&format!("  - `{}`\n", file));
        }

        self.locked_append(task_id, PlanningFile::Progress, &entry)
    }

    /// Read the plan document; errors if the task was never initialized
    pub fn read_plan(&self, task_id: &str) -> FileResult<String> {
        self.read_file(task_id, PlanningFile::Plan)
    }

    /// Read the findings document; errors if the task was never initialized
    pub fn read_findings(&self, task_id: &str) -> FileResult<String> {
        self.read_file(task_id, PlanningFile::Findings)
    }

    /// Read the progress log; errors if the task was never initialized
    pub fn read_progress(&self, task_id: &str) -> FileResult<String> {
        self.read_file(task_id, PlanningFile::Progress)
    }

    /// Reconstruct a structured snapshot from the persisted documents
    pub fn get_task_state(&self, task_id: &str) -> FileResult<TaskPlanningState> {
        let plan = self.read_plan(task_id)?;
        let findings = self.read_findings(task_id)?;
        let progress = self.read_progress(task_id)?;

        let doc = PlanDocument::parse(&plan);
        let current_phase = doc
            .section_body("Current Phase")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "_none_");
        let phases = doc.phases();

        // Headings appended by add_finding start with "## "; the seed
        // heading starts with "# " and is not counted
        let findings_count = findings.lines().filter(|l| l.starts_with("## ")).count();
        let progress_lines: Vec<&str> = progress
            .lines()
            .filter(|l| l.starts_with("- **"))
            .collect();
        let last_updated = progress_lines
            .last()
            .and_then(|l| l.strip_prefix("- **"))
            .and_then(|l| l.split("**").next())
            .map(|s| s.to_string());

        Ok(TaskPlanningState {
            task_id: task_id.to_string(),
            current_phase,
            phases,
            findings_count,
            progress_entries: progress_lines.len(),
            last_updated,
        })
    }

    /// Remove a task's planning directory; idempotent
    pub fn cleanup_task(&self, task_id: &str) -> FileResult<()> {
        let dir = get_task_planning_dir(&self.project_path, task_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(&format!("Failed to remove planning dir {:?}", dir))?;
            log::info!("[PlanningStore] Removed planning for task {}", task_id);
        }
        Ok(())
    }

    fn ensure_initialized(&self, task_id: &str) -> FileResult<()> {
        let dir = get_task_planning_dir(&self.project_path, task_id);
        if !dir.exists() {
            return Err(format!("Planning not initialized for task {}", task_id));
        }
        Ok(())
    }

    fn read_file(&self, task_id: &str, file: PlanningFile) -> FileResult<String> {
        let path = get_planning_file_path(&self.project_path, task_id, file);
        if !path.exists() {
            return Err(format!("Planning not initialized for task {}", task_id));
        }
        fs::read_to_string(&path).with_context(&format!("Failed to read {:?}", path))
    }

    /// Serialize concurrent mutations through an exclusive lock file
    fn with_write_lock<T>(
        &self,
        task_id: &str,
        f: impl FnOnce() -> FileResult<T>,
    ) -> FileResult<T> {
        let lock_path = get_task_planning_dir(&self.project_path, task_id).join(".write.lock");
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .with_context(&format!("Failed to open lock file {:?}", lock_path))?;
        lock_file
            .lock_exclusive()
            .with_context(&format!("Failed to lock {:?}", lock_path))?;
        let result = f();
        let _ = fs2::FileExt::unlock(&lock_file);
        result
    }

    fn locked_append(&self, task_id: &str, file: PlanningFile, entry: &str) -> FileResult<()> {
        let path = get_planning_file_path(&self.project_path, task_id, file);
        self.with_write_lock(task_id, || {
            let mut content = fs::read_to_string(&path)
                .with_context(&format!("Failed to read {:?}", path))?;
            content.push_str(entry);
            atomic_write(&path, &content)
        })
    }
}

/// The plan document parsed into its "## " sections, preserving order
struct PlanDocument {
    /// Everything before the first "## " heading
    preamble: String,
    sections: Vec<(String, String)>,
}

impl PlanDocument {
    fn parse(content: &str) -> Self {
        let mut preamble = String::new();
        let mut sections: Vec<(String, String)> = Vec::new();

        for line in content.lines() {
            if let Some(title) = line.strip_prefix("## ") {
                sections.push((title.trim().to_string(), String::new()));
            } else if let Some((_, body)) = sections.last_mut() {
                body.push_str(line);
                body.push('\n');
            } else {
                preamble.push_str(line);
                preamble.push('\n');
            }
        }

        Self { preamble, sections }
    }

    fn section_body(&self, title: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(t, _)| t == title)
            .map(|(_, body)| body.as_str())
    }

    fn section_mut(&mut self, title: &str) -> &mut String {
        if !self.sections.iter().any(|(t, _)| t == title) {
            self.sections.push((title.to_string(), String::new()));
        }
        // just ensured above
        let (_, body) = self
            .sections
            .iter_mut()
            .find(|(t, _)| t == title)
            .unwrap();
        body
    }

    fn set_section(&mut self, title: &str, content: String) {
        *self.section_mut(title) = format!("\n{}\n\n", content);
    }

    fn append_line(&mut self, title: &str, line: String) {
        let body = self.section_mut(title);
        if !body.ends_with('\n') && !body.is_empty() {
            body.push('\n');
        }
        body.push_str(&line);
        body.push('\n');
    }

    /// Update a phase checkbox in place, or append an unknown phase
    fn upsert_phase(&mut self, phase: &PhaseStatus) {
        let mark = if phase.completed { "x" } else { " " };
        let body = self.section_mut("Phases");
        let mut lines: Vec<String> = body.lines().map(|l| l.to_string()).collect();
        let mut found = false;
        for line in &mut lines {
            if parse_phase_line(line).map(|p| p.name) == Some(phase.name.clone()) {
                *line = format!("- [{}] {}", mark, phase.name);
                found = true;
            }
        }
        if !found {
            lines.push(format!("- [{}] {}", mark, phase.name));
        }
        *body = format!("{}\n", lines.join("\n"));
    }

    fn phases(&self) -> Vec<PhaseStatus> {
        self.section_body("Phases")
            .map(|body| body.lines().filter_map(parse_phase_line).collect())
            .unwrap_or_default()
    }

    fn render(&self) -> String {
        let mut out = self.preamble.clone();
        for (title, body) in &self.sections {
            out.push_str(&format!("## {}\n", title));
            out.push_str(body);
        }
        out
    }
}

fn parse_phase_line(line: &str) -> Option<PhaseStatus> {
    let trimmed = line.trim();
    let (completed, rest) = if let Some(rest) = trimmed.strip_prefix("- [x] ") {
        (true, rest)
    } else if let Some(rest) = trimmed.strip_prefix("- [ ] ") {
        (false, rest)
    } else {
        return None;
    };
    Some(PhaseStatus {
        name: rest.trim().to_string(),
        completed,
    })
}
