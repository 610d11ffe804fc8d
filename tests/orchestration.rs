//! End-to-end orchestration tests over fake and real VCS backends

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use taskcrew_lib::config::CrewConfig;
use taskcrew_lib::models::{
    Complexity, OrchestrationStrategy, Priority, SubTask, SubtaskType, Task, TaskType,
};
use taskcrew_lib::workspace::{MergeOutcome, MergeStrategy, VcsBackend};
use taskcrew_lib::{Orchestrator, OutcomeStatus};

/// Fakes branches and worktrees on plain directories
struct DirBackend;

impl VcsBackend for DirBackend {
    fn create_worktree(&self, _repo: &Path, _branch: &str, path: &Path) -> Result<(), String> {
        fs::create_dir_all(path).map_err(|e| e.to_string())
    }

    fn merge(
        &self,
        _repo: &Path,
        _branch: &str,
        _target: &str,
        _strategy: MergeStrategy,
        message: &str,
    ) -> Result<MergeOutcome, String> {
        Ok(MergeOutcome {
            success: true,
            message: message.to_string(),
            conflict_files: vec![],
            merged_files: vec![],
            commit_id: Some("deadbeef".to_string()),
            fast_forward: false,
        })
    }

    fn remove_worktree(&self, _repo: &Path, path: &Path) -> Result<(), String> {
        if path.exists() {
            fs::remove_dir_all(path).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn delete_branch(&self, _repo: &Path, _branch: &str) -> Result<(), String> {
        Ok(())
    }

    fn prune_orphaned(&self, _repo: &Path) -> Result<u32, String> {
        Ok(0)
    }
}

fn task(id: &str, description: &str) -> Task {
    Task {
        id: id.to_string(),
        description: description.to_string(),
        task_type: TaskType::Feature,
        complexity: Complexity::Medium,
        dependencies: vec![],
    }
}

fn subtask(task_id: &str, id: &str, worker: &str, deps: &[&str]) -> SubTask {
    SubTask {
        id: id.to_string(),
        task_id: task_id.to_string(),
        description: format!("subtask {}", id),
        subtask_type: SubtaskType::Implementation,
        priority: Priority::Medium,
        dependencies: deps.iter().map(|s| s.to_string()).collect(),
        expected_files: vec![],
        worker: worker.to_string(),
    }
}

fn config(worker: &str) -> CrewConfig {
    CrewConfig {
        default_worker: worker.to_string(),
        wait_timeout_secs: 30,
        ..CrewConfig::default()
    }
}

#[tokio::test]
async fn dependent_subtask_waits_for_its_dependency() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::with_backend(dir.path(), config("true"), Box::new(DirBackend));
    let t = task("t1", "two ordered steps");
    let subtasks = vec![
        subtask("t1", "a", "true", &[]),
        subtask("t1", "b", "true", &["a"]),
    ];

    let report = orch
        .execute(&t, subtasks, &OrchestrationStrategy::Parallel { max_concurrent: 4 })
        .await
        .unwrap();

    assert_eq!(report.completed(), 2);

    // b's lock was acquired only after a released its own
    let a_records = orch.locks().get_lock_records("t1", "a");
    let b_records = orch.locks().get_lock_records("t1", "b");
    assert!(b_records[0].acquired_at >= a_records[0].released_at.unwrap());
}

#[tokio::test]
async fn failed_dependency_cascades_into_skips() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::with_backend(dir.path(), config("true"), Box::new(DirBackend));
    let t = task("t1", "chain with a broken link");
    let subtasks = vec![
        subtask("t1", "a", "false", &[]),
        subtask("t1", "b", "true", &["a"]),
        subtask("t1", "c", "true", &["b"]),
    ];

    let report = orch
        .execute(&t, subtasks, &OrchestrationStrategy::Sequential)
        .await
        .unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(report.skipped(), 2);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.status != OutcomeStatus::Completed));
}

#[tokio::test]
async fn shared_file_mentions_surface_as_conflicts() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config("echo");
    // Both workers claim to have touched the same file
    cfg.worker_args = vec!["Modified: src/app.rs".to_string()];
    let orch = Orchestrator::with_backend(dir.path(), cfg, Box::new(DirBackend));
    let t = task("t1", "two overlapping steps");
    let subtasks = vec![
        subtask("t1", "a", "echo", &[]),
        subtask("t1", "b", "echo", &[]),
    ];

    let report = orch
        .execute(&t, subtasks, &OrchestrationStrategy::Parallel { max_concurrent: 2 })
        .await
        .unwrap();

    assert_eq!(report.completed(), 2);
    assert_eq!(report.summary.conflicts.len(), 1);
    assert_eq!(report.summary.conflicts[0].file, "src/app.rs");
    assert!(report
        .summary
        .recommendations
        .iter()
        .any(|r| r.contains("src/app.rs")));
}

#[tokio::test]
async fn planning_trail_records_the_run() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::with_backend(dir.path(), config("true"), Box::new(DirBackend));
    let t = task("t1", "- first\n- second");

    orch.run(&t, &OrchestrationStrategy::Sequential).await.unwrap();

    let plan = orch.planning().read_plan("t1").unwrap();
    assert!(plan.contains("first"));
    let state = orch.planning().get_task_state("t1").unwrap();
    assert_eq!(state.current_phase.as_deref(), Some("done"));
    assert!(state.progress_entries > 0);
    assert!(dir
        .path()
        .join(".taskcrew")
        .join("planning")
        .join("t1")
        .join("progress.md")
        .exists());
}

#[tokio::test]
async fn cleanup_forgets_everything_but_planning() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::with_backend(dir.path(), config("true"), Box::new(DirBackend));
    let t = task("t1", "one step");

    orch.run(&t, &OrchestrationStrategy::Sequential).await.unwrap();
    orch.cleanup_task("t1").unwrap();

    assert!(orch.locks().get_subtask_states("t1").is_empty());
    assert!(orch.aggregator().get_results("t1").is_empty());
    assert!(orch.planning().read_progress("t1").is_ok());
}

/// Full pipeline against a real git repository: each subtask commits in its
/// worktree and its branch is squash-merged back into the base branch.
#[tokio::test]
async fn real_git_workers_merge_back_into_base() {
    let dir = TempDir::new().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();
    {
        let mut cfg = repo.config().unwrap();
        cfg.set_str("user.name", "tester").unwrap();
        cfg.set_str("user.email", "tester@example.com").unwrap();
    }
    fs::write(dir.path().join("base.txt"), "base\n").unwrap();
    {
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("base.txt")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = repo.signature().unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
    }
    let base = repo.head().unwrap().shorthand().unwrap().to_string();

    let mut cfg = config("sh");
    cfg.base_branch = base.clone();
    // Each worker writes a file in its own worktree and commits it, so the
    // branch tree actually diverges from the base and the squash lands
    cfg.worker_args = vec![
        "-c".to_string(),
        "echo change > worker.txt && git add worker.txt && git commit -m 'worker output'"
            .to_string(),
    ];
    let orch = Orchestrator::new(dir.path(), cfg);
    let t = task("t1", "commit exercise");
    let subtasks = vec![subtask("t1", "a", "sh", &[])];

    let report = orch
        .execute(&t, subtasks, &OrchestrationStrategy::Sequential)
        .await
        .unwrap();

    assert_eq!(report.completed(), 1, "outcomes: {:?}", report.outcomes);

    // The squash commit landed on the base branch
    let branch = repo
        .find_branch(&base, git2::BranchType::Local)
        .unwrap();
    let tip = branch.get().peel_to_commit().unwrap();
    assert!(tip.message().unwrap().starts_with("crew: a"));
    assert!(tip.tree().unwrap().get_name("worker.txt").is_some());
}
