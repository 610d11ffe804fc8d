//! Tests for GitManager

#[cfg(test)]
mod tests {
    use crate::git::GitManager;
    use git2::{Repository, Signature};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup_test_repo() -> (TempDir, GitManager) {
        let temp_dir = TempDir::new().unwrap();
        let repo_path = temp_dir.path();

        let repo = Repository::init(repo_path).unwrap();

        let sig = Signature::now("Test User", "test@example.com").unwrap();
        let tree_id = {
            let mut index = repo.index().unwrap();

            let test_file = repo_path.join("base.txt");
            fs::write(&test_file, "base content\n").unwrap();
            index.add_path(Path::new("base.txt")).unwrap();
            index.write().unwrap();
            index.write_tree().unwrap()
        };

        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();

        let manager = GitManager::new(repo_path).unwrap();
        (temp_dir, manager)
    }

    /// Commit a file on the currently checked-out branch
    fn commit_file(manager: &GitManager, name: &str, content: &str, message: &str) {
        let workdir = manager.workdir().unwrap();
        fs::write(workdir.join(name), content).unwrap();

        let repo = Repository::open(&workdir).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();

        let sig = Signature::now("Test User", "test@example.com").unwrap();
        let parent = repo.head().unwrap().peel_to_commit().unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
            .unwrap();
    }

    #[test]
    fn test_create_git_manager() {
        let (_temp_dir, manager) = setup_test_repo();
        assert!(manager.repo_path().exists());
    }

    #[test]
    fn test_create_and_delete_branch() {
        let (_temp_dir, manager) = setup_test_repo();

        let branch = manager.create_branch("crew-test", false).unwrap();
        assert_eq!(branch.name, "crew-test");
        assert!(manager.branch_exists("crew-test"));

        manager.delete_branch("crew-test").unwrap();
        assert!(!manager.branch_exists("crew-test"));
    }

    #[test]
    fn test_checkout_branch() {
        let (_temp_dir, manager) = setup_test_repo();

        manager.create_branch("crew-checkout", false).unwrap();
        manager.checkout_branch("crew-checkout").unwrap();

        let current = manager.get_current_branch().unwrap();
        assert_eq!(current.name, "crew-checkout");
        assert!(current.is_head);
    }

    #[test]
    fn test_create_worktree() {
        let (temp_dir, manager) = setup_test_repo();
        let wt_path = temp_dir.path().join(".worktrees").join("wt1");
        fs::create_dir_all(wt_path.parent().unwrap()).unwrap();

        let info = manager.create_worktree("crew/wt1", &wt_path).unwrap();
        assert!(wt_path.join("base.txt").exists());
        assert_eq!(info.branch.as_deref(), Some("crew/wt1"));

        manager.remove_worktree(&wt_path).unwrap();
    }

    #[test]
    fn test_fast_forward_merge() {
        let (_temp_dir, manager) = setup_test_repo();
        let base = manager.get_current_branch().unwrap().name;

        manager.create_branch("crew-ff", false).unwrap();
        manager.checkout_branch("crew-ff").unwrap();
        commit_file(&manager, "feature.txt", "feature\n", "Add feature");

        let outcome = manager.merge_branch("crew-ff", &base).unwrap();
        assert!(outcome.success);
        assert!(outcome.fast_forward);
        assert!(outcome
            .merged_files
            .contains(&"feature.txt".to_string()));
    }

    #[test]
    fn test_merge_with_conflict() {
        let (_temp_dir, manager) = setup_test_repo();
        let base = manager.get_current_branch().unwrap().name;

        manager.create_branch("crew-conflict", false).unwrap();
        manager.checkout_branch("crew-conflict").unwrap();
        commit_file(&manager, "base.txt", "branch change\n", "Branch change");

        manager.checkout_branch(&base).unwrap();
        commit_file(&manager, "base.txt", "main change\n", "Main change");

        let outcome = manager.merge_branch("crew-conflict", &base).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.conflict_files, vec!["base.txt".to_string()]);

        manager.merge_abort().unwrap();
        // Workdir is clean again after abort
        let content = fs::read_to_string(manager.workdir().unwrap().join("base.txt")).unwrap();
        assert_eq!(content, "main change\n");
    }

    #[test]
    fn test_squash_merge_single_commit() {
        let (_temp_dir, manager) = setup_test_repo();
        let base = manager.get_current_branch().unwrap().name;

        manager.create_branch("crew-squash", false).unwrap();
        manager.checkout_branch("crew-squash").unwrap();
        commit_file(&manager, "one.txt", "1\n", "First");
        commit_file(&manager, "two.txt", "2\n", "Second");

        let outcome = manager
            .squash_branch("crew-squash", &base, "crew: squash work")
            .unwrap();
        assert!(outcome.success);
        assert!(!outcome.fast_forward);
        assert_eq!(outcome.merged_files.len(), 2);

        // The squash commit has exactly one parent
        let repo = Repository::open(manager.workdir().unwrap()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.message().unwrap(), "crew: squash work");
        assert_eq!(head.parent_count(), 1);
    }

    #[test]
    fn test_squash_merge_conflict_leaves_workdir_clean() {
        let (_temp_dir, manager) = setup_test_repo();
        let base = manager.get_current_branch().unwrap().name;

        manager.create_branch("crew-sq-conflict", false).unwrap();
        manager.checkout_branch("crew-sq-conflict").unwrap();
        commit_file(&manager, "base.txt", "squash side\n", "Squash side");

        manager.checkout_branch(&base).unwrap();
        commit_file(&manager, "base.txt", "target side\n", "Target side");

        let outcome = manager
            .squash_branch("crew-sq-conflict", &base, "crew: squash")
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.conflict_files, vec!["base.txt".to_string()]);

        let content = fs::read_to_string(manager.workdir().unwrap().join("base.txt")).unwrap();
        assert_eq!(content, "target side\n");
    }

    #[test]
    fn test_check_merge_conflicts_dry_run() {
        let (_temp_dir, manager) = setup_test_repo();
        let base = manager.get_current_branch().unwrap().name;

        manager.create_branch("crew-dry", false).unwrap();
        manager.checkout_branch("crew-dry").unwrap();
        commit_file(&manager, "other.txt", "no conflict\n", "Other file");
        manager.checkout_branch(&base).unwrap();

        let conflicts = manager.check_merge_conflicts("crew-dry", &base).unwrap();
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_merge_up_to_date() {
        let (_temp_dir, manager) = setup_test_repo();
        let base = manager.get_current_branch().unwrap().name;

        manager.create_branch("crew-same", false).unwrap();
        let outcome = manager.merge_branch("crew-same", &base).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "Already up to date");
    }
}
