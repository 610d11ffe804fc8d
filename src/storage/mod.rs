//! File-based storage helpers for taskcrew
//!
//! All durable state lives in files so that a crashed orchestration can be
//! inspected and audited after the fact:
//! - `planning/` - per-task planning documents (plan / findings / progress)
//! - `config.toml` - project-local configuration overrides
//!
//! Global user storage (`~/.taskcrew/`):
//! - `config.toml` - user-level configuration defaults

use std::fs;
use std::path::{Path, PathBuf};

/// Common file operations result type
pub type FileResult<T> = Result<T, String>;

/// Get the .taskcrew directory for a repository
pub fn get_taskcrew_dir(repo_path: &Path) -> PathBuf {
    crate::utils::taskcrew_dir(repo_path)
}

/// Get the global .taskcrew directory in user home
pub fn get_global_taskcrew_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".taskcrew")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> FileResult<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Failed to create directory {:?}: {}", path, e))?;
    }
    Ok(())
}

/// Write data to a file atomically (temp file + rename)
pub fn atomic_write(path: &Path, content: &str) -> FileResult<()> {
    let temp_path = path.with_extension("tmp");

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    // Write to temp file
    fs::write(&temp_path, content)
        .map_err(|e| format!("Failed to write temp file {:?}: {}", temp_path, e))?;

    // Atomic rename
    fs::rename(&temp_path, path)
        .map_err(|e| format!("Failed to rename {:?} to {:?}: {}", temp_path, path, e))?;

    Ok(())
}

/// Read a JSON file and deserialize it
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> FileResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read file {:?}: {}", path, e))?;

    serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse JSON from {:?}: {}", path, e))
}

/// Write data as pretty-printed JSON atomically
pub fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> FileResult<()> {
    let content = serde_json::to_string_pretty(data)
        .map_err(|e| format!("Failed to serialize to JSON: {}", e))?;

    atomic_write(path, &content)
}

/// Initialize the .taskcrew directory for a repository with .gitignore
pub fn init_taskcrew_dir(repo_path: &Path) -> FileResult<PathBuf> {
    let taskcrew_dir = get_taskcrew_dir(repo_path);
    ensure_dir(&taskcrew_dir)?;
    ensure_dir(&taskcrew_dir.join("planning"))?;

    // Create .gitignore for runtime files
    let gitignore_path = taskcrew_dir.join(".gitignore");
    if !gitignore_path.exists() {
        let gitignore_content = r#"# Runtime files (not for sharing)
*.lock
*.tmp
"#;
        fs::write(&gitignore_path, gitignore_content)
            .map_err(|e| format!("Failed to write .gitignore: {}", e))?;
    }

    Ok(taskcrew_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_atomic_write_and_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("file.txt");

        atomic_write(&path, "hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");

        // Overwrite is atomic too
        atomic_write(&path, "world").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "world");
    }

    #[test]
    fn test_json_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sample.json");

        let data = Sample {
            name: "crew".to_string(),
            count: 3,
        };
        write_json(&path, &data).unwrap();

        let loaded: Sample = read_json(&path).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_read_json_missing_file() {
        let temp = TempDir::new().unwrap();
        let result: FileResult<Sample> = read_json(&temp.path().join("missing.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_init_taskcrew_dir() {
        let temp = TempDir::new().unwrap();
        let dir = init_taskcrew_dir(temp.path()).unwrap();

        assert!(dir.exists());
        assert!(dir.join("planning").exists());
        assert!(dir.join(".gitignore").exists());
    }
}
