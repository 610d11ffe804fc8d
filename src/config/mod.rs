//! Configuration loading and merging
//!
//! Priority order: caller overrides -> project (.taskcrew/config.toml) ->
//! global (~/.taskcrew/config.toml) -> built-in defaults. Partial configs
//! use Option fields so each layer only overrides what it sets.

use crate::storage::{get_global_taskcrew_dir, FileResult};
use crate::utils::config_path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Resolved orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewConfig {
    /// Maximum simultaneously running workers in parallel mode
    pub max_concurrent: usize,
    /// Seconds to wait for a worker before killing it
    pub wait_timeout_secs: u64,
    /// Branch workspaces are created from and merged back into
    pub base_branch: String,
    /// Worker name used when no capability mapping matches
    pub default_worker: String,
    /// Capability tag -> worker name
    pub worker_map: HashMap<String, String>,
    /// Extra arguments passed to every launched worker
    pub worker_args: Vec<String>,
    /// Shared configuration files copied into each workspace before launch
    pub sync_files: Vec<String>,
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            wait_timeout_secs: 900,
            base_branch: "main".to_string(),
            default_worker: "claude".to_string(),
            worker_map: HashMap::new(),
            worker_args: Vec::new(),
            sync_files: Vec::new(),
        }
    }
}

impl CrewConfig {
    /// Resolve the worker name for a capability tag
    pub fn worker_for(&self, capability: &str) -> String {
        self.worker_map
            .get(capability)
            .cloned()
            .unwrap_or_else(|| self.default_worker.clone())
    }
}

/// Partial configuration for merging
/// Uses Option<T> for all fields to support partial overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialCrewConfig {
    pub max_concurrent: Option<usize>,
    pub wait_timeout_secs: Option<u64>,
    pub base_branch: Option<String>,
    pub default_worker: Option<String>,
    pub worker_map: Option<HashMap<String, String>>,
    pub worker_args: Option<Vec<String>>,
    pub sync_files: Option<Vec<String>>,
}

impl PartialCrewConfig {
    /// Apply this partial on top of a resolved config
    pub fn apply(&self, config: &mut CrewConfig) {
        if let Some(v) = self.max_concurrent {
            config.max_concurrent = v;
        }
        if let Some(v) = self.wait_timeout_secs {
            config.wait_timeout_secs = v;
        }
        if let Some(v) = &self.base_branch {
            config.base_branch = v.clone();
        }
        if let Some(v) = &self.default_worker {
            config.default_worker = v.clone();
        }
        if let Some(v) = &self.worker_map {
            config.worker_map = v.clone();
        }
        if let Some(v) = &self.worker_args {
            config.worker_args = v.clone();
        }
        if let Some(v) = &self.sync_files {
            config.sync_files = v.clone();
        }
    }
}

/// Load a partial config from a TOML file, None if the file doesn't exist
fn load_partial(path: &Path) -> FileResult<Option<PartialCrewConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {:?}: {}", path, e))?;

    let partial: PartialCrewConfig = toml::from_str(&content)
        .map_err(|e| format!("Failed to parse config {:?}: {}", path, e))?;

    Ok(Some(partial))
}

/// Load the resolved configuration for a repository
///
/// Missing config files are fine; malformed ones are errors.
pub fn load_config(repo_path: &Path) -> FileResult<CrewConfig> {
    let mut config = CrewConfig::default();

    let global_path = get_global_taskcrew_dir().join("config.toml");
    if let Some(global) = load_partial(&global_path)? {
        log::debug!("[Config] Applying global config from {:?}", global_path);
        global.apply(&mut config);
    }

    let project_path = config_path(repo_path);
    if let Some(project) = load_partial(&project_path)? {
        log::debug!("[Config] Applying project config from {:?}", project_path);
        project.apply(&mut config);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CrewConfig::default();
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.wait_timeout_secs, 900);
        assert_eq!(config.base_branch, "main");
    }

    #[test]
    fn test_worker_for_falls_back_to_default() {
        let mut config = CrewConfig::default();
        config
            .worker_map
            .insert("review".to_string(), "codex".to_string());

        assert_eq!(config.worker_for("review"), "codex");
        assert_eq!(config.worker_for("implementation"), "claude");
    }

    #[test]
    fn test_partial_apply_only_set_fields() {
        let mut config = CrewConfig::default();
        let partial = PartialCrewConfig {
            max_concurrent: Some(5),
            base_branch: Some("develop".to_string()),
            ..Default::default()
        };

        partial.apply(&mut config);
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.base_branch, "develop");
        // Untouched fields keep defaults
        assert_eq!(config.wait_timeout_secs, 900);
    }

    #[test]
    fn test_load_project_config() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".taskcrew");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("config.toml"),
            "max_concurrent = 2\ndefault_worker = \"codex\"\n",
        )
        .unwrap();

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.default_worker, "codex");
        assert_eq!(config.base_branch, "main");
    }

    #[test]
    fn test_load_config_missing_files() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.max_concurrent, 3);
    }

    #[test]
    fn test_load_config_malformed() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".taskcrew");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("config.toml"), "max_concurrent = \"nope\"").unwrap();

        assert!(load_config(temp.path()).is_err());
    }
}
