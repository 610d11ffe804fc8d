// Utility functions

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Convert a repository path string to a Path reference.
#[inline]
pub fn as_path(repo_path: &str) -> &Path {
    Path::new(repo_path)
}

/// Get the .taskcrew directory path for a repository.
#[inline]
pub fn taskcrew_dir(repo_path: &Path) -> PathBuf {
    repo_path.join(".taskcrew")
}

/// Get the .taskcrew/config.toml path for a repository.
#[inline]
pub fn config_path(repo_path: &Path) -> PathBuf {
    taskcrew_dir(repo_path).join("config.toml")
}

/// Extension trait for Result that provides convenient error context methods.
/// Converts any error to a String with a descriptive message prefix.
pub trait ResultExt<T> {
    /// Converts the error to a String with context message.
    fn with_context(self, msg: &str) -> Result<T, String>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn with_context(self, msg: &str) -> Result<T, String> {
        self.map_err(|e| format!("{}: {}", msg, e))
    }
}

/// Safely acquire a mutex lock, recovering from poisoning by returning the guard.
/// This is useful when you want to continue even if a previous thread panicked.
/// The mutex state may be inconsistent, so use with caution.
pub fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Mutex was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

/// Generate a unique ID using timestamp and random string.
pub fn generate_id() -> String {
    let now = Utc::now().timestamp_millis();
    format!("{}-{}", now, rand_string(8))
}

/// Generate a random alphanumeric string of specified length.
fn rand_string(len: usize) -> String {
    use rand::Rng;
    use std::iter;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    iter::repeat_with(|| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .take(len)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id1 = generate_id();
        let id2 = generate_id();
        assert_ne!(id1, id2);
        assert!(id1.len() > 8);
    }

    #[test]
    fn test_as_path() {
        let repo_path = "/home/user/repo";
        let path = as_path(repo_path);
        assert_eq!(path, Path::new("/home/user/repo"));
    }

    #[test]
    fn test_taskcrew_dir() {
        let dir = taskcrew_dir(Path::new("/home/user/repo"));
        assert_eq!(dir, PathBuf::from("/home/user/repo/.taskcrew"));
    }

    #[test]
    fn test_config_path() {
        let path = config_path(Path::new("/home/user/repo"));
        assert_eq!(path, PathBuf::from("/home/user/repo/.taskcrew/config.toml"));
    }

    #[test]
    fn test_with_context() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = result.with_context("Failed to read file").unwrap_err();
        assert!(err.starts_with("Failed to read file:"));
    }
}
