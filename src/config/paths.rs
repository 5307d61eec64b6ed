//! Path management for tally-backup
//!
//! ## Path Resolution Order
//!
//! 1. `TALLY_BACKUP_CONFIG_DIR` environment variable (if set)
//! 2. The platform configuration directory from `directories`
//!    (`~/.config/tally-backup` on Linux, `~/Library/Application Support/tally-backup`
//!    on macOS, `%APPDATA%\tally-backup\config` on Windows)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::BackupError;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "TALLY_BACKUP_CONFIG_DIR";

/// Manages all paths used by tally-backup
#[derive(Debug, Clone)]
pub struct TallyPaths {
    base_dir: PathBuf,
}

impl TallyPaths {
    /// Resolve paths from the environment and platform conventions
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, BackupError> {
        let base_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => resolve_default_path()?,
        };

        Ok(Self { base_dir })
    }

    /// Create TallyPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Base configuration directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Settings file holding global settings and per-database policies
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }

    /// Ensure the base directory exists
    pub fn ensure_directories(&self) -> Result<(), BackupError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| BackupError::Io(format!("Failed to create config directory: {}", e)))
    }
}

fn resolve_default_path() -> Result<PathBuf, BackupError> {
    ProjectDirs::from("", "", "tally-backup")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| BackupError::Config("Could not determine home directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TallyPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.settings_file(), temp_dir.path().join("settings.json"));
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TallyPaths::with_base_dir(temp_dir.path().join("config"));

        paths.ensure_directories().unwrap();
        assert!(paths.base_dir().is_dir());
    }
}
