//! Error types for tally-backup
//!
//! Every failure the orchestrator can hit while copying, trimming or
//! restoring a backup maps onto one of these variants. Per-destination
//! failures are converted to a `bool` plus a log entry at the destination
//! boundary, so most of these never reach a caller directly.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// The main error type for backup operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// The database file to back up does not exist
    #[error("Source database not found: {}", .0.display())]
    SourceMissing(PathBuf),

    /// Destination directory is missing and cannot be created, or is read-only
    #[error("Destination unavailable: {}", .0.display())]
    DestinationUnavailable(PathBuf),

    /// I/O error while copying bytes to a destination or restore target
    #[error("Copy failed for {}: {reason}", .path.display())]
    CopyFailure { path: PathBuf, reason: String },

    /// An old backup could not be deleted during retention cleanup
    #[error("Retention cleanup failed for {}: {reason}", .path.display())]
    RetentionFailure { path: PathBuf, reason: String },

    /// A backup file name does not follow the backup naming contract
    #[error("Not a backup file: {0}")]
    InvalidBackupName(String),

    /// Settings store errors
    #[error("Settings error: {0}")]
    Settings(String),

    /// Configuration-related errors (paths, environment)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic file I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),
}

impl BackupError {
    /// Create a copy failure for the given path
    pub fn copy_failure(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::CopyFailure {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Create a retention failure for the given path
    pub fn retention_failure(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::RetentionFailure {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error is confined to a single destination
    pub fn is_destination_scoped(&self) -> bool {
        matches!(
            self,
            Self::DestinationUnavailable(_) | Self::CopyFailure { .. } | Self::RetentionFailure { .. }
        )
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for backup operations
pub type BackupResult<T> = Result<T, BackupError>;
