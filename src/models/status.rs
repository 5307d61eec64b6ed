//! Backup status reported to the host application

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status transitions emitted by the orchestrator
///
/// A run goes `BackingUp`, then `Syncing` for cloud destinations, then
/// `Success` or `Error`, and finally back to the resting status
/// (`Disabled`, `Enabled` or `AutoEnabled`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Disabled,
    Enabled,
    AutoEnabled,
    BackingUp,
    Syncing,
    Success,
    Error,
}

impl BackupStatus {
    /// Whether this is a resting state rather than part of a run
    pub fn is_resting(&self) -> bool {
        matches!(self, Self::Disabled | Self::Enabled | Self::AutoEnabled)
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Backups disabled"),
            Self::Enabled => write!(f, "Backups enabled"),
            Self::AutoEnabled => write!(f, "Automatic backups on"),
            Self::BackingUp => write!(f, "Backing up..."),
            Self::Syncing => write!(f, "Syncing to cloud..."),
            Self::Success => write!(f, "Backup complete"),
            Self::Error => write!(f, "Backup failed"),
        }
    }
}
