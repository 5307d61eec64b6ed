//! Backup location detection
//!
//! Suggests destinations the user probably wants: cloud sync folders under
//! the home directory and plugged-in removable drives. Detection only reads
//! the filesystem; adding a candidate to a policy is up to the caller.

mod cloud;
mod removable;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use directories::BaseDirs;

use crate::models::BackupDestination;
use removable::MountedDisk;

/// Environment variables cloud folder lookup consults
const CONSULTED_ENV_VARS: &[&str] = &[
    "OneDrive",
    "OneDriveConsumer",
    "OneDriveCommercial",
    "APPDATA",
    "LOCALAPPDATA",
];

/// Finds candidate backup destinations on this machine
#[derive(Debug, Clone, Default)]
pub struct LocationDetector {
    home: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl LocationDetector {
    /// Detector for the current user's home and environment
    pub fn new() -> Self {
        let home = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        let env = CONSULTED_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok().map(|value| (var.to_string(), value)))
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();
        Self { home, env }
    }

    /// Detector rooted at an explicit home directory with an empty environment
    pub fn with_home_dir(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
            env: HashMap::new(),
        }
    }

    /// Override one environment variable
    pub fn with_env_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn home_dir(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// Cloud sync folders that exist, labelled by vendor
    ///
    /// Candidates take part in scheduled backups.
    pub fn detect_cloud_destinations(&self) -> Vec<BackupDestination> {
        let candidates = cloud::find_cloud_folders(self)
            .into_iter()
            .map(|folder| BackupDestination::cloud(folder.path, folder.vendor))
            .collect();
        dedupe(candidates)
    }

    /// Mounted removable drives that are not read-only
    ///
    /// Candidates are excluded from scheduled backups since drives come
    /// and go.
    pub fn detect_usb_destinations(&self) -> Vec<BackupDestination> {
        usb_candidates(removable::mounted_disks())
    }

    /// Cloud folders followed by removable drives
    pub fn detect_all(&self) -> Vec<BackupDestination> {
        let mut all = self.detect_cloud_destinations();
        all.extend(self.detect_usb_destinations());
        let all = dedupe(all);
        tracing::debug!(count = all.len(), "backup location detection finished");
        all
    }
}

fn usb_candidates(disks: Vec<MountedDisk>) -> Vec<BackupDestination> {
    let candidates = disks
        .into_iter()
        .filter(MountedDisk::is_backup_candidate)
        .map(|disk| {
            let label = disk.label();
            BackupDestination::usb(disk.mount_point, Some(label)).with_auto_backup(false)
        })
        .collect();
    dedupe(candidates)
}

/// Keep the first destination for each path
fn dedupe(destinations: Vec<BackupDestination>) -> Vec<BackupDestination> {
    let mut seen = HashSet::new();
    destinations
        .into_iter()
        .filter(|dest| seen.insert(dest.path.clone()))
        .collect()
}
