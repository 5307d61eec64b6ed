//! Cloud sync folder probing
//!
//! Looks for the folders desktop sync clients create. Nothing is contacted
//! over the network; a folder that exists is a candidate.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::LocationDetector;
use crate::storage::file_io::read_json;

/// A cloud folder found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CloudFolder {
    pub vendor: &'static str,
    pub path: PathBuf,
}

/// One account entry in Dropbox's `info.json`
#[derive(Debug, Default, Deserialize)]
struct DropboxAccount {
    path: Option<PathBuf>,
}

/// Dropbox's `info.json`
#[derive(Debug, Default, Deserialize)]
struct DropboxInfo {
    personal: Option<DropboxAccount>,
    business: Option<DropboxAccount>,
}

/// Every cloud folder that exists, in vendor order
pub(crate) fn find_cloud_folders(detector: &LocationDetector) -> Vec<CloudFolder> {
    let mut found = Vec::new();
    let mut push = |vendor: &'static str, paths: Vec<PathBuf>| {
        for path in paths {
            if path.is_dir() {
                tracing::debug!(vendor, path = %path.display(), "found cloud folder");
                found.push(CloudFolder { vendor, path });
            }
        }
    };

    push("Dropbox", dropbox_paths(detector));
    push("OneDrive", onedrive_paths(detector));
    push("Google Drive", google_drive_paths(detector));
    push("iCloud Drive", home_paths(detector, &["Library/Mobile Documents/com~apple~CloudDocs", "iCloudDrive"]));
    push("pCloud", home_paths(detector, &["pCloudDrive", "pCloud Drive"]));
    push("MEGA", home_paths(detector, &["MEGA", "MEGAsync"]));
    push("Nextcloud", home_paths(detector, &["Nextcloud"]));
    push("Box", box_paths(detector));

    found
}

fn home_paths(detector: &LocationDetector, relative: &[&str]) -> Vec<PathBuf> {
    match detector.home_dir() {
        Some(home) => relative.iter().map(|r| home.join(r)).collect(),
        None => Vec::new(),
    }
}

/// `~/Library/CloudStorage/<prefix>-*` folders (macOS File Provider mounts)
fn cloud_storage_paths(detector: &LocationDetector, prefix: &str) -> Vec<PathBuf> {
    let Some(home) = detector.home_dir() else {
        return Vec::new();
    };
    let root = home.join("Library").join("CloudStorage");
    let Ok(entries) = fs::read_dir(&root) else {
        return Vec::new();
    };

    let wanted = format!("{}-", prefix);
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&wanted))
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    paths
}

fn dropbox_paths(detector: &LocationDetector) -> Vec<PathBuf> {
    let mut info_files = Vec::new();
    if let Some(home) = detector.home_dir() {
        info_files.push(home.join(".dropbox").join("info.json"));
    }
    for var in ["APPDATA", "LOCALAPPDATA"] {
        if let Some(dir) = detector.env_var(var) {
            info_files.push(Path::new(dir).join("Dropbox").join("info.json"));
        }
    }

    let mut paths = Vec::new();
    for file in info_files.iter().filter(|f| f.is_file()) {
        paths.extend(read_dropbox_info(file));
    }
    paths.extend(home_paths(detector, &["Dropbox"]));
    paths.extend(cloud_storage_paths(detector, "Dropbox"));
    paths
}

/// Account folders listed in a Dropbox `info.json`
fn read_dropbox_info(file: &Path) -> Vec<PathBuf> {
    match read_json::<DropboxInfo, _>(file) {
        Ok(info) => [info.personal, info.business]
            .into_iter()
            .flatten()
            .filter_map(|account| account.path)
            .collect(),
        Err(e) => {
            tracing::debug!(file = %file.display(), error = %e, "unreadable Dropbox info.json");
            Vec::new()
        }
    }
}

fn onedrive_paths(detector: &LocationDetector) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = ["OneDrive", "OneDriveConsumer", "OneDriveCommercial"]
        .iter()
        .filter_map(|var| detector.env_var(var))
        .map(PathBuf::from)
        .collect();
    paths.extend(home_paths(detector, &["OneDrive"]));
    paths.extend(cloud_storage_paths(detector, "OneDrive"));
    paths
}

fn google_drive_paths(detector: &LocationDetector) -> Vec<PathBuf> {
    let mut paths = home_paths(detector, &["Google Drive", "GoogleDrive", "My Drive"]);
    paths.extend(cloud_storage_paths(detector, "GoogleDrive"));
    paths
}

fn box_paths(detector: &LocationDetector) -> Vec<PathBuf> {
    let mut paths = home_paths(detector, &["Box", "Box Sync"]);
    paths.extend(cloud_storage_paths(detector, "Box"));
    paths
}
