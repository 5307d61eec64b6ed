//! Finding and trimming backups inside a destination directory

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;

use super::naming::DatabaseName;
use crate::error::{BackupError, BackupResult};
use crate::models::BackupDestination;

/// Metadata about one backup file
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    /// Backup filename
    pub filename: String,
    /// Full path to the backup
    pub path: PathBuf,
    /// Destination the backup lives in
    pub destination: BackupDestination,
    /// Timestamp embedded in the filename (local time)
    pub created_at: NaiveDateTime,
    /// File modification time
    pub modified: DateTime<Local>,
    /// Size in bytes
    pub size_bytes: u64,
}

impl BackupInfo {
    fn modified_time(&self) -> SystemTime {
        self.modified.into()
    }
}

/// Order two backups oldest first: embedded timestamp, modification time, filename
///
/// Sync clients and some platform copies carry over modification times, so
/// the timestamp in the name comes first.
fn oldest_first(a: &BackupInfo, b: &BackupInfo) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.modified_time().cmp(&b.modified_time()))
        .then_with(|| a.filename.cmp(&b.filename))
}

/// Sort backups newest first, by embedded timestamp then modification time
pub(crate) fn sort_newest_first(backups: &mut [BackupInfo]) {
    backups.sort_by(|a, b| oldest_first(b, a));
}

/// List backups of one database (by name and fingerprint) in a destination
///
/// A missing directory yields an empty list.
pub(crate) fn scan_destination(
    destination: &BackupDestination,
    name: &DatabaseName,
    fingerprint: &str,
) -> BackupResult<Vec<BackupInfo>> {
    let dir = &destination.path;
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|e| {
        BackupError::Io(format!("Failed to read {}: {}", dir.display(), e))
    })?;

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            BackupError::Io(format!("Failed to read directory entry: {}", e))
        })?;

        let filename = entry.file_name().to_string_lossy().to_string();
        let Some(created_at) = name.match_backup(fingerprint, &filename) else {
            continue;
        };

        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        backups.push(BackupInfo {
            filename,
            path: entry.path(),
            destination: destination.clone(),
            created_at,
            modified: modified.into(),
            size_bytes: metadata.len(),
        });
    }

    Ok(backups)
}

/// Delete the oldest backups beyond `max_versions`
///
/// `just_written` is never deleted and counts towards the limit. Returns the
/// deleted paths. Failed deletions are logged and skipped; they never fail
/// the backup that triggered the cleanup.
pub(crate) fn enforce_retention(
    destination: &BackupDestination,
    name: &DatabaseName,
    fingerprint: &str,
    max_versions: u32,
    just_written: &Path,
) -> Vec<PathBuf> {
    let backups = match scan_destination(destination, name, fingerprint) {
        Ok(backups) => backups,
        Err(e) => {
            tracing::warn!(
                destination = %destination.path.display(),
                error = %e,
                "retention skipped: cannot list destination"
            );
            return Vec::new();
        }
    };

    let (kept, mut others): (Vec<BackupInfo>, Vec<BackupInfo>) =
        backups.into_iter().partition(|b| b.path.as_path() == just_written);

    let keep = (max_versions.max(1) as usize).saturating_sub(kept.len());
    if others.len() <= keep {
        return Vec::new();
    }

    others.sort_by(oldest_first);
    let excess = others.len() - keep;

    let mut deleted = Vec::new();
    for backup in others.into_iter().take(excess) {
        match fs::remove_file(&backup.path) {
            Ok(()) => {
                tracing::debug!(path = %backup.path.display(), "removed old backup");
                deleted.push(backup.path);
            }
            Err(e) => {
                let err = BackupError::retention_failure(&backup.path, e);
                tracing::warn!(error = %err, "could not remove old backup");
            }
        }
    }

    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn accounts() -> DatabaseName {
        DatabaseName::from_path(Path::new("/data/accounts.db")).unwrap()
    }

    fn plant(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name.as_bytes()).unwrap();
        // Keep modification times strictly ordered on coarse filesystems
        std::thread::sleep(std::time::Duration::from_millis(20));
        path
    }

    #[test]
    fn test_scan_missing_directory() {
        let temp = TempDir::new().unwrap();
        let dest = BackupDestination::local(temp.path().join("nope"));
        assert!(scan_destination(&dest, &accounts(), "a1b2c3").unwrap().is_empty());
    }

    #[test]
    fn test_scan_filters_foreign_files() {
        let temp = TempDir::new().unwrap();
        plant(temp.path(), "accounts_a1b2c3_2024-03-09_14-05-07.db");
        plant(temp.path(), "accounts_ffffff_2024-03-09_14-05-07.db");
        plant(temp.path(), "accounts.db");
        plant(temp.path(), "notes.txt");
        fs::create_dir(temp.path().join("accounts_a1b2c3_2024-03-09_14-05-08.db")).unwrap();

        let dest = BackupDestination::local(temp.path());
        let found = scan_destination(&dest, &accounts(), "a1b2c3").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].filename, "accounts_a1b2c3_2024-03-09_14-05-07.db");
        assert_eq!(found[0].size_bytes, 38);
    }

    #[test]
    fn test_enforce_retention_removes_oldest() {
        let temp = TempDir::new().unwrap();
        let first = plant(temp.path(), "accounts_a1b2c3_2024-03-09_14-05-01.db");
        let second = plant(temp.path(), "accounts_a1b2c3_2024-03-09_14-05-02.db");
        let third = plant(temp.path(), "accounts_a1b2c3_2024-03-09_14-05-03.db");
        let fourth = plant(temp.path(), "accounts_a1b2c3_2024-03-09_14-05-04.db");
        let other = plant(temp.path(), "accounts_ffffff_2024-03-09_14-05-00.db");

        let dest = BackupDestination::local(temp.path());
        let deleted = enforce_retention(&dest, &accounts(), "a1b2c3", 2, &fourth);

        assert_eq!(deleted, vec![first.clone(), second.clone()]);
        assert!(!first.exists());
        assert!(!second.exists());
        assert!(third.exists());
        assert!(fourth.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_enforce_retention_under_limit() {
        let temp = TempDir::new().unwrap();
        plant(temp.path(), "accounts_a1b2c3_2024-03-09_14-05-01.db");

        let dest = BackupDestination::local(temp.path());
        let only = temp.path().join("accounts_a1b2c3_2024-03-09_14-05-01.db");
        assert!(enforce_retention(&dest, &accounts(), "a1b2c3", 3, &only).is_empty());
    }

    #[test]
    fn test_sort_newest_first() {
        let temp = TempDir::new().unwrap();
        plant(temp.path(), "accounts_a1b2c3_2024-03-09_14-05-02.db");
        plant(temp.path(), "accounts_a1b2c3_2024-03-09_14-05-01.db");
        plant(temp.path(), "accounts_a1b2c3_2024-03-09_14-05-03.db");

        let dest = BackupDestination::local(temp.path());
        let mut found = scan_destination(&dest, &accounts(), "a1b2c3").unwrap();
        sort_newest_first(&mut found);

        let names: Vec<&str> = found.iter().map(|b| b.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "accounts_a1b2c3_2024-03-09_14-05-03.db",
                "accounts_a1b2c3_2024-03-09_14-05-02.db",
                "accounts_a1b2c3_2024-03-09_14-05-01.db",
            ]
        );
    }

    fn set_modified(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_retention_keeps_new_backup_despite_future_dated_old_ones() {
        let temp = TempDir::new().unwrap();
        let older = plant(temp.path(), "accounts_a1b2c3_2024-01-14_09-00-00.db");
        let old = plant(temp.path(), "accounts_a1b2c3_2024-01-14_09-00-01.db");
        let future = SystemTime::now() + Duration::from_secs(3600);
        set_modified(&older, future);
        set_modified(&old, future);
        let new = plant(temp.path(), "accounts_a1b2c3_2024-01-15_10-00-00.db");

        let dest = BackupDestination::local(temp.path());
        let deleted = enforce_retention(&dest, &accounts(), "a1b2c3", 2, &new);

        assert_eq!(deleted, vec![older.clone()]);
        assert!(new.exists());
        assert!(old.exists());
        assert!(!older.exists());
    }

    #[test]
    fn test_retention_never_deletes_just_written() {
        let temp = TempDir::new().unwrap();
        // Embedded timestamp older than the rest, as after a clock step back
        let new = plant(temp.path(), "accounts_a1b2c3_2024-01-01_00-00-00.db");
        let a = plant(temp.path(), "accounts_a1b2c3_2024-02-01_00-00-00.db");
        let b = plant(temp.path(), "accounts_a1b2c3_2024-03-01_00-00-00.db");

        let dest = BackupDestination::local(temp.path());
        let deleted = enforce_retention(&dest, &accounts(), "a1b2c3", 1, &new);

        assert_eq!(deleted, vec![a, b]);
        assert!(new.exists());
    }
}
