//! Restoring a backup file next to (never over) existing data
//!
//! Also holds the byte copy shared with the backup path.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use super::naming::{format_timestamp, original_name, DatabaseName};
use crate::error::{BackupError, BackupResult};

/// Extension given to in-flight copies so a failed copy never looks like a backup
const PARTIAL_EXTENSION: &str = "partial";

/// Copy a backup into `target_dir` under its original database name
///
/// If a file with that name already exists, the copy gets a
/// `_restored_<timestamp>` suffix instead. Returns the new file's path.
pub(crate) fn restore_file(
    backup_file: &Path,
    target_dir: &Path,
    now: NaiveDateTime,
) -> BackupResult<PathBuf> {
    if !backup_file.is_file() {
        return Err(BackupError::SourceMissing(backup_file.to_path_buf()));
    }

    let name = match original_name(backup_file) {
        Some(name) => name,
        None => {
            tracing::debug!(
                file = %backup_file.display(),
                "file name has no backup suffix, restoring under its own name"
            );
            DatabaseName::from_path(backup_file).ok_or_else(|| {
                BackupError::InvalidBackupName(backup_file.display().to_string())
            })?
        }
    };

    fs::create_dir_all(target_dir).map_err(|e| BackupError::copy_failure(target_dir, e))?;

    let target = free_restore_target(target_dir, &name, now);
    copy_atomically(backup_file, &target, true)?;
    Ok(target)
}

/// First name in `target_dir` that does not exist yet
///
/// Tries `<base>.<ext>`, then `<base>_restored_<ts>.<ext>`, then
/// `<base>_restored_<ts>_2.<ext>` and upwards.
fn free_restore_target(target_dir: &Path, name: &DatabaseName, now: NaiveDateTime) -> PathBuf {
    let original = target_dir.join(name.file_name());
    if !original.exists() {
        return original;
    }

    let stamp = format!("_restored_{}", format_timestamp(now));
    let mut target = target_dir.join(name.with_suffix(&stamp));
    let mut counter = 2u32;
    while target.exists() {
        target = target_dir.join(name.with_suffix(&format!("{}_{}", stamp, counter)));
        counter += 1;
    }

    tracing::info!(
        target = %target.display(),
        "restore target exists, writing alongside it"
    );
    target
}

/// Copy `source` to `target` through a temporary sibling
///
/// `target` is only replaced once every byte has been written. Permissions
/// are always carried over; the modification time only when asked, since
/// retention orders backups by when they were written.
pub(crate) fn copy_atomically(
    source: &Path,
    target: &Path,
    preserve_modified: bool,
) -> BackupResult<()> {
    let partial = partial_path(target);

    if let Err(e) = fs::copy(source, &partial) {
        let _ = fs::remove_file(&partial);
        return Err(BackupError::copy_failure(target, e));
    }

    if preserve_modified {
        preserve_modified_time(source, &partial);
    }

    fs::rename(&partial, target).map_err(|e| {
        let _ = fs::remove_file(&partial);
        BackupError::copy_failure(target, e)
    })
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    target.with_file_name(name)
}

/// Best effort: some filesystems (FAT drives, sync mounts) refuse timestamps
fn preserve_modified_time(source: &Path, target: &Path) {
    let result = fs::metadata(source)
        .and_then(|m| m.modified())
        .and_then(|modified| File::options().write(true).open(target)?.set_modified(modified));

    if let Err(e) = result {
        tracing::debug!(target = %target.display(), error = %e, "could not preserve modification time");
    }
}
