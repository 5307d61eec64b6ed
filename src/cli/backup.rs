//! Backup CLI commands
//!
//! Back up now, list backups, restore, and show a database's fingerprint.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::backup::{naming, BackupOrchestrator, DestinationResult, FanOutMode};
use crate::error::{BackupError, BackupResult};
use crate::models::DatabasePolicy;

/// Identifier under which a database's policy is stored: its absolute path
pub fn database_id(db: &Path) -> String {
    naming::absolute_path(db).display().to_string()
}

/// Back up a database to all of its destinations now
pub fn handle_backup(orchestrator: &BackupOrchestrator, db: &Path) -> BackupResult<()> {
    let id = database_id(db);
    println!("Backing up {}...", id);

    let report = orchestrator.backup_database(&id, true);
    match report.mode {
        FanOutMode::SourceMissing => return Err(BackupError::SourceMissing(db.to_path_buf())),
        FanOutMode::NoDestinations => {
            println!("No backup destinations configured.");
            println!("Add one with: tally-backup destination add {} <dir>", id);
            return Err(BackupError::Config("no backup destinations configured".into()));
        }
        FanOutMode::Legacy => println!("Using the legacy backup directory."),
        FanOutMode::Skipped | FanOutMode::Destinations => {}
    }

    for outcome in &report.outcomes {
        let name = outcome.destination.display_name();
        match &outcome.result {
            DestinationResult::Written(path) => println!("  [ok]     {} -> {}", name, path.display()),
            DestinationResult::Failed(reason) => println!("  [failed] {}: {}", name, reason),
            DestinationResult::Unavailable => println!("  [skip]   {}: unavailable", name),
        }
    }

    println!();
    println!(
        "{} of {} destination(s) backed up",
        report.succeeded(),
        report.outcomes.len()
    );

    if report.succeeded() == 0 {
        return Err(BackupError::copy_failure(db, "no destination received a backup"));
    }
    Ok(())
}

/// List backups of a database, newest first
pub fn handle_list(orchestrator: &BackupOrchestrator, db: &Path, verbose: bool) -> BackupResult<()> {
    let id = database_id(db);
    let backups = orchestrator.list_backups(&id);

    if backups.is_empty() {
        println!("No backups found.");
        println!("Create one with: tally-backup backup {}", id);
        return Ok(());
    }

    println!("Available Backups");
    println!("=================");
    println!();

    let now = Local::now().naive_local();
    for (i, backup) in backups.iter().enumerate() {
        let age_str = format_duration(now.signed_duration_since(backup.created_at));

        if verbose {
            println!(
                "{}. {}\n   Destination: {}\n   Created: {}\n   Size: {}\n   Age: {}\n   Path: {}\n",
                i + 1,
                backup.filename,
                backup.destination.display_name(),
                backup.created_at.format("%Y-%m-%d %H:%M:%S"),
                format_size(backup.size_bytes),
                age_str,
                backup.path.display(),
            );
        } else {
            println!(
                "  {}. {} ({} ago, {}) [{}]",
                i + 1,
                backup.filename,
                age_str,
                format_size(backup.size_bytes),
                backup.destination.display_name(),
            );
        }
    }

    println!();
    println!("Total: {} backup(s)", backups.len());
    Ok(())
}

/// Restore a backup file into a directory
pub fn handle_restore(
    orchestrator: &BackupOrchestrator,
    backup: &Path,
    target_dir: &Path,
) -> BackupResult<()> {
    if !backup.is_file() {
        return Err(BackupError::SourceMissing(backup.to_path_buf()));
    }

    match orchestrator.restore_backup(backup, target_dir) {
        Some(restored) => {
            println!("Restored: {}", restored.display());
            if naming::original_name(backup).is_none() {
                println!("Note: the file name did not look like a backup; it was restored as-is.");
            }
            Ok(())
        }
        None => Err(BackupError::copy_failure(target_dir, "restore failed, see log for details")),
    }
}

/// Print a database's fingerprint and the prefix of its backups
pub fn handle_fingerprint(db: &Path) -> BackupResult<()> {
    let absolute: PathBuf = naming::absolute_path(db);
    let fingerprint = naming::fingerprint(&absolute);
    let name = naming::DatabaseName::from_path(&absolute)
        .ok_or_else(|| BackupError::InvalidBackupName(db.display().to_string()))?;

    println!("Database:    {}", absolute.display());
    println!("Fingerprint: {}", fingerprint);
    println!("Prefix:      {}", name.backup_prefix(&fingerprint));
    Ok(())
}

/// Print a policy in the form shared by `policy show` and `destination list`
pub fn print_policy(id: &str, policy: &DatabasePolicy) {
    println!("Backup policy for {}", id);
    println!("  Enabled:      {}", policy.enabled);
    println!("  Max versions: {} per destination", policy.max_versions_per_destination);

    if !policy.has_destinations() {
        println!("  Destinations: none");
        return;
    }

    println!("  Destinations:");
    for (i, dest) in policy.destinations().iter().enumerate() {
        let auto = if dest.auto_backup { "auto" } else { "manual" };
        let available = if dest.is_available() { "" } else { " (unavailable)" };
        println!(
            "    {}. {} [{}] {}{}",
            i + 1,
            dest.display_name(),
            auto,
            dest.path.display(),
            available
        );
    }
}

/// Format a duration in human-readable form
pub(crate) fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

/// Format a file size in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::seconds(-5)), "0s");
        assert_eq!(format_duration(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_duration(chrono::Duration::minutes(5)), "5m");
        assert_eq!(format_duration(chrono::Duration::hours(3)), "3h");
        assert_eq!(format_duration(chrono::Duration::days(2)), "2d");
        assert_eq!(format_duration(chrono::Duration::days(65)), "2mo");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_database_id_is_absolute() {
        let id = database_id(Path::new("books/accounts.db"));
        assert!(Path::new(&id).is_absolute());
        assert!(id.ends_with("accounts.db"));
    }
}
