//! Global settings, detection and watch CLI commands

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use clap::Subcommand;

use super::backup::{database_id, format_duration};
use crate::backup::{naming, BackupOrchestrator};
use crate::detect::LocationDetector;
use crate::error::{BackupError, BackupResult};

/// Settings subcommands
#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show global backup settings
    Show,
    /// Change global backup settings
    Set {
        /// Master switch for scheduled backups
        #[arg(long)]
        enabled: Option<bool>,
        /// Run backups on a schedule
        #[arg(long)]
        auto: Option<bool>,
        /// Minutes between scheduled backups (1-60)
        #[arg(long)]
        interval: Option<u32>,
        /// Fallback directory for databases without destinations ("" clears it)
        #[arg(long)]
        legacy_dir: Option<String>,
        /// Backups kept in the legacy directory
        #[arg(long)]
        max_versions: Option<u32>,
        /// Databases included in scheduled backups
        #[arg(long, num_args = 0..)]
        select: Option<Vec<PathBuf>>,
    },
}

/// Handle a settings command
pub fn handle_settings_command(
    orchestrator: &BackupOrchestrator,
    cmd: SettingsCommands,
) -> BackupResult<()> {
    match cmd {
        SettingsCommands::Show => {}

        SettingsCommands::Set {
            enabled,
            auto,
            interval,
            legacy_dir,
            max_versions,
            select,
        } => {
            if let Some(enabled) = enabled {
                orchestrator.set_enabled(enabled)?;
            }
            if let Some(auto) = auto {
                orchestrator.set_auto_backup_enabled(auto)?;
            }
            if let Some(minutes) = interval {
                orchestrator.set_auto_interval_minutes(minutes)?;
            }
            if let Some(dir) = legacy_dir {
                let dir = (!dir.trim().is_empty()).then(|| naming::absolute_path(Path::new(&dir)));
                orchestrator.set_legacy_directory(dir)?;
            }
            if let Some(max) = max_versions {
                orchestrator.set_max_versions(max)?;
            }
            if let Some(databases) = select {
                let ids = databases.iter().map(|db| database_id(db)).collect();
                orchestrator.set_selected_databases(ids)?;
            }
            println!("Settings saved.");
            println!();
        }
    }

    print_settings(orchestrator);
    Ok(())
}

fn print_settings(orchestrator: &BackupOrchestrator) {
    let settings = orchestrator.global_settings();

    println!("Backup Settings");
    println!("===============");
    println!("  Enabled:          {}", settings.enabled);
    println!("  Automatic:        {}", settings.auto_backup_enabled);
    println!("  Interval:         {} minute(s)", settings.auto_interval_minutes);
    println!(
        "  Legacy directory: {}",
        settings
            .legacy_directory
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(none)".into())
    );
    println!("  Legacy versions:  {}", settings.max_versions);

    match orchestrator.last_backup_time() {
        Some(last) => {
            let age = chrono::Utc::now().signed_duration_since(last);
            println!(
                "  Last backup:      {} ({} ago)",
                last.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
                format_duration(age)
            );
        }
        None => println!("  Last backup:      never"),
    }

    if settings.selected_databases.is_empty() {
        println!("  Selected:         (current database only)");
    } else {
        println!("  Selected:");
        for db in &settings.selected_databases {
            println!("    - {}", db);
        }
    }
}

/// Print detected destinations, optionally adding them to a database's policy
pub fn handle_detect(orchestrator: &BackupOrchestrator, add_to: Option<&Path>) -> BackupResult<()> {
    let candidates = LocationDetector::new().detect_all();

    if candidates.is_empty() {
        println!("No cloud folders or removable drives found.");
        return Ok(());
    }

    println!("Detected Locations");
    println!("==================");
    for dest in &candidates {
        let auto = if dest.auto_backup { "auto" } else { "manual" };
        println!("  {} [{}] {}", dest.display_name(), auto, dest.path.display());
    }

    let Some(db) = add_to else {
        return Ok(());
    };

    let id = database_id(db);
    let mut policy = orchestrator.get_database_policy(&id);
    let added = candidates
        .into_iter()
        .filter(|dest| policy.add_destination(dest.clone()))
        .count();
    orchestrator.set_database_policy(&id, policy)?;

    println!();
    println!("Added {} destination(s) to {}", added, id);
    Ok(())
}

/// Run scheduled backups for a database until stdin closes
pub fn handle_watch(orchestrator: &BackupOrchestrator, db: &Path) -> BackupResult<()> {
    let id = database_id(db);
    orchestrator.set_current_database(Some(id.clone()));

    if !orchestrator.start_auto_backup() {
        let settings = orchestrator.global_settings();
        return Err(BackupError::Config(format!(
            "automatic backups are off (enabled: {}, auto: {}); turn them on with \
             `tally-backup settings set --enabled true --auto true`",
            settings.enabled, settings.auto_backup_enabled
        )));
    }

    println!(
        "Backing up {} every {} minute(s). Press Ctrl-C or close stdin to stop.",
        id,
        orchestrator.global_settings().auto_interval_minutes
    );

    for line in io::stdin().lock().lines() {
        if line.is_err() {
            break;
        }
    }

    orchestrator.stop_auto_backup();
    println!("Stopped.");
    Ok(())
}
