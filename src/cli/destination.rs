//! Destination and policy CLI commands

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};

use super::backup::{database_id, print_policy};
use crate::backup::{naming, BackupOrchestrator};
use crate::error::{BackupError, BackupResult};
use crate::models::{BackupDestination, DestinationKind};

/// Kind of destination to add
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    /// A local or network directory
    Local,
    /// A removable drive
    Usb,
    /// A cloud sync folder
    Cloud,
}

impl From<KindArg> for DestinationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Local => DestinationKind::Local,
            KindArg::Usb => DestinationKind::Usb,
            KindArg::Cloud => DestinationKind::Cloud,
        }
    }
}

/// Destination subcommands
#[derive(Subcommand, Debug)]
pub enum DestinationCommands {
    /// Add a destination to a database's policy
    Add {
        /// Database file
        db: PathBuf,
        /// Directory that receives backups
        path: PathBuf,
        /// Destination kind
        #[arg(short, long, value_enum, default_value = "local")]
        kind: KindArg,
        /// Display label
        #[arg(short, long)]
        label: Option<String>,
        /// Only back up here on manual runs
        #[arg(long)]
        manual: bool,
    },
    /// Remove a destination from a database's policy
    Remove {
        /// Database file
        db: PathBuf,
        /// Destination directory
        path: PathBuf,
    },
    /// List a database's destinations
    List {
        /// Database file
        db: PathBuf,
    },
}

/// Policy subcommands
#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Show a database's backup policy
    Show {
        /// Database file
        db: PathBuf,
    },
    /// Change a database's backup policy
    Set {
        /// Database file
        db: PathBuf,
        /// Whether scheduled backups run for this database
        #[arg(long)]
        enabled: Option<bool>,
        /// Backups kept per destination
        #[arg(long)]
        max_versions: Option<u32>,
    },
}

/// Handle a destination command
pub fn handle_destination_command(
    orchestrator: &BackupOrchestrator,
    cmd: DestinationCommands,
) -> BackupResult<()> {
    match cmd {
        DestinationCommands::Add {
            db,
            path,
            kind,
            label,
            manual,
        } => {
            let id = database_id(&db);
            let path = naming::absolute_path(&path);
            let destination = BackupDestination::new(path, kind.into(), label).with_auto_backup(!manual);
            if !destination.has_encodable_path() {
                return Err(BackupError::Config(format!(
                    "{} cannot be used as a destination: paths may not contain '|' or '##'",
                    destination.path.display()
                )));
            }

            let mut policy = orchestrator.get_database_policy(&id);
            if !policy.add_destination(destination.clone()) {
                return Err(BackupError::Config(format!(
                    "{} is already a destination for {}",
                    destination.path.display(),
                    id
                )));
            }
            orchestrator.set_database_policy(&id, policy)?;

            println!("Added destination: {}", destination.display_name());
            if !destination.is_available() {
                println!("Warning: {} is not writable right now.", destination.path.display());
            }
        }

        DestinationCommands::Remove { db, path } => {
            let id = database_id(&db);
            let path = naming::absolute_path(&path);
            let mut policy = orchestrator.get_database_policy(&id);
            if !policy.remove_destination(&path) {
                return Err(BackupError::Config(format!(
                    "{} is not a destination for {}",
                    path.display(),
                    id
                )));
            }
            orchestrator.set_database_policy(&id, policy)?;
            println!("Removed destination: {}", path.display());
        }

        DestinationCommands::List { db } => {
            let id = database_id(&db);
            print_policy(&id, &orchestrator.get_database_policy(&id));
        }
    }

    Ok(())
}

/// Handle a policy command
pub fn handle_policy_command(orchestrator: &BackupOrchestrator, cmd: PolicyCommands) -> BackupResult<()> {
    match cmd {
        PolicyCommands::Show { db } => {
            let id = database_id(&db);
            print_policy(&id, &orchestrator.get_database_policy(&id));
        }

        PolicyCommands::Set {
            db,
            enabled,
            max_versions,
        } => {
            let id = database_id(&db);
            let mut policy = orchestrator.get_database_policy(&id);
            if let Some(enabled) = enabled {
                policy.enabled = enabled;
            }
            if let Some(max) = max_versions {
                policy.set_max_versions(max);
            }
            orchestrator.set_database_policy(&id, policy.clone())?;
            print_policy(&id, &policy);
        }
    }

    Ok(())
}
