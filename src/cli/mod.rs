//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup orchestrator.

pub mod backup;
pub mod destination;
pub mod settings;

pub use backup::{database_id, handle_backup, handle_fingerprint, handle_list, handle_restore};
pub use destination::{
    handle_destination_command, handle_policy_command, DestinationCommands, KindArg, PolicyCommands,
};
pub use settings::{handle_detect, handle_settings_command, handle_watch, SettingsCommands};
