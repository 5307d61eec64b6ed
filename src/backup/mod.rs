//! Backup system for Tally
//!
//! Copies each database to every destination in its policy, keeps a
//! bounded number of versions per destination, and restores backups next
//! to existing data.
//!
//! # Architecture
//!
//! - `BackupOrchestrator`: fan-out, retention, restore and the automatic schedule
//! - `naming`: the backup filename contract and path fingerprints
//! - `hooks`: collaborators supplied by the host (status sink, source paths, clock)
//!
//! # Backup Format
//!
//! Backups are byte-for-byte copies named
//! `<baseName>_<fingerprint>_<yyyy-MM-dd_HH-mm-ss>.<ext>`, where the
//! fingerprint is six hex characters derived from the database's absolute
//! path. Two databases called `accounts.db` in different folders never
//! share backups.
//!
//! # Retention Policy
//!
//! After each successful copy, the oldest backups of that database in that
//! destination are deleted until at most `max_versions_per_destination`
//! remain.
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_backup::backup::BackupOrchestrator;
//! use tally_backup::config::{JsonSettingsStore, TallyPaths};
//! use tally_backup::models::{BackupDestination, DatabasePolicy};
//!
//! let paths = TallyPaths::new()?;
//! let orchestrator = BackupOrchestrator::new(JsonSettingsStore::open(paths.settings_file())?);
//!
//! let mut policy = DatabasePolicy::new();
//! policy.add_destination(BackupDestination::local("/mnt/backups"));
//! orchestrator.set_database_policy("/home/me/books/accounts.db", policy)?;
//!
//! let written = orchestrator.perform_backup_to_all_destinations("/home/me/books/accounts.db", true);
//! println!("{} destination(s) backed up", written);
//! ```

mod catalog;
pub mod hooks;
pub mod naming;
mod orchestrator;
mod restore;
mod schedule;

pub use catalog::BackupInfo;
pub use hooks::{
    ChannelStatusSink, Clock, IdentifierIsPath, NoopStatusSink, SourcePathProvider, StatusSink,
    SystemClock,
};
pub use naming::{fingerprint, original_name, DatabaseName};
pub use orchestrator::{
    BackupOrchestrator, DestinationOutcome, DestinationResult, FanOutMode, FanOutReport,
    OrchestratorBuilder, POLICY_KEY_PREFIX,
};
