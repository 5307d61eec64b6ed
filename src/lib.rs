//! tally-backup - Multi-destination backups for bookkeeping databases
//!
//! This library provides the backup-and-restore engine of a desktop
//! bookkeeping application. It copies a database file to every destination
//! in its policy (cloud sync folders, removable drives, local directories),
//! keeps a bounded number of versions per destination, tells same-named
//! databases apart with a path fingerprint, and runs on a schedule.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Path management and the key/value settings store
//! - `error`: Custom error types
//! - `models`: Destinations, policies, global settings and status values
//! - `storage`: Atomic JSON file I/O
//! - `backup`: The orchestrator (fan-out, retention, restore, scheduling)
//! - `detect`: Cloud folder and removable drive detection
//! - `cli`: Command handlers for the `tally-backup` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_backup::backup::BackupOrchestrator;
//! use tally_backup::config::{JsonSettingsStore, TallyPaths};
//!
//! let paths = TallyPaths::new()?;
//! let orchestrator = BackupOrchestrator::new(JsonSettingsStore::open(paths.settings_file())?);
//! let backups = orchestrator.list_backups("/home/me/books/accounts.db");
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod models;
pub mod storage;

pub use backup::BackupOrchestrator;
pub use error::{BackupError, BackupResult};
