//! Configuration module for tally-backup
//!
//! - Platform path resolution
//! - Key/value settings store

pub mod paths;
pub mod store;

pub use paths::{TallyPaths, CONFIG_DIR_ENV};
pub use store::{JsonSettingsStore, MemorySettingsStore, SettingsStore};
