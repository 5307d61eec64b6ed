//! Key/value settings store
//!
//! The orchestrator persists its global settings and per-database policies
//! as plain string pairs. Hosts supply the store; two implementations ship
//! here: an in-memory map and an atomically written JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::BackupResult;
use crate::storage::file_io::{read_json, write_json_atomic};

/// String key/value store used for all persisted backup configuration
pub trait SettingsStore: Send {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Set a value (in memory until `save`)
    fn set(&mut self, key: &str, value: &str);

    /// Remove a value (in memory until `save`)
    fn remove(&mut self, key: &str);

    /// All keys currently present
    fn keys(&self) -> Vec<String>;

    /// Flush to persistent storage
    fn save(&mut self) -> BackupResult<()>;
}

/// Settings store that lives only in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    values: BTreeMap<String, String>,
    saves: usize,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `save` has been called
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn save(&mut self) -> BackupResult<()> {
        self.saves += 1;
        Ok(())
    }
}

/// Settings store backed by a JSON object on disk
///
/// The whole map is rewritten on every `save` with a temp-file-and-rename,
/// so a crash leaves either the old or the new file.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonSettingsStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> BackupResult<Self> {
        let path = path.into();
        let values: BTreeMap<String, String> = read_json(&path)?;
        tracing::debug!(path = %path.display(), entries = values.len(), "loaded settings");
        Ok(Self { path, values })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn save(&mut self) -> BackupResult<()> {
        write_json_atomic(&self.path, &self.values)
    }
}
