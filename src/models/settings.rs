//! Global backup settings
//!
//! Switches that apply to every database, plus the single-directory
//! configuration kept for setups that predate per-database destinations.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::store::SettingsStore;

/// Settings store keys
pub mod keys {
    pub const ENABLED: &str = "enabled";
    pub const AUTO_ENABLED: &str = "autoEnabled";
    pub const AUTO_INTERVAL_MINUTES: &str = "autoIntervalMinutes";
    pub const LEGACY_DIRECTORY: &str = "legacyDirectory";
    pub const MAX_VERSIONS: &str = "maxVersions";
    pub const LAST_BACKUP_TIMESTAMP: &str = "lastBackupTimestamp";
    pub const SELECTED_DATABASES: &str = "selectedDatabases";
}

/// Separator for the selected database list; identifiers never contain it
const SELECTED_SEPARATOR: char = '\n';

pub const MIN_INTERVAL_MINUTES: u32 = 1;
pub const MAX_INTERVAL_MINUTES: u32 = 60;

/// Global backup settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Master switch for scheduled backups
    pub enabled: bool,

    /// Whether the periodic schedule runs
    pub auto_backup_enabled: bool,

    /// Minutes between scheduled runs (1 to 60)
    pub auto_interval_minutes: u32,

    /// Destination used when a database has no destinations of its own
    pub legacy_directory: Option<PathBuf>,

    /// Retention for the legacy destination
    pub max_versions: u32,

    /// When the last successful backup finished, in epoch milliseconds
    pub last_backup_timestamp: Option<i64>,

    /// Databases backed up by scheduled runs, in order
    pub selected_databases: Vec<String>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_backup_enabled: false,
            auto_interval_minutes: 30,
            legacy_directory: None,
            max_versions: 10,
            last_backup_timestamp: None,
            selected_databases: Vec::new(),
        }
    }
}

impl GlobalSettings {
    /// Read settings from a store, using defaults for missing or unreadable keys
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();

        let mut settings = Self {
            enabled: read_bool(store, keys::ENABLED).unwrap_or(defaults.enabled),
            auto_backup_enabled: read_bool(store, keys::AUTO_ENABLED)
                .unwrap_or(defaults.auto_backup_enabled),
            auto_interval_minutes: read_parsed(store, keys::AUTO_INTERVAL_MINUTES)
                .unwrap_or(defaults.auto_interval_minutes),
            legacy_directory: store
                .get(keys::LEGACY_DIRECTORY)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            max_versions: read_parsed(store, keys::MAX_VERSIONS).unwrap_or(defaults.max_versions),
            last_backup_timestamp: read_parsed(store, keys::LAST_BACKUP_TIMESTAMP),
            selected_databases: Vec::new(),
        };

        settings.set_auto_interval_minutes(settings.auto_interval_minutes);
        settings.set_max_versions(settings.max_versions);
        if let Some(joined) = store.get(keys::SELECTED_DATABASES) {
            settings.set_selected_databases(joined.split(SELECTED_SEPARATOR).map(String::from));
        }

        settings
    }

    /// Write every field into a store (does not flush)
    pub fn store_into(&self, store: &mut dyn SettingsStore) {
        store.set(keys::ENABLED, &self.enabled.to_string());
        store.set(keys::AUTO_ENABLED, &self.auto_backup_enabled.to_string());
        store.set(
            keys::AUTO_INTERVAL_MINUTES,
            &self.auto_interval_minutes.to_string(),
        );
        match &self.legacy_directory {
            Some(dir) => store.set(keys::LEGACY_DIRECTORY, &dir.display().to_string()),
            None => store.remove(keys::LEGACY_DIRECTORY),
        }
        store.set(keys::MAX_VERSIONS, &self.max_versions.to_string());
        match self.last_backup_timestamp {
            Some(ts) => store.set(keys::LAST_BACKUP_TIMESTAMP, &ts.to_string()),
            None => store.remove(keys::LAST_BACKUP_TIMESTAMP),
        }
        let joined = self
            .selected_databases
            .join(&SELECTED_SEPARATOR.to_string());
        store.set(keys::SELECTED_DATABASES, &joined);
    }

    /// Set the schedule interval, clamped to 1..=60 minutes
    pub fn set_auto_interval_minutes(&mut self, minutes: u32) {
        self.auto_interval_minutes = minutes.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);
    }

    /// Set the legacy retention count (at least 1)
    pub fn set_max_versions(&mut self, max_versions: u32) {
        self.max_versions = max_versions.max(1);
    }

    /// Replace the selected databases, dropping blanks and duplicates
    pub fn set_selected_databases<I>(&mut self, databases: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.selected_databases.clear();
        for db in databases {
            let db = db.trim().to_string();
            if db.is_empty() || db.contains(SELECTED_SEPARATOR) {
                continue;
            }
            if !self.selected_databases.contains(&db) {
                self.selected_databases.push(db);
            }
        }
    }

    /// Last successful backup as a timestamp
    pub fn last_backup_time(&self) -> Option<DateTime<Utc>> {
        self.last_backup_timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

fn read_bool(store: &dyn SettingsStore, key: &str) -> Option<bool> {
    match store.get(key)?.trim().to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn read_parsed<T: std::str::FromStr>(store: &dyn SettingsStore, key: &str) -> Option<T> {
    store.get(key)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::MemorySettingsStore;

    #[test]
    fn test_default_settings() {
        let settings = GlobalSettings::default();
        assert!(!settings.enabled);
        assert!(!settings.auto_backup_enabled);
        assert_eq!(settings.auto_interval_minutes, 30);
        assert_eq!(settings.max_versions, 10);
        assert!(settings.legacy_directory.is_none());
        assert!(settings.selected_databases.is_empty());
    }

    #[test]
    fn test_load_from_empty_store() {
        let store = MemorySettingsStore::new();
        assert_eq!(GlobalSettings::load(&store), GlobalSettings::default());
    }

    #[test]
    fn test_store_and_load() {
        let mut settings = GlobalSettings::default();
        settings.enabled = true;
        settings.auto_backup_enabled = true;
        settings.set_auto_interval_minutes(15);
        settings.legacy_directory = Some(PathBuf::from("/srv/legacy"));
        settings.set_max_versions(4);
        settings.last_backup_timestamp = Some(1_700_000_000_000);
        settings.set_selected_databases(vec!["/data/a.db".to_string(), "/data/b.db".to_string()]);

        let mut store = MemorySettingsStore::new();
        settings.store_into(&mut store);

        assert_eq!(store.get(keys::AUTO_ENABLED).as_deref(), Some("true"));
        assert_eq!(GlobalSettings::load(&store), settings);
    }

    #[test]
    fn test_interval_clamped() {
        let mut settings = GlobalSettings::default();
        settings.set_auto_interval_minutes(0);
        assert_eq!(settings.auto_interval_minutes, 1);
        settings.set_auto_interval_minutes(500);
        assert_eq!(settings.auto_interval_minutes, 60);

        let mut store = MemorySettingsStore::new();
        store.set(keys::AUTO_INTERVAL_MINUTES, "90");
        assert_eq!(GlobalSettings::load(&store).auto_interval_minutes, 60);
    }

    #[test]
    fn test_unreadable_values_fall_back() {
        let mut store = MemorySettingsStore::new();
        store.set(keys::ENABLED, "sometimes");
        store.set(keys::MAX_VERSIONS, "-3");
        store.set(keys::LEGACY_DIRECTORY, "  ");

        let settings = GlobalSettings::load(&store);
        assert!(!settings.enabled);
        assert_eq!(settings.max_versions, 10);
        assert!(settings.legacy_directory.is_none());
    }

    #[test]
    fn test_selected_databases_deduplicated() {
        let mut settings = GlobalSettings::default();
        settings.set_selected_databases(vec![
            "/a.db".to_string(),
            " ".to_string(),
            "/b.db".to_string(),
            "/a.db".to_string(),
        ]);
        assert_eq!(settings.selected_databases, vec!["/a.db", "/b.db"]);
    }

    #[test]
    fn test_last_backup_time() {
        let mut settings = GlobalSettings::default();
        assert!(settings.last_backup_time().is_none());

        settings.last_backup_timestamp = Some(0);
        assert_eq!(settings.last_backup_time().unwrap().timestamp(), 0);
    }
}
