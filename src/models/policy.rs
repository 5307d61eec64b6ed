//! Per-database backup policy
//!
//! Each logical database carries its own enabled flag, retention count and
//! ordered list of destinations.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::destination::BackupDestination;

/// Separator between the header fields and the destination list
const SECTION_SEPARATOR: char = ';';

/// Separator between encoded destinations
const DESTINATION_SEPARATOR: &str = "##";

/// Default number of backups kept per destination
pub const DEFAULT_MAX_VERSIONS_PER_DESTINATION: u32 = 5;

/// Backup configuration for one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabasePolicy {
    /// Whether scheduled backups run for this database
    pub enabled: bool,

    /// How many backups to keep in each destination
    pub max_versions_per_destination: u32,

    /// Destinations in the order they are written
    destinations: Vec<BackupDestination>,
}

impl Default for DatabasePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_versions_per_destination: DEFAULT_MAX_VERSIONS_PER_DESTINATION,
            destinations: Vec::new(),
        }
    }
}

impl DatabasePolicy {
    /// Create a policy with default settings and no destinations
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy with a retention count (clamped to at least 1)
    pub fn with_max_versions(max_versions: u32) -> Self {
        let mut policy = Self::default();
        policy.set_max_versions(max_versions);
        policy
    }

    /// Set the per-destination retention count (clamped to at least 1)
    pub fn set_max_versions(&mut self, max_versions: u32) {
        self.max_versions_per_destination = max_versions.max(1);
    }

    /// All configured destinations, in order
    pub fn destinations(&self) -> &[BackupDestination] {
        &self.destinations
    }

    /// Find a destination by path
    pub fn destination(&self, path: &Path) -> Option<&BackupDestination> {
        self.destinations.iter().find(|d| d.path == path)
    }

    /// Add a destination unless one with the same path already exists
    ///
    /// Paths that cannot be encoded (see
    /// [`BackupDestination::has_encodable_path`]) are refused as well.
    /// Returns `true` if the destination was added.
    pub fn add_destination(&mut self, destination: BackupDestination) -> bool {
        if !destination.has_encodable_path() {
            tracing::warn!(
                path = %destination.path.display(),
                "refusing destination whose path cannot be stored"
            );
            return false;
        }
        if self.destinations.contains(&destination) {
            return false;
        }
        self.destinations.push(destination);
        true
    }

    /// Remove the destination with the given path
    ///
    /// Returns `true` if a destination was removed.
    pub fn remove_destination(&mut self, path: &Path) -> bool {
        let before = self.destinations.len();
        self.destinations.retain(|d| d.path != path);
        self.destinations.len() != before
    }

    /// Change whether a destination participates in scheduled backups
    ///
    /// Returns `true` if the destination exists.
    pub fn set_auto_backup(&mut self, path: &Path, auto_backup: bool) -> bool {
        match self.destinations.iter_mut().find(|d| d.path == path) {
            Some(dest) => {
                dest.auto_backup = auto_backup;
                true
            }
            None => false,
        }
    }

    /// Destinations used by scheduled backups: auto-enabled and reachable
    pub fn auto_backup_destinations(&self) -> Vec<BackupDestination> {
        self.destinations
            .iter()
            .filter(|d| d.auto_backup && d.is_available())
            .cloned()
            .collect()
    }

    /// Destinations used by manual backups: anything reachable
    pub fn available_destinations(&self) -> Vec<BackupDestination> {
        self.destinations
            .iter()
            .filter(|d| d.is_available())
            .cloned()
            .collect()
    }

    /// Whether any destination is configured
    pub fn has_destinations(&self) -> bool {
        !self.destinations.is_empty()
    }

    /// Encode as `enabled;maxVersions;loc1##loc2##...`
    pub fn serialize(&self) -> String {
        let locations: Vec<String> = self.destinations.iter().map(|d| d.serialize()).collect();
        format!(
            "{}{sep}{}{sep}{}",
            self.enabled,
            self.max_versions_per_destination,
            locations.join(DESTINATION_SEPARATOR),
            sep = SECTION_SEPARATOR,
        )
    }

    /// Decode from `enabled;maxVersions;loc1##loc2##...`
    ///
    /// Malformed destination segments are skipped. Returns `None` only when
    /// the enabled flag or retention count cannot be read.
    pub fn deserialize(s: &str) -> Option<Self> {
        let mut sections = s.splitn(3, SECTION_SEPARATOR);

        let enabled = match sections.next()?.trim().to_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => return None,
        };
        let max_versions: u32 = sections.next()?.trim().parse().ok()?;

        let mut policy = Self::with_max_versions(max_versions);
        policy.enabled = enabled;

        let locations = sections.next().unwrap_or("");
        for segment in locations.split(DESTINATION_SEPARATOR) {
            if segment.trim().is_empty() {
                continue;
            }
            match BackupDestination::deserialize(segment) {
                Some(dest) => {
                    if !policy.add_destination(dest) {
                        tracing::debug!(segment, "dropping duplicate destination");
                    }
                }
                None => tracing::warn!(segment, "skipping malformed destination entry"),
            }
        }

        Some(policy)
    }
}
