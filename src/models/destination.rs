//! Backup destination model
//!
//! A destination is one directory that receives backup copies: a local
//! folder, a removable drive, or a cloud-sync folder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Field separator of the compact encoding
const FIELD_SEPARATOR: char = '|';

/// Name of the marker file used to test a directory for write access
const WRITE_MARKER: &str = ".tally-backup-write-check";

/// Kind of storage behind a destination directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    /// Folder synchronized by a cloud service client
    Cloud,
    /// Removable drive
    Usb,
    /// Local directory
    Local,
}

impl DestinationKind {
    /// Tag used in the compact encoding
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Cloud => "CLOUD",
            Self::Usb => "USB",
            Self::Local => "LOCAL",
        }
    }

    /// Parse a destination kind from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cloud" => Some(Self::Cloud),
            "usb" | "removable" => Some(Self::Usb),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

impl Default for DestinationKind {
    fn default() -> Self {
        Self::Local
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cloud => write!(f, "Cloud"),
            Self::Usb => write!(f, "USB"),
            Self::Local => write!(f, "Local"),
        }
    }
}

/// A directory that receives backup copies
///
/// Two destinations are equal when their paths are equal, regardless of
/// kind, label or auto-backup flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDestination {
    /// Target directory
    pub path: PathBuf,

    /// What kind of storage the directory lives on
    pub kind: DestinationKind,

    /// Optional display name (cloud service, drive label)
    #[serde(default)]
    pub label: Option<String>,

    /// Whether scheduled runs write here, or only manual ones
    #[serde(default = "default_auto_backup")]
    pub auto_backup: bool,
}

fn default_auto_backup() -> bool {
    true
}

impl BackupDestination {
    /// Create a new destination
    pub fn new(path: impl Into<PathBuf>, kind: DestinationKind, label: Option<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            label: label.map(|l| sanitize_label(&l)).filter(|l| !l.is_empty()),
            auto_backup: true,
        }
    }

    /// Create a local directory destination
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DestinationKind::Local, None)
    }

    /// Create a removable drive destination
    pub fn usb(path: impl Into<PathBuf>, label: Option<String>) -> Self {
        Self::new(path, DestinationKind::Usb, label)
    }

    /// Create a cloud-sync folder destination
    pub fn cloud(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self::new(path, DestinationKind::Cloud, Some(label.into()))
    }

    /// Set whether scheduled backups use this destination
    pub fn with_auto_backup(mut self, auto_backup: bool) -> Self {
        self.auto_backup = auto_backup;
        self
    }

    /// Whether the destination is a cloud-sync folder
    pub fn is_cloud(&self) -> bool {
        self.kind == DestinationKind::Cloud
    }

    /// Whether the path survives the compact encoding unchanged
    ///
    /// The path may not be empty and may not contain the field separator
    /// `|` or the destination separator `##`.
    pub fn has_encodable_path(&self) -> bool {
        let path = self.path.to_string_lossy();
        !path.is_empty() && !path.contains(FIELD_SEPARATOR) && !path.contains("##")
    }

    /// Check whether backups can be written here
    ///
    /// An existing directory must accept a marker file; a missing one must be
    /// creatable.
    pub fn is_available(&self) -> bool {
        if self.path.as_os_str().is_empty() {
            return false;
        }

        if self.path.exists() {
            return self.path.is_dir() && is_writable_dir(&self.path);
        }

        match fs::create_dir_all(&self.path) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "destination cannot be created");
                false
            }
        }
    }

    /// Kind-prefixed label, falling back to the path
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) if !label.is_empty() => format!("{}: {}", self.kind, label),
            _ => format!("{}: {}", self.kind, self.path.display()),
        }
    }

    /// Encode as `KIND|PATH|LABEL|AUTOFLAG`
    pub fn serialize(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.kind.tag(),
            self.path.display(),
            self.label.as_deref().unwrap_or(""),
            self.auto_backup,
            sep = FIELD_SEPARATOR,
        )
    }

    /// Decode from `KIND|PATH|LABEL|AUTOFLAG`
    ///
    /// Returns `None` if the input does not have exactly four fields, names
    /// an unknown kind, has an empty path, or an unreadable flag.
    pub fn deserialize(s: &str) -> Option<Self> {
        let fields: Vec<&str> = s.split(FIELD_SEPARATOR).collect();
        if fields.len() != 4 {
            return None;
        }

        let kind = DestinationKind::parse(fields[0])?;
        let path = fields[1];
        if path.trim().is_empty() {
            return None;
        }

        let label = match fields[2].trim() {
            "" => None,
            l => Some(l.to_string()),
        };

        let auto_backup = match fields[3].trim().to_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => return None,
        };

        Some(Self::new(path, kind, label).with_auto_backup(auto_backup))
    }
}

impl PartialEq for BackupDestination {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for BackupDestination {}

impl Hash for BackupDestination {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for BackupDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Strip characters that collide with the policy and destination encodings
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c == FIELD_SEPARATOR || c == '#' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Test a directory for write access by creating and removing a marker file
fn is_writable_dir(dir: &Path) -> bool {
    let marker = dir.join(format!("{}-{}", WRITE_MARKER, std::process::id()));
    let created = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&marker)
        .is_ok();

    if created {
        let _ = fs::remove_file(&marker);
    } else {
        tracing::debug!(path = %dir.display(), "destination is not writable");
    }

    created
}
