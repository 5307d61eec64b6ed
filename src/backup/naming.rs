//! Backup file naming
//!
//! Every backup is named `<baseName>_<fingerprint>_<yyyy-MM-dd_HH-mm-ss>.<ext>`.
//! Listing, retention and restore all rely on this exact shape.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};

/// Format of the timestamp embedded in backup names
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Width of a formatted timestamp
pub const TIMESTAMP_LEN: usize = 19;

/// Width of a path fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 6;

/// Width of the `_<fingerprint>_<timestamp>` suffix on a backup stem
const SUFFIX_LEN: usize = 1 + FINGERPRINT_LEN + 1 + TIMESTAMP_LEN;

/// Short, stable fingerprint of a database's absolute path
///
/// Distinguishes two databases that share a file name. Not a security
/// mechanism.
pub fn fingerprint(path: &Path) -> String {
    let absolute = absolute_path(path);
    let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
    hex::encode(&digest[..FINGERPRINT_LEN / 2])
}

/// Lexically absolute form of a path (symlinks are not resolved)
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Base name and extension of a database file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseName {
    pub base: String,
    pub extension: Option<String>,
}

impl DatabaseName {
    /// Split a database path into base name and extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let base = path.file_stem()?.to_string_lossy().to_string();
        if base.is_empty() {
            return None;
        }
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .filter(|e| !e.is_empty());
        Some(Self { base, extension })
    }

    /// `.<ext>` or an empty string
    fn dotted_extension(&self) -> String {
        self.extension
            .as_ref()
            .map(|e| format!(".{}", e))
            .unwrap_or_default()
    }

    /// Prefix shared by every backup of this database with this fingerprint
    pub fn backup_prefix(&self, fingerprint: &str) -> String {
        format!("{}_{}_", self.base, fingerprint)
    }

    /// Name of a backup taken at `timestamp`
    pub fn backup_file_name(&self, fingerprint: &str, timestamp: NaiveDateTime) -> String {
        format!(
            "{}{}{}",
            self.backup_prefix(fingerprint),
            timestamp.format(TIMESTAMP_FORMAT),
            self.dotted_extension()
        )
    }

    /// Timestamp of `file_name` if it is a backup of this database
    pub fn match_backup(&self, fingerprint: &str, file_name: &str) -> Option<NaiveDateTime> {
        let rest = file_name.strip_prefix(&self.backup_prefix(fingerprint))?;
        let stamp = rest.strip_suffix(&self.dotted_extension())?;
        parse_timestamp(stamp)
    }

    /// File name with `suffix` inserted before the extension
    pub fn with_suffix(&self, suffix: &str) -> String {
        format!("{}{}{}", self.base, suffix, self.dotted_extension())
    }

    /// The plain `<base>.<ext>` file name
    pub fn file_name(&self) -> String {
        self.with_suffix("")
    }
}

/// Parse a fixed-width `yyyy-MM-dd_HH-mm-ss` timestamp
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if s.len() != TIMESTAMP_LEN {
        return None;
    }
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

/// Format a timestamp for use in a file name
pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Recover the original database name from a backup file name
///
/// Strips the trailing `_<fingerprint>_<timestamp>` from the stem. Returns
/// `None` if the stem does not end in that fixed-width pattern.
pub fn original_name(backup_file: &Path) -> Option<DatabaseName> {
    let name = DatabaseName::from_path(backup_file)?;
    let stem = name.base.as_str();

    if stem.len() <= SUFFIX_LEN {
        return None;
    }
    let split = stem.len() - SUFFIX_LEN;
    if !stem.is_char_boundary(split) {
        return None;
    }

    let (base, suffix) = stem.split_at(split);
    let suffix = suffix.as_bytes();
    let fingerprint = &suffix[1..1 + FINGERPRINT_LEN];
    let stamp = &suffix[2 + FINGERPRINT_LEN..];

    let shaped = suffix[0] == b'_'
        && suffix[1 + FINGERPRINT_LEN] == b'_'
        && fingerprint.iter().all(|b| b.is_ascii_hexdigit());
    if !shaped {
        return None;
    }
    parse_timestamp(std::str::from_utf8(stamp).ok()?)?;

    Some(DatabaseName {
        base: base.to_string(),
        extension: name.extension,
    })
}
