//! Collaborators injected into the orchestrator
//!
//! The host application supplies where a database lives, where status
//! updates go, and (in tests) what time it is.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use crossbeam_channel::Sender;

use crate::models::BackupStatus;

/// Receives status transitions while backups run
pub trait StatusSink: Send + Sync {
    fn status_changed(&self, status: BackupStatus);
}

/// Sink that discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatusSink;

impl StatusSink for NoopStatusSink {
    fn status_changed(&self, _status: BackupStatus) {}
}

impl<F> StatusSink for F
where
    F: Fn(BackupStatus) + Send + Sync,
{
    fn status_changed(&self, status: BackupStatus) {
        self(status)
    }
}

/// Forwards status updates over a channel
#[derive(Debug, Clone)]
pub struct ChannelStatusSink(pub Sender<BackupStatus>);

impl StatusSink for ChannelStatusSink {
    fn status_changed(&self, status: BackupStatus) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.0.send(status);
    }
}

/// Resolves a database identifier to the file that holds it
pub trait SourcePathProvider: Send + Sync {
    fn source_path(&self, database_id: &str) -> Option<PathBuf>;
}

/// Treats the identifier itself as the database path
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentifierIsPath;

impl SourcePathProvider for IdentifierIsPath {
    fn source_path(&self, database_id: &str) -> Option<PathBuf> {
        if database_id.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(database_id))
        }
    }
}

impl<F> SourcePathProvider for F
where
    F: Fn(&str) -> Option<PathBuf> + Send + Sync,
{
    fn source_path(&self, database_id: &str) -> Option<PathBuf> {
        self(database_id)
    }
}

/// Source of wall-clock time for backup names
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The system's local time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ManualClock {
    current: parking_lot::Mutex<DateTime<Local>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: parking_lot::Mutex::new(start),
        }
    }

    /// Move the clock forward (or backward, with a negative duration)
    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.current.lock();
        *current += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock()
    }
}
