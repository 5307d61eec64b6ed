//! Backup orchestrator
//!
//! Copies a database to every destination in its policy, trims old copies,
//! restores backups, and owns the automatic backup schedule. All persisted
//! configuration flows through the injected [`SettingsStore`].

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;

use super::catalog::{self, BackupInfo};
use super::hooks::{Clock, IdentifierIsPath, NoopStatusSink, SourcePathProvider, StatusSink, SystemClock};
use super::naming::{self, DatabaseName};
use super::restore;
use super::schedule::AutoBackupSchedule;
use crate::config::store::SettingsStore;
use crate::error::{BackupError, BackupResult};
use crate::models::{BackupDestination, BackupStatus, DatabasePolicy, GlobalSettings};

/// Settings key prefix for per-database policies
pub const POLICY_KEY_PREFIX: &str = "policy:";

/// What happened to one destination during a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationResult {
    /// Backup written to this path
    Written(PathBuf),
    /// Destination was reachable but the backup failed
    Failed(String),
    /// Destination could not be reached, nothing attempted
    Unavailable,
}

/// Outcome for one destination
#[derive(Debug, Clone)]
pub struct DestinationOutcome {
    pub destination: BackupDestination,
    pub result: DestinationResult,
}

impl DestinationOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.result, DestinationResult::Written(_))
    }
}

/// How a fan-out run was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOutMode {
    /// Backups are disabled (globally or for this database) for scheduled runs
    Skipped,
    /// The source database could not be found
    SourceMissing,
    /// Neither per-database destinations nor a legacy directory exist
    NoDestinations,
    /// The legacy single directory was used
    Legacy,
    /// The database's own destinations were used
    Destinations,
}

/// Result of backing up one database to all of its destinations
#[derive(Debug, Clone)]
pub struct FanOutReport {
    pub database_id: String,
    pub mode: FanOutMode,
    pub outcomes: Vec<DestinationOutcome>,
}

impl FanOutReport {
    fn new(database_id: &str, mode: FanOutMode) -> Self {
        Self {
            database_id: database_id.to_string(),
            mode,
            outcomes: Vec::new(),
        }
    }

    /// Number of destinations that received a backup
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// Number of destinations that were attempted or unreachable but got nothing
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Whether the user needs to configure a destination before retrying
    pub fn needs_configuration(&self) -> bool {
        self.mode == FanOutMode::NoDestinations
    }
}

/// Mutable state shared with the scheduler thread
struct State {
    store: Box<dyn SettingsStore>,
    settings: GlobalSettings,
    policies: HashMap<String, DatabasePolicy>,
    current_database: Option<String>,
}

impl State {
    /// Write global settings into the store and flush it
    fn flush(&mut self) -> BackupResult<()> {
        self.settings.store_into(self.store.as_mut());
        self.store.save()
    }
}

/// The orchestrator's internals, shared with the scheduler thread
pub(crate) struct Inner {
    state: Mutex<State>,
    /// Serializes the top-level backup and restore entry points
    run_lock: Mutex<()>,
    last_stamp: Mutex<Option<NaiveDateTime>>,
    auto_running: AtomicBool,
    sink: Arc<dyn StatusSink>,
    sources: Arc<dyn SourcePathProvider>,
    clock: Arc<dyn Clock>,
}

/// Builder for [`BackupOrchestrator`]
pub struct OrchestratorBuilder {
    store: Box<dyn SettingsStore>,
    sink: Arc<dyn StatusSink>,
    sources: Arc<dyn SourcePathProvider>,
    clock: Arc<dyn Clock>,
}

impl OrchestratorBuilder {
    /// Where status transitions are reported
    pub fn status_sink(mut self, sink: impl StatusSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// How database identifiers map to files
    pub fn source_paths(mut self, sources: impl SourcePathProvider + 'static) -> Self {
        self.sources = Arc::new(sources);
        self
    }

    /// Time source for backup names
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> BackupOrchestrator {
        let settings = GlobalSettings::load(self.store.as_ref());
        let policies = load_policies(self.store.as_ref());
        tracing::debug!(policies = policies.len(), "backup orchestrator loaded settings");

        BackupOrchestrator {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    store: self.store,
                    settings,
                    policies,
                    current_database: None,
                }),
                run_lock: Mutex::new(()),
                last_stamp: Mutex::new(None),
                auto_running: AtomicBool::new(false),
                sink: self.sink,
                sources: self.sources,
                clock: self.clock,
            }),
            schedule: Mutex::new(None),
        }
    }
}

fn load_policies(store: &dyn SettingsStore) -> HashMap<String, DatabasePolicy> {
    let mut policies = HashMap::new();
    for key in store.keys() {
        let Some(database_id) = key.strip_prefix(POLICY_KEY_PREFIX) else {
            continue;
        };
        let Some(blob) = store.get(&key) else {
            continue;
        };
        match DatabasePolicy::deserialize(&blob) {
            Some(policy) => {
                policies.insert(database_id.to_string(), policy);
            }
            None => tracing::warn!(database = database_id, "ignoring unreadable backup policy"),
        }
    }
    policies
}

/// Backs up databases to their configured destinations
///
/// One instance per process. Every public operation is safe to call from
/// any thread; copies block the caller.
pub struct BackupOrchestrator {
    inner: Arc<Inner>,
    schedule: Mutex<Option<AutoBackupSchedule>>,
}

impl BackupOrchestrator {
    /// Create an orchestrator with default collaborators
    pub fn new(store: impl SettingsStore + 'static) -> Self {
        Self::builder(store).build()
    }

    pub fn builder(store: impl SettingsStore + 'static) -> OrchestratorBuilder {
        OrchestratorBuilder {
            store: Box::new(store),
            sink: Arc::new(NoopStatusSink),
            sources: Arc::new(IdentifierIsPath),
            clock: Arc::new(SystemClock),
        }
    }

    // ------------------------------------------------------------------
    // Backup and restore
    // ------------------------------------------------------------------

    /// Back up `db_path` into one destination and trim old copies there
    ///
    /// Returns `false` on any failure; the cause is logged.
    pub fn perform_backup_to_destination(
        &self,
        db_path: &Path,
        destination: &BackupDestination,
        max_versions: u32,
    ) -> bool {
        let _run = self.inner.run_lock.lock();
        let ok = self
            .inner
            .backup_to_destination(db_path, destination, max_versions)
            .is_ok();
        self.inner.emit_resting();
        ok
    }

    /// Back up a database to all of its destinations
    ///
    /// Returns how many destinations succeeded. `force` is a manual "back up
    /// now": it ignores the enabled flags and the auto-backup filter.
    pub fn perform_backup_to_all_destinations(&self, database_id: &str, force: bool) -> usize {
        self.backup_database(database_id, force).succeeded()
    }

    /// Like [`perform_backup_to_all_destinations`](Self::perform_backup_to_all_destinations),
    /// with per-destination results
    pub fn backup_database(&self, database_id: &str, force: bool) -> FanOutReport {
        let _run = self.inner.run_lock.lock();
        let report = self.inner.fan_out(database_id, force);
        self.inner.emit_resting();
        report
    }

    /// Run one scheduled pass over the selected databases
    ///
    /// Returns the total number of successful destination backups.
    pub fn perform_auto_backup(&self) -> usize {
        self.inner.perform_auto_backup()
    }

    /// Restore a backup into `target_dir` under its original database name
    ///
    /// Never overwrites an existing file. Returns `None` on failure; the
    /// cause is logged.
    pub fn restore_backup(&self, backup_file: &Path, target_dir: &Path) -> Option<PathBuf> {
        let _run = self.inner.run_lock.lock();
        let now = self.inner.clock.now().naive_local();

        match restore::restore_file(backup_file, target_dir, now) {
            Ok(restored) => {
                tracing::info!(
                    backup = %backup_file.display(),
                    restored = %restored.display(),
                    "backup restored"
                );
                Some(restored)
            }
            Err(e) => {
                tracing::warn!(backup = %backup_file.display(), error = %e, "restore failed");
                None
            }
        }
    }

    /// All backups of a database across its destinations, newest first
    pub fn list_backups(&self, database_id: &str) -> Vec<BackupInfo> {
        let source = self.inner.source_path(database_id);
        let Some(name) = DatabaseName::from_path(&source) else {
            return Vec::new();
        };
        let fingerprint = naming::fingerprint(&source);

        let mut backups = Vec::new();
        for destination in self.inner.listing_destinations(database_id) {
            match catalog::scan_destination(&destination, &name, &fingerprint) {
                Ok(found) => backups.extend(found),
                Err(e) => tracing::warn!(
                    destination = %destination.path.display(),
                    error = %e,
                    "could not list backups"
                ),
            }
        }

        catalog::sort_newest_first(&mut backups);
        backups
    }

    /// Number of backups of a database across its destinations
    pub fn get_backup_count(&self, database_id: &str) -> usize {
        self.list_backups(database_id).len()
    }

    // ------------------------------------------------------------------
    // Policies
    // ------------------------------------------------------------------

    /// The policy for a database, created with defaults on first use
    ///
    /// A newly created policy is not persisted until it is set.
    pub fn get_database_policy(&self, database_id: &str) -> DatabasePolicy {
        let mut state = self.inner.state.lock();
        state
            .policies
            .entry(database_id.to_string())
            .or_default()
            .clone()
    }

    /// Store and persist a database's policy
    pub fn set_database_policy(&self, database_id: &str, policy: DatabasePolicy) -> BackupResult<()> {
        let mut state = self.inner.state.lock();
        let key = policy_key(database_id);
        state.store.set(&key, &policy.serialize());
        state.policies.insert(database_id.to_string(), policy);
        state.flush()
    }

    /// Forget a database's policy; returns whether one was stored
    pub fn remove_database_policy(&self, database_id: &str) -> BackupResult<bool> {
        let mut state = self.inner.state.lock();
        let key = policy_key(database_id);
        let persisted = state.store.get(&key).is_some();
        state.store.remove(&key);
        let cached = state.policies.remove(database_id).is_some();
        state.flush()?;
        Ok(persisted || cached)
    }

    /// Identifiers of every database with a known policy
    pub fn database_ids(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut ids: Vec<String> = state.policies.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ------------------------------------------------------------------
    // Global settings
    // ------------------------------------------------------------------

    /// A copy of the global settings
    pub fn global_settings(&self) -> GlobalSettings {
        self.inner.state.lock().settings.clone()
    }

    pub fn set_enabled(&self, enabled: bool) -> BackupResult<()> {
        self.update_settings(|s| s.enabled = enabled)?;
        self.inner.emit_resting();
        Ok(())
    }

    pub fn set_auto_backup_enabled(&self, enabled: bool) -> BackupResult<()> {
        self.update_settings(|s| s.auto_backup_enabled = enabled)
    }

    /// Set the schedule interval (clamped to 1..=60 minutes)
    ///
    /// Takes effect the next time the schedule is started.
    pub fn set_auto_interval_minutes(&self, minutes: u32) -> BackupResult<()> {
        self.update_settings(|s| s.set_auto_interval_minutes(minutes))
    }

    pub fn set_legacy_directory(&self, directory: Option<PathBuf>) -> BackupResult<()> {
        self.update_settings(|s| s.legacy_directory = directory)
    }

    pub fn set_max_versions(&self, max_versions: u32) -> BackupResult<()> {
        self.update_settings(|s| s.set_max_versions(max_versions))
    }

    pub fn set_selected_databases(&self, databases: Vec<String>) -> BackupResult<()> {
        self.update_settings(|s| s.set_selected_databases(databases))
    }

    fn update_settings(&self, change: impl FnOnce(&mut GlobalSettings)) -> BackupResult<()> {
        let mut state = self.inner.state.lock();
        change(&mut state.settings);
        state.flush()
    }

    /// Tell the orchestrator which database the host has open
    pub fn set_current_database(&self, database_id: Option<String>) {
        self.inner.state.lock().current_database = database_id.filter(|id| !id.trim().is_empty());
    }

    pub fn current_database(&self) -> Option<String> {
        self.inner.state.lock().current_database.clone()
    }

    /// When the last backup succeeded
    pub fn last_backup_time(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().settings.last_backup_time()
    }

    /// The current resting status
    pub fn status(&self) -> BackupStatus {
        self.inner.resting_status()
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// (Re)start the automatic backup schedule
    ///
    /// Any running schedule is cancelled first. A new one starts only if
    /// backups and automatic backups are enabled and a current database is
    /// set. Returns whether a schedule is now running.
    pub fn start_auto_backup(&self) -> bool {
        let (ready, minutes) = {
            let state = self.inner.state.lock();
            let ready = state.settings.enabled
                && state.settings.auto_backup_enabled
                && state.current_database.is_some();
            (ready, state.settings.auto_interval_minutes)
        };

        if !ready {
            self.stop_auto_backup();
            tracing::debug!("automatic backups not started: disabled or no current database");
            return false;
        }

        self.start_with_interval(Duration::from_secs(u64::from(minutes) * 60))
    }

    pub(crate) fn start_with_interval(&self, interval: Duration) -> bool {
        let mut schedule = self.schedule.lock();
        if let Some(running) = schedule.take() {
            running.stop();
        }

        match AutoBackupSchedule::spawn(Arc::clone(&self.inner), interval) {
            Ok(started) => {
                *schedule = Some(started);
                self.inner.auto_running.store(true, Ordering::SeqCst);
                tracing::info!(interval_secs = interval.as_secs(), "automatic backups started");
                drop(schedule);
                self.inner.emit_resting();
                true
            }
            Err(e) => {
                self.inner.auto_running.store(false, Ordering::SeqCst);
                tracing::error!(error = %e, "could not start automatic backups");
                false
            }
        }
    }

    /// Cancel the automatic backup schedule
    ///
    /// A tick already in progress finishes first.
    pub fn stop_auto_backup(&self) {
        let running = self.schedule.lock().take();
        if let Some(running) = running {
            running.stop();
            self.inner.auto_running.store(false, Ordering::SeqCst);
            tracing::info!("automatic backups stopped");
            self.inner.emit_resting();
        }
    }

    pub fn is_auto_backup_running(&self) -> bool {
        self.inner.auto_running.load(Ordering::SeqCst)
    }
}

impl Drop for BackupOrchestrator {
    fn drop(&mut self) {
        if let Some(running) = self.schedule.get_mut().take() {
            running.stop();
        }
    }
}

fn policy_key(database_id: &str) -> String {
    format!("{}{}", POLICY_KEY_PREFIX, database_id)
}

impl Inner {
    fn emit(&self, status: BackupStatus) {
        self.sink.status_changed(status);
    }

    fn resting_status(&self) -> BackupStatus {
        let enabled = self.state.lock().settings.enabled;
        if !enabled {
            BackupStatus::Disabled
        } else if self.auto_running.load(Ordering::SeqCst) {
            BackupStatus::AutoEnabled
        } else {
            BackupStatus::Enabled
        }
    }

    fn emit_resting(&self) {
        let status = self.resting_status();
        self.emit(status);
    }

    fn source_path(&self, database_id: &str) -> PathBuf {
        self.sources
            .source_path(database_id)
            .unwrap_or_else(|| PathBuf::from(database_id))
    }

    /// Next backup timestamp, never earlier than the previous one
    fn next_timestamp(&self) -> NaiveDateTime {
        let now = self.clock.now().naive_local();
        let mut last = self.last_stamp.lock();
        let stamp = match *last {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    /// Directories searched when listing a database's backups
    fn listing_destinations(&self, database_id: &str) -> Vec<BackupDestination> {
        let state = self.state.lock();
        match state.policies.get(database_id) {
            Some(policy) if policy.has_destinations() => policy.destinations().to_vec(),
            _ => state
                .settings
                .legacy_directory
                .iter()
                .map(BackupDestination::local)
                .collect(),
        }
    }

    /// Copy, trim and record one backup; caller holds the run lock
    fn backup_to_destination(
        &self,
        db_path: &Path,
        destination: &BackupDestination,
        max_versions: u32,
    ) -> BackupResult<PathBuf> {
        self.emit(BackupStatus::BackingUp);

        match self.try_backup_to_destination(db_path, destination, max_versions) {
            Ok(written) => {
                self.emit(BackupStatus::Success);
                Ok(written)
            }
            Err(e) => {
                tracing::warn!(
                    database = %db_path.display(),
                    destination = %destination.display_name(),
                    error = %e,
                    "backup to destination failed"
                );
                self.emit(BackupStatus::Error);
                Err(e)
            }
        }
    }

    fn try_backup_to_destination(
        &self,
        db_path: &Path,
        destination: &BackupDestination,
        max_versions: u32,
    ) -> BackupResult<PathBuf> {
        if !db_path.is_file() {
            return Err(BackupError::SourceMissing(db_path.to_path_buf()));
        }
        if !destination.is_available() {
            return Err(BackupError::DestinationUnavailable(destination.path.clone()));
        }

        let name = DatabaseName::from_path(db_path)
            .ok_or_else(|| BackupError::SourceMissing(db_path.to_path_buf()))?;
        let fingerprint = naming::fingerprint(db_path);
        let file_name = name.backup_file_name(&fingerprint, self.next_timestamp());
        let target = destination.path.join(&file_name);

        restore::copy_atomically(db_path, &target, false)?;

        if destination.is_cloud() {
            self.emit(BackupStatus::Syncing);
        }

        let removed =
            catalog::enforce_retention(destination, &name, &fingerprint, max_versions, &target);

        {
            let mut state = self.state.lock();
            state.settings.last_backup_timestamp = Some(self.clock.now().timestamp_millis());
            if let Err(e) = state.flush() {
                tracing::warn!(error = %e, "could not persist last backup time");
            }
        }

        tracing::info!(
            database = %db_path.display(),
            destination = %destination.display_name(),
            file = %file_name,
            removed = removed.len(),
            "backup written"
        );
        Ok(target)
    }

    /// Back up one database to all eligible destinations; caller holds the run lock
    fn fan_out(&self, database_id: &str, force: bool) -> FanOutReport {
        let source = self.sources.source_path(database_id);
        let (settings, policy) = {
            let mut state = self.state.lock();
            let policy = state
                .policies
                .entry(database_id.to_string())
                .or_default()
                .clone();
            (state.settings.clone(), policy)
        };

        if !force && !(settings.enabled && policy.enabled) {
            tracing::debug!(database = database_id, "scheduled backup skipped: disabled");
            return FanOutReport::new(database_id, FanOutMode::Skipped);
        }

        let source = match source {
            Some(path) if path.is_file() => path,
            other => {
                let missing = other.unwrap_or_else(|| PathBuf::from(database_id));
                tracing::warn!(
                    error = %BackupError::SourceMissing(missing),
                    "backup skipped"
                );
                self.emit(BackupStatus::Error);
                return FanOutReport::new(database_id, FanOutMode::SourceMissing);
            }
        };

        if !policy.has_destinations() {
            return self.fan_out_legacy(database_id, &source, &settings);
        }

        let selected = if force {
            policy.available_destinations()
        } else {
            policy.auto_backup_destinations()
        };

        let mut report = FanOutReport::new(database_id, FanOutMode::Destinations);
        for destination in policy.destinations() {
            if !force && !destination.auto_backup {
                continue;
            }
            if !selected.contains(destination) {
                tracing::warn!(
                    destination = %destination.display_name(),
                    "destination unavailable, skipping"
                );
                report.outcomes.push(DestinationOutcome {
                    destination: destination.clone(),
                    result: DestinationResult::Unavailable,
                });
                continue;
            }

            let (result, stop) = match self.backup_to_destination(
                &source,
                destination,
                policy.max_versions_per_destination,
            ) {
                Ok(written) => (DestinationResult::Written(written), false),
                // The source itself went away: every remaining destination would fail too
                Err(e) => (DestinationResult::Failed(e.to_string()), !e.is_destination_scoped()),
            };
            report.outcomes.push(DestinationOutcome {
                destination: destination.clone(),
                result,
            });
            if stop {
                break;
            }
        }

        tracing::info!(
            database = database_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "backup run finished"
        );
        report
    }

    fn fan_out_legacy(
        &self,
        database_id: &str,
        source: &Path,
        settings: &GlobalSettings,
    ) -> FanOutReport {
        let Some(directory) = &settings.legacy_directory else {
            tracing::warn!(database = database_id, "no backup destinations configured");
            return FanOutReport::new(database_id, FanOutMode::NoDestinations);
        };

        let destination = BackupDestination::local(directory);
        let result = match self.backup_to_destination(source, &destination, settings.max_versions) {
            Ok(written) => DestinationResult::Written(written),
            Err(e) => DestinationResult::Failed(e.to_string()),
        };

        let mut report = FanOutReport::new(database_id, FanOutMode::Legacy);
        report.outcomes.push(DestinationOutcome { destination, result });
        report
    }

    /// One scheduled pass: every selected database, or the current one
    pub(crate) fn perform_auto_backup(&self) -> usize {
        let _run = self.run_lock.lock();

        let targets: Vec<String> = {
            let state = self.state.lock();
            if state.settings.selected_databases.is_empty() {
                state.current_database.iter().cloned().collect()
            } else {
                state.settings.selected_databases.clone()
            }
        };

        let mut total = 0;
        for database_id in &targets {
            let readable = self
                .sources
                .source_path(database_id)
                .is_some_and(|path| File::open(path).is_ok());
            if !readable {
                tracing::info!(database = %database_id, "scheduled backup skipped: source unreadable");
                continue;
            }
            total += self.fan_out(database_id, false).succeeded();
        }

        self.emit_resting();
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::hooks::{ChannelStatusSink, ManualClock};
    use crate::config::store::{JsonSettingsStore, MemorySettingsStore};
    use crate::models::DestinationKind;
    use chrono::{Local, TimeZone};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let start = Local.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
            Self {
                temp: TempDir::new().unwrap(),
                clock: Arc::new(ManualClock::new(start)),
            }
        }

        fn orchestrator(&self) -> BackupOrchestrator {
            BackupOrchestrator::builder(MemorySettingsStore::new())
                .clock(self.clock.clone())
                .build()
        }

        fn database(&self, dir: &str, contents: &[u8]) -> PathBuf {
            let dir = self.temp.path().join(dir);
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join("accounts.db");
            fs::write(&path, contents).unwrap();
            path
        }

        fn dir(&self, name: &str) -> PathBuf {
            self.temp.path().join(name)
        }

        fn tick(&self) {
            self.clock.advance(chrono::Duration::seconds(1));
        }
    }

    fn id(path: &Path) -> String {
        path.display().to_string()
    }

    fn backup_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_backup_to_destination_creates_named_copy() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"ledger v1");
        let dest = BackupDestination::local(fx.dir("backups"));

        assert!(orch.perform_backup_to_destination(&db, &dest, 5));

        let files = backup_files(&dest.path);
        assert_eq!(files.len(), 1);
        let expected = format!(
            "accounts_{}_2024-01-15_10-00-00.db",
            naming::fingerprint(&db)
        );
        assert_eq!(files[0], expected);
        assert_eq!(fs::read(dest.path.join(&files[0])).unwrap(), b"ledger v1");
        assert!(orch.last_backup_time().is_some());
    }

    #[test]
    fn test_backup_count_increases_by_one() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"data");

        let mut policy = DatabasePolicy::with_max_versions(10);
        policy.add_destination(BackupDestination::local(fx.dir("backups")));
        orch.set_database_policy(&id(&db), policy).unwrap();

        assert_eq!(orch.get_backup_count(&id(&db)), 0);
        for expected in 1..=3 {
            assert_eq!(orch.perform_backup_to_all_destinations(&id(&db), true), 1);
            assert_eq!(orch.get_backup_count(&id(&db)), expected);
            fx.tick();
        }
    }

    #[test]
    fn test_missing_source_fails() {
        let fx = Fixture::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let orch = BackupOrchestrator::builder(MemorySettingsStore::new())
            .status_sink(ChannelStatusSink(tx))
            .build();
        let dest = BackupDestination::local(fx.dir("backups"));

        assert!(!orch.perform_backup_to_destination(&fx.dir("missing.db"), &dest, 5));

        let statuses: Vec<BackupStatus> = rx.try_iter().collect();
        assert_eq!(
            statuses,
            vec![BackupStatus::BackingUp, BackupStatus::Error, BackupStatus::Disabled]
        );
    }

    #[test]
    fn test_unavailable_destination_fails() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"data");
        let blocker = fx.dir("blocker");
        fs::write(&blocker, b"file").unwrap();

        let dest = BackupDestination::local(blocker.join("sub"));
        assert!(!orch.perform_backup_to_destination(&db, &dest, 5));
    }

    #[test]
    fn test_cloud_destination_reports_syncing() {
        let fx = Fixture::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let orch = BackupOrchestrator::builder(MemorySettingsStore::new())
            .status_sink(ChannelStatusSink(tx))
            .clock(fx.clock.clone())
            .build();
        orch.set_enabled(true).unwrap();
        let _ = rx.try_iter().count();

        let db = fx.database("books", b"data");
        let dest = BackupDestination::cloud(fx.dir("Dropbox"), "Dropbox");
        assert!(orch.perform_backup_to_destination(&db, &dest, 5));

        let statuses: Vec<BackupStatus> = rx.try_iter().collect();
        assert_eq!(
            statuses,
            vec![
                BackupStatus::BackingUp,
                BackupStatus::Syncing,
                BackupStatus::Success,
                BackupStatus::Enabled,
            ]
        );
    }

    #[test]
    fn test_retention_scenario() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"t1");
        let backups = fx.dir("backups");

        let mut policy = DatabasePolicy::with_max_versions(2);
        policy.add_destination(BackupDestination::local(&backups));
        orch.set_database_policy(&id(&db), policy).unwrap();

        assert_eq!(orch.perform_backup_to_all_destinations(&id(&db), true), 1);
        assert_eq!(backup_files(&backups).len(), 1);
        let first = backup_files(&backups)[0].clone();

        fx.tick();
        fs::write(&db, b"t2").unwrap();
        assert_eq!(orch.perform_backup_to_all_destinations(&id(&db), true), 1);
        assert_eq!(backup_files(&backups).len(), 2);

        fx.tick();
        fs::write(&db, b"t3").unwrap();
        assert_eq!(orch.perform_backup_to_all_destinations(&id(&db), true), 1);
        let files = backup_files(&backups);
        assert_eq!(files.len(), 2);
        assert!(!files.contains(&first));

        let listed = orch.list_backups(&id(&db));
        assert_eq!(listed.len(), 2);
        assert!(listed[0].filename.ends_with("10-00-02.db"));
        assert!(listed[1].filename.ends_with("10-00-01.db"));
        assert_eq!(fs::read(&listed[0].path).unwrap(), b"t3");
        assert_eq!(fs::read(&listed[1].path).unwrap(), b"t2");
    }

    #[test]
    fn test_retention_keeps_most_recent_over_many_runs() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"data");
        let dest = BackupDestination::local(fx.dir("backups"));

        for _ in 0..7 {
            assert!(orch.perform_backup_to_destination(&db, &dest, 3));
            fx.tick();
        }

        let files = backup_files(&dest.path);
        assert_eq!(files.len(), 3);
        assert!(files[0].ends_with("10-00-04.db"));
        assert!(files[2].ends_with("10-00-06.db"));
    }

    #[test]
    fn test_same_name_databases_do_not_collide() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let first = fx.database("company-a", b"a");
        let second = fx.database("company-b", b"b");
        let shared = BackupDestination::local(fx.dir("shared"));

        assert_ne!(naming::fingerprint(&first), naming::fingerprint(&second));

        for _ in 0..3 {
            assert!(orch.perform_backup_to_destination(&first, &shared, 1));
            fx.tick();
        }
        assert!(orch.perform_backup_to_destination(&second, &shared, 1));
        fx.tick();
        assert!(orch.perform_backup_to_destination(&first, &shared, 1));

        let files = backup_files(&shared.path);
        assert_eq!(files.len(), 2);
        let prefix_a = format!("accounts_{}_", naming::fingerprint(&first));
        let prefix_b = format!("accounts_{}_", naming::fingerprint(&second));
        assert_eq!(files.iter().filter(|f| f.starts_with(&prefix_a)).count(), 1);
        assert_eq!(files.iter().filter(|f| f.starts_with(&prefix_b)).count(), 1);
    }

    #[test]
    fn test_failure_isolation() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"data");
        let blocker = fx.dir("blocker");
        fs::write(&blocker, b"file").unwrap();

        let mut policy = DatabasePolicy::new();
        policy.add_destination(BackupDestination::usb(blocker.join("drive"), Some("A".into())));
        policy.add_destination(BackupDestination::local(fx.dir("b")));
        orch.set_database_policy(&id(&db), policy).unwrap();

        let report = orch.backup_database(&id(&db), true);
        assert_eq!(report.mode, FanOutMode::Destinations);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.outcomes[0].result, DestinationResult::Unavailable);
        assert!(report.outcomes[1].succeeded());

        fx.tick();
        assert_eq!(orch.perform_backup_to_all_destinations(&id(&db), true), 1);
    }

    #[test]
    fn test_scheduled_run_respects_flags() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"data");

        let mut policy = DatabasePolicy::new();
        policy.add_destination(BackupDestination::local(fx.dir("auto")));
        policy.add_destination(BackupDestination::local(fx.dir("manual")).with_auto_backup(false));
        orch.set_database_policy(&id(&db), policy.clone()).unwrap();

        // Globally disabled: scheduled runs do nothing, manual runs still go
        assert_eq!(
            orch.backup_database(&id(&db), false).mode,
            FanOutMode::Skipped
        );
        assert_eq!(orch.perform_backup_to_all_destinations(&id(&db), true), 2);
        fx.tick();

        orch.set_enabled(true).unwrap();
        let report = orch.backup_database(&id(&db), false);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].destination.path, fx.dir("auto"));
        fx.tick();

        policy.enabled = false;
        orch.set_database_policy(&id(&db), policy).unwrap();
        assert_eq!(orch.perform_backup_to_all_destinations(&id(&db), false), 0);
    }

    #[test]
    fn test_legacy_fallback() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"data");

        let report = orch.backup_database(&id(&db), true);
        assert!(report.needs_configuration());
        assert_eq!(report.succeeded(), 0);

        orch.set_legacy_directory(Some(fx.dir("legacy"))).unwrap();
        orch.set_max_versions(2).unwrap();
        for _ in 0..3 {
            let report = orch.backup_database(&id(&db), true);
            assert_eq!(report.mode, FanOutMode::Legacy);
            assert_eq!(report.succeeded(), 1);
            fx.tick();
        }

        assert_eq!(backup_files(&fx.dir("legacy")).len(), 2);
        assert_eq!(orch.get_backup_count(&id(&db)), 2);
    }

    #[test]
    fn test_missing_source_reported_once() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.dir("gone.db");

        let mut policy = DatabasePolicy::new();
        policy.add_destination(BackupDestination::local(fx.dir("backups")));
        orch.set_database_policy(&id(&db), policy).unwrap();

        let report = orch.backup_database(&id(&db), true);
        assert_eq!(report.mode, FanOutMode::SourceMissing);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn test_restore_round_trip() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"precious ledger");
        let dest = BackupDestination::local(fx.dir("backups"));
        assert!(orch.perform_backup_to_destination(&db, &dest, 5));

        let backup = orch.list_backups(&id(&db)).pop();
        // No policy: listing falls back to the (unset) legacy directory
        assert!(backup.is_none());

        let name = backup_files(&dest.path).pop().unwrap();
        let backup = dest.path.join(name);
        let target = fx.dir("restore");

        let restored = orch.restore_backup(&backup, &target).unwrap();
        assert_eq!(restored, target.join("accounts.db"));
        assert_eq!(fs::read(&restored).unwrap(), b"precious ledger");

        fx.tick();
        let again = orch.restore_backup(&backup, &target).unwrap();
        assert_eq!(again, target.join("accounts_restored_2024-01-15_10-00-01.db"));
        assert_eq!(fs::read(&again).unwrap(), b"precious ledger");

        assert!(orch.restore_backup(&fx.dir("nothing.db"), &target).is_none());
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"data");
        let dest = BackupDestination::local(fx.dir("backups"));

        assert!(orch.perform_backup_to_destination(&db, &dest, 5));
        fx.clock.advance(chrono::Duration::hours(-1));
        assert!(orch.perform_backup_to_destination(&db, &dest, 5));

        let files = backup_files(&dest.path);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("2024-01-15_10-00-00.db"));
    }

    #[test]
    fn test_new_backup_survives_future_dated_older_backups() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"fresh");
        let dest = BackupDestination::local(fx.dir("backups"));
        fs::create_dir_all(&dest.path).unwrap();

        // Copies carried over by a sync client keep a modification time later than now
        let prefix = format!("accounts_{}_", naming::fingerprint(&db));
        let future = std::time::SystemTime::now() + std::time::Duration::from_secs(3600);
        for stamp in ["2024-01-13_09-00-00", "2024-01-14_09-00-00"] {
            let old = dest.path.join(format!("{}{}.db", prefix, stamp));
            fs::write(&old, b"stale").unwrap();
            fs::File::options()
                .write(true)
                .open(&old)
                .unwrap()
                .set_modified(future)
                .unwrap();
        }

        assert!(orch.perform_backup_to_destination(&db, &dest, 2));

        let files = backup_files(&dest.path);
        let newest = format!("{}2024-01-15_10-00-00.db", prefix);
        assert_eq!(files, vec![format!("{}2024-01-14_09-00-00.db", prefix), newest.clone()]);
        assert_eq!(fs::read(dest.path.join(newest)).unwrap(), b"fresh");
    }

    #[test]
    fn test_restores_within_one_second_keep_both_copies() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        let db = fx.database("books", b"monday");
        let dest = BackupDestination::local(fx.dir("backups"));
        assert!(orch.perform_backup_to_destination(&db, &dest, 5));
        fx.tick();
        fs::write(&db, b"tuesday").unwrap();
        assert!(orch.perform_backup_to_destination(&db, &dest, 5));

        let files = backup_files(&dest.path);
        let target = fx.dir("restore");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("accounts.db"), b"live").unwrap();

        let first = orch.restore_backup(&dest.path.join(&files[0]), &target).unwrap();
        let second = orch.restore_backup(&dest.path.join(&files[1]), &target).unwrap();

        assert_eq!(first, target.join("accounts_restored_2024-01-15_10-00-01.db"));
        assert_eq!(second, target.join("accounts_restored_2024-01-15_10-00-01_2.db"));
        assert_eq!(fs::read(&first).unwrap(), b"monday");
        assert_eq!(fs::read(&second).unwrap(), b"tuesday");
        assert_eq!(fs::read(target.join("accounts.db")).unwrap(), b"live");
    }

    #[test]
    fn test_policy_is_created_lazily_and_persisted_on_set() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();

        let policy = orch.get_database_policy("/data/a.db");
        assert_eq!(policy, DatabasePolicy::default());
        assert_eq!(orch.database_ids(), vec!["/data/a.db"]);

        let mut policy = policy;
        policy.add_destination(BackupDestination::cloud(fx.dir("OneDrive"), "OneDrive"));
        orch.set_database_policy("/data/a.db", policy.clone()).unwrap();
        assert_eq!(orch.get_database_policy("/data/a.db"), policy);

        assert!(orch.remove_database_policy("/data/a.db").unwrap());
        assert!(!orch.get_database_policy("/data/a.db").has_destinations());
    }

    #[test]
    fn test_settings_survive_new_instance() {
        let fx = Fixture::new();
        let settings_file = fx.dir("settings.json");
        {
            let orch = BackupOrchestrator::new(JsonSettingsStore::open(&settings_file).unwrap());
            orch.set_enabled(true).unwrap();
            orch.set_auto_interval_minutes(90).unwrap();
            let mut policy = DatabasePolicy::with_max_versions(3);
            policy.add_destination(BackupDestination::usb("/media/u/STICK", Some("STICK".into())));
            orch.set_database_policy("/data/a.db", policy).unwrap();
        }

        let orch = BackupOrchestrator::new(JsonSettingsStore::open(&settings_file).unwrap());
        let settings = orch.global_settings();
        assert!(settings.enabled);
        assert_eq!(settings.auto_interval_minutes, 60);

        let policy = orch.get_database_policy("/data/a.db");
        assert_eq!(policy.max_versions_per_destination, 3);
        assert_eq!(policy.destinations()[0].kind, DestinationKind::Usb);
    }

    #[test]
    fn test_unreadable_policy_is_ignored() {
        let mut store = MemorySettingsStore::new();
        store.set("policy:/data/a.db", "not a policy");
        store.set("policy:/data/b.db", &DatabasePolicy::with_max_versions(4).serialize());

        let orch = BackupOrchestrator::new(store);
        assert_eq!(orch.database_ids(), vec!["/data/b.db"]);
        assert_eq!(orch.get_database_policy("/data/b.db").max_versions_per_destination, 4);
    }

    #[test]
    fn test_auto_backup_uses_selected_or_current() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();
        orch.set_enabled(true).unwrap();
        let a = fx.database("a", b"a");
        let b = fx.database("b", b"b");
        let backups = fx.dir("backups");
        orch.set_legacy_directory(Some(backups.clone())).unwrap();

        // Nothing selected, nothing current
        assert_eq!(orch.perform_auto_backup(), 0);

        orch.set_current_database(Some(id(&a)));
        assert_eq!(orch.perform_auto_backup(), 1);
        fx.tick();

        orch.set_selected_databases(vec![id(&a), id(&b), id(&fx.dir("gone.db"))])
            .unwrap();
        assert_eq!(orch.perform_auto_backup(), 2);
        assert_eq!(backup_files(&backups).len(), 3);
    }

    #[test]
    fn test_start_auto_backup_requires_flags() {
        let fx = Fixture::new();
        let orch = fx.orchestrator();

        assert!(!orch.start_auto_backup());
        orch.set_enabled(true).unwrap();
        orch.set_auto_backup_enabled(true).unwrap();
        assert!(!orch.start_auto_backup());

        orch.set_current_database(Some(id(&fx.database("books", b"x"))));
        assert!(orch.start_auto_backup());
        assert!(orch.is_auto_backup_running());
        assert_eq!(orch.status(), BackupStatus::AutoEnabled);

        orch.stop_auto_backup();
        assert!(!orch.is_auto_backup_running());
        assert_eq!(orch.status(), BackupStatus::Enabled);
    }
}
