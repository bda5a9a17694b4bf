use solartrack_model::{
    CellChange, ChangeAction, ChangeLogEntry, CoordinateResolver, EntryId, IdGenerator,
    TableKind, TableSnapshot,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::change_log::{ChangeLog, ChangeLogConfig};
use crate::diff::{DiffError, DiffOptions, Differ};
use crate::error::PersistenceError;
use crate::events::EventHub;
use crate::persist::{load_change_log, save_change_log, KeyValueStore};
use crate::snapshot::SnapshotStore;
use crate::sync_client::SyncResult;

pub const SAVED_SUMMARY: &str = "Change logs saved to local storage";

/// Engine state shared between the scheduler task and readers.
///
/// The lock is never held across an `.await`.
pub type SharedEngine = Arc<Mutex<SyncEngine>>;

pub fn lock_engine(engine: &SharedEngine) -> MutexGuard<'_, SyncEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the snapshot store and the change log.
///
/// Every log mutation is published to the [`EventHub`] and written through
/// to the key-value store on a best-effort basis.
pub struct SyncEngine {
    resolver: CoordinateResolver,
    diff_options: DiffOptions,
    snapshots: SnapshotStore,
    log: ChangeLog,
    ids: IdGenerator,
    store: Option<Arc<dyn KeyValueStore>>,
    events: Arc<EventHub>,
}

impl SyncEngine {
    pub fn new(
        resolver: CoordinateResolver,
        diff_options: DiffOptions,
        log_config: ChangeLogConfig,
    ) -> Self {
        Self {
            resolver,
            diff_options,
            snapshots: SnapshotStore::new(),
            log: ChangeLog::new(log_config),
            ids: IdGenerator::new(),
            store: None,
            events: Arc::new(EventHub::default()),
        }
    }

    /// Attach persistent storage and restore the log saved there.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        let entries = load_change_log(store.as_ref());
        if !entries.is_empty() {
            log::info!("restored {} change log entries", entries.len());
        }
        self.log = ChangeLog::restore(self.log.config(), entries);
        self.store = Some(store);
        self.publish();
        self
    }

    pub fn with_events(mut self, events: Arc<EventHub>) -> Self {
        self.events = events;
        self.publish();
        self
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    pub fn resolver(&self) -> &CoordinateResolver {
        &self.resolver
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Diff a new snapshot against the stored one, then swap it in and log the result.
    ///
    /// On error the stored snapshot is left in place, so the next poll diffs
    /// against it again.
    pub fn ingest(&mut self, snapshot: TableSnapshot) -> Result<Vec<CellChange>, DiffError> {
        self.ingest_all([snapshot])
    }

    /// Ingest one snapshot per table as a unit: nothing is swapped or logged
    /// unless every diff succeeds.
    pub fn ingest_all(
        &mut self,
        snapshots: impl IntoIterator<Item = TableSnapshot>,
    ) -> Result<Vec<CellChange>, DiffError> {
        let differ = Differ::new(&self.resolver, self.diff_options);
        let mut staged = Vec::new();
        for snapshot in snapshots {
            let previous = self.snapshots.latest(snapshot.table());
            let changes = differ.diff(previous.as_deref(), &snapshot, &mut self.ids)?;
            staged.push((snapshot, changes));
        }

        let mut all = Vec::new();
        for (snapshot, changes) in staged {
            let table = snapshot.table();
            self.snapshots.swap(snapshot);
            if !changes.is_empty() {
                log::info!("{} cell changes detected in {table}", changes.len());
                all.extend(changes.iter().cloned());
                self.record(table, changes);
            }
        }
        Ok(all)
    }

    pub fn record(&mut self, table: TableKind, changes: Vec<CellChange>) -> Option<ChangeLogEntry> {
        let entry = self.log.record(table, changes);
        if entry.is_some() {
            self.changed();
        }
        entry
    }

    pub fn record_lifecycle(
        &mut self,
        action: ChangeAction,
        summary: impl Into<String>,
    ) -> Option<ChangeLogEntry> {
        let entry = self.log.record_lifecycle(action, summary);
        if entry.is_some() {
            self.changed();
        }
        entry
    }

    /// Log the outcome of a highlight push.
    pub fn record_sync(&mut self, result: &SyncResult) {
        if result.groups.is_empty() {
            return;
        }
        if result.is_success() {
            self.record_lifecycle(
                ChangeAction::Sync,
                format!(
                    "Highlighted {} changed cells in Google Sheets",
                    result.changes_synced()
                ),
            );
            return;
        }
        for group in result.failed_groups() {
            self.record_lifecycle(
                ChangeAction::SyncError,
                format!(
                    "Failed to highlight {} changes in {}: {}",
                    group.changes.len(),
                    group.table.sheet_name(),
                    group.error.as_deref().unwrap_or("unknown error")
                ),
            );
        }
    }

    pub fn mark_read(&mut self, id: &EntryId) -> bool {
        let found = self.log.mark_read(id);
        if found {
            self.changed();
        }
        found
    }

    pub fn mark_all_read(&mut self) {
        self.log.mark_all_read();
        self.changed();
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.changed();
    }

    pub fn log(&self) -> &ChangeLog {
        &self.log
    }

    pub fn entries(&self) -> Vec<ChangeLogEntry> {
        self.log.to_vec()
    }

    pub fn unread_count(&self) -> usize {
        self.log.unread_count()
    }

    /// Explicitly save the log, recording an `Export` entry on success.
    pub fn save_log(&mut self) -> Result<(), PersistenceError> {
        let Some(store) = self.store.clone() else {
            return Err(PersistenceError::Unavailable(
                "no key-value store attached".to_string(),
            ));
        };
        save_change_log(store.as_ref(), &self.log.to_vec())?;
        self.record_lifecycle(ChangeAction::Export, SAVED_SUMMARY);
        Ok(())
    }

    fn changed(&mut self) {
        self.publish();
        if let Some(store) = &self.store {
            if let Err(err) = save_change_log(store.as_ref(), &self.log.to_vec()) {
                log::warn!("failed to persist change log: {err}");
            }
        }
    }

    fn publish(&self) {
        self.events.publish_log(self.log.to_vec());
    }
}
