//! Bounded, most-recent-first change log.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use solartrack_model::{
    CellChange, ChangeAction, ChangeLogEntry, EntryId, IdGenerator, TableKind,
};
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 50;
pub const DEFAULT_COALESCE_WINDOW_MS: u64 = 1_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeLogConfig {
    /// Maximum number of retained entries; the oldest are dropped first.
    pub capacity: usize,
    /// Entries with identical `(action, summary, table)` created within this
    /// many milliseconds of each other are coalesced into the first one.
    pub coalesce_window_ms: u64,
}

impl Default for ChangeLogConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            coalesce_window_ms: DEFAULT_COALESCE_WINDOW_MS,
        }
    }
}

impl ChangeLogConfig {
    fn window(&self) -> Duration {
        Duration::milliseconds(self.coalesce_window_ms.min(u64::from(u32::MAX)) as i64)
    }
}

#[derive(Debug)]
pub struct ChangeLog {
    config: ChangeLogConfig,
    entries: VecDeque<ChangeLogEntry>,
    ids: IdGenerator,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new(ChangeLogConfig::default())
    }
}

impl ChangeLog {
    pub fn new(config: ChangeLogConfig) -> Self {
        Self {
            config,
            entries: VecDeque::with_capacity(config.capacity),
            ids: IdGenerator::new(),
        }
    }

    /// Rebuild a log from previously persisted entries (newest first).
    pub fn restore(config: ChangeLogConfig, entries: Vec<ChangeLogEntry>) -> Self {
        let mut log = Self::new(config);
        log.entries.extend(entries);
        log.entries.truncate(config.capacity);
        log
    }

    pub fn config(&self) -> ChangeLogConfig {
        self.config
    }

    /// Record the cell changes of one diff as a `Data Change` entry.
    ///
    /// Returns `None` when `changes` is empty or the entry was coalesced into
    /// an identical recent one.
    pub fn record(&mut self, table: TableKind, changes: Vec<CellChange>) -> Option<ChangeLogEntry> {
        self.record_at(table, changes, Utc::now())
    }

    pub fn record_at(
        &mut self,
        table: TableKind,
        changes: Vec<CellChange>,
        now: DateTime<Utc>,
    ) -> Option<ChangeLogEntry> {
        if changes.is_empty() {
            return None;
        }
        let summary = changes
            .iter()
            .map(CellChange::describe)
            .collect::<Vec<_>>()
            .join(", ");
        let id = self.ids.entry_id(now);
        self.insert(ChangeLogEntry {
            id,
            created_at: now,
            action: ChangeAction::DataChange,
            summary,
            table: Some(table),
            cell_changes: changes,
            read: false,
        })
    }

    /// Record an entry without cell changes (poll started, poll failed, ...).
    pub fn record_lifecycle(
        &mut self,
        action: ChangeAction,
        summary: impl Into<String>,
    ) -> Option<ChangeLogEntry> {
        self.record_lifecycle_at(action, summary, Utc::now())
    }

    pub fn record_lifecycle_at(
        &mut self,
        action: ChangeAction,
        summary: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Option<ChangeLogEntry> {
        let id = self.ids.entry_id(now);
        self.insert(ChangeLogEntry {
            id,
            created_at: now,
            action,
            summary: summary.into(),
            table: None,
            cell_changes: Vec::new(),
            read: false,
        })
    }

    fn insert(&mut self, entry: ChangeLogEntry) -> Option<ChangeLogEntry> {
        let window = self.config.window();
        let duplicate = self.entries.iter().any(|existing| {
            let gap = entry.created_at - existing.created_at;
            existing.action == entry.action
                && existing.table == entry.table
                && existing.summary == entry.summary
                && gap < window
                && -gap < window
        });
        if duplicate {
            log::debug!("coalesced duplicate change log entry: {}", entry.summary);
            return None;
        }

        self.entries.push_front(entry.clone());
        self.entries.truncate(self.config.capacity);
        Some(entry)
    }

    /// Returns `false` if no entry has this id.
    pub fn mark_read(&mut self, id: &EntryId) -> bool {
        match self.entries.iter_mut().find(|e| &e.id == id) {
            Some(entry) => {
                entry.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        for entry in &mut self.entries {
            entry.read = true;
        }
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.read).count()
    }

    pub fn get(&self, id: &EntryId) -> Option<&ChangeLogEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = &ChangeLogEntry> + '_ {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<ChangeLogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
