use solartrack_model::{TableKind, TableSnapshot};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Latest observed snapshot of each tracked table.
///
/// Snapshots are replaced wholesale, never edited. Holders of a previous
/// generation keep a stable `Arc` to it regardless of later swaps.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    tables: BTreeMap<TableKind, Arc<TableSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `snapshot` as the latest for its table and return the generation it replaces.
    ///
    /// Returns `None` on the first observation of a table.
    pub fn swap(&mut self, snapshot: impl Into<Arc<TableSnapshot>>) -> Option<Arc<TableSnapshot>> {
        let snapshot = snapshot.into();
        self.tables.insert(snapshot.table(), snapshot)
    }

    pub fn latest(&self, table: TableKind) -> Option<Arc<TableSnapshot>> {
        self.tables.get(&table).cloned()
    }

    pub fn row_count(&self, table: TableKind) -> Option<usize> {
        self.tables.get(&table).map(|s| s.len())
    }

    /// Forget every table, so the next poll is treated as a first observation.
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
