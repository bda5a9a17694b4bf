//! Cell-level diffing of consecutive table snapshots.
//!
//! Output order is fully determined by the inputs:
//! - current rows in order, each contributing an `Added` change or its
//!   `Modified` fields in comparison order (key field first, then declared order)
//! - then `Removed` rows in previous order, when removal detection is enabled

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solartrack_model::{
    CellChange, ChangeKind, CoordinateResolver, Field, IdGenerator, ResolveError, RowIdentity,
    ScalarValue, TableKind, TableSnapshot, TrackedRow,
};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Emit `Removed` changes for rows that disappeared since the previous poll.
    pub detect_removed_rows: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            detect_removed_rows: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DiffError {
    #[error("cannot diff a {previous} snapshot against a {current} snapshot")]
    TableMismatch {
        previous: TableKind,
        current: TableKind,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Compares two snapshots of the same table.
#[derive(Debug, Clone, Copy)]
pub struct Differ<'a> {
    resolver: &'a CoordinateResolver,
    options: DiffOptions,
}

struct Emit<'g> {
    observed_at: DateTime<Utc>,
    ids: &'g mut IdGenerator,
    out: Vec<CellChange>,
}

impl<'a> Differ<'a> {
    pub fn new(resolver: &'a CoordinateResolver, options: DiffOptions) -> Self {
        Self { resolver, options }
    }

    /// Diff `current` against `previous`.
    ///
    /// A missing `previous` (first observation) yields no changes rather than
    /// reporting every row as new.
    pub fn diff(
        &self,
        previous: Option<&TableSnapshot>,
        current: &TableSnapshot,
        ids: &mut IdGenerator,
    ) -> Result<Vec<CellChange>, DiffError> {
        let Some(previous) = previous else {
            return Ok(Vec::new());
        };
        let mut emit = Emit {
            observed_at: current.observed_at(),
            ids,
            out: Vec::new(),
        };
        match (previous, current) {
            (TableSnapshot::Inventory(prev), TableSnapshot::Inventory(cur)) => {
                self.diff_rows(&prev.rows, &cur.rows, &mut emit)?
            }
            (TableSnapshot::InstallHistory(prev), TableSnapshot::InstallHistory(cur)) => {
                self.diff_rows(&prev.rows, &cur.rows, &mut emit)?
            }
            (prev, cur) => {
                return Err(DiffError::TableMismatch {
                    previous: prev.table(),
                    current: cur.table(),
                })
            }
        }
        Ok(emit.out)
    }

    fn diff_rows<R: TrackedRow>(
        &self,
        previous: &[R],
        current: &[R],
        emit: &mut Emit<'_>,
    ) -> Result<(), DiffError> {
        match R::TABLE.row_identity() {
            RowIdentity::NaturalKey => self.diff_keyed(previous, current, emit),
            RowIdentity::Appended => self.diff_appended(previous, current, emit),
        }
    }

    fn diff_keyed<R: TrackedRow>(
        &self,
        previous: &[R],
        current: &[R],
        emit: &mut Emit<'_>,
    ) -> Result<(), DiffError> {
        let table = R::TABLE;
        let key_field = table.key_field();

        // First occurrence wins for duplicate keys. Rows with a blank key
        // cannot be matched across polls and are left out entirely.
        let mut previous_by_key: HashMap<String, &R> = HashMap::with_capacity(previous.len());
        for row in previous.iter().filter(|r| has_key(*r)) {
            previous_by_key.entry(key_text(row)).or_insert(row);
        }

        for (index, row) in current.iter().enumerate() {
            if !has_key(row) {
                log::debug!("skipping {table} row {index} with a blank key");
                continue;
            }
            match previous_by_key.get(&key_text(row)) {
                None => {
                    self.push(table, ChangeKind::Added, index, key_field, None, present(row.key()), emit)?;
                }
                Some(old) => {
                    for field in table.comparison_order() {
                        let before = old.value(field).canonical(field.kind());
                        let after = row.value(field).canonical(field.kind());
                        if before != after {
                            self.push(
                                table,
                                ChangeKind::Modified,
                                index,
                                field,
                                present(before),
                                present(after),
                                emit,
                            )?;
                        }
                    }
                }
            }
        }

        if self.options.detect_removed_rows {
            let current_keys: HashSet<String> = current.iter().map(key_text).collect();
            for (index, row) in previous.iter().enumerate() {
                if has_key(row) && !current_keys.contains(&key_text(row)) {
                    self.push(table, ChangeKind::Removed, index, key_field, present(row.key()), None, emit)?;
                }
            }
        }
        Ok(())
    }

    fn diff_appended<R: TrackedRow>(
        &self,
        previous: &[R],
        current: &[R],
        emit: &mut Emit<'_>,
    ) -> Result<(), DiffError> {
        let table = R::TABLE;
        let key_field = table.key_field();

        for (index, row) in current.iter().enumerate().skip(previous.len()) {
            self.push(table, ChangeKind::Added, index, key_field, None, present(row.key()), emit)?;
        }

        if self.options.detect_removed_rows {
            for (index, row) in previous.iter().enumerate().skip(current.len()) {
                self.push(table, ChangeKind::Removed, index, key_field, present(row.key()), None, emit)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &self,
        table: TableKind,
        kind: ChangeKind,
        row_index: usize,
        field: Field,
        old_value: Option<ScalarValue>,
        new_value: Option<ScalarValue>,
        emit: &mut Emit<'_>,
    ) -> Result<(), DiffError> {
        let cell_ref = self.resolver.to_cell_ref(table, row_index, field)?;
        let prefix = match (kind, table.row_identity()) {
            (ChangeKind::Added, RowIdentity::NaturalKey) => "new",
            (ChangeKind::Added, RowIdentity::Appended) => "install",
            (ChangeKind::Removed, _) => "removed",
            (ChangeKind::Modified, _) => field.name(),
        };
        let change_id = emit.ids.change_id(prefix, emit.observed_at);
        emit.out.push(CellChange {
            table,
            kind,
            row_index,
            field,
            cell_ref,
            old_value,
            new_value,
            observed_at: emit.observed_at,
            change_id,
        });
        Ok(())
    }
}

fn key_text<R: TrackedRow>(row: &R) -> String {
    row.key().to_string()
}

fn has_key<R: TrackedRow>(row: &R) -> bool {
    !row.key().is_empty()
}

fn present(value: ScalarValue) -> Option<ScalarValue> {
    (!value.is_empty()).then_some(value)
}
