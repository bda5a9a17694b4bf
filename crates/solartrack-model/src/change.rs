use chrono::{DateTime, Utc};
use core::fmt;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::address::CellRef;
use crate::table::{Field, TableKind};
use crate::value::ScalarValue;

const ID_SUFFIX_LEN: usize = 6;

/// Identifier of a single [`CellChange`].
///
/// Unique, never reused; the embedded timestamp is informational only and
/// must not be relied on for ordering.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(String);

/// Identifier of a [`ChangeLogEntry`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

macro_rules! id_accessors {
    ($ty:ident) => {
        impl $ty {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_accessors!(ChangeId);
id_accessors!(EntryId);

/// Mints identifiers of the form `<prefix>_<unix millis>_<sequence>_<random>`.
///
/// The sequence disambiguates ids minted within the same millisecond by one
/// generator; the random suffix disambiguates generators.
#[derive(Debug, Default)]
pub struct IdGenerator {
    seq: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn change_id(&mut self, prefix: &str, now: DateTime<Utc>) -> ChangeId {
        ChangeId(self.mint(prefix, now))
    }

    pub fn entry_id(&mut self, now: DateTime<Utc>) -> EntryId {
        EntryId(self.mint("log", now))
    }

    fn mint(&mut self, prefix: &str, now: DateTime<Utc>) -> String {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(ID_SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        format!("{prefix}_{}_{seq}_{suffix}", now.timestamp_millis())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A row appeared (keyed tables) or was appended (append-only tables).
    Added,
    /// A tracked field of a matched row changed value.
    Modified,
    /// A row present in the previous snapshot is gone.
    Removed,
}

/// One atomic cell-level difference between two snapshots.
///
/// Values are canonical; `None` means the cell was absent or blank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellChange {
    pub table: TableKind,
    pub kind: ChangeKind,
    pub row_index: usize,
    pub field: Field,
    pub cell_ref: CellRef,
    pub old_value: Option<ScalarValue>,
    pub new_value: Option<ScalarValue>,
    pub observed_at: DateTime<Utc>,
    pub change_id: ChangeId,
}

impl CellChange {
    /// `B2: Module Company changed from "Maxeon" to "Hanwa Qcell"`.
    pub fn describe(&self) -> String {
        format!(
            "{}: {} changed from \"{}\" to \"{}\"",
            self.cell_ref,
            self.field.label(),
            display_opt(self.old_value.as_ref()),
            display_opt(self.new_value.as_ref()),
        )
    }
}

fn display_opt(value: Option<&ScalarValue>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "null".to_string(),
    }
}

/// What a change log entry records.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    System,
    DataChange,
    Error,
    Sync,
    SyncError,
    Export,
}

impl ChangeAction {
    pub fn label(self) -> &'static str {
        match self {
            ChangeAction::System => "System",
            ChangeAction::DataChange => "Data Change",
            ChangeAction::Error => "Error",
            ChangeAction::Sync => "Sync",
            ChangeAction::SyncError => "Sync Error",
            ChangeAction::Export => "Export",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An entry of the change log.
///
/// Entries without cell changes are lifecycle events (poll started, poll
/// failed, ...). Apart from `read`, entries are immutable once logged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub id: EntryId,
    pub created_at: DateTime<Utc>,
    pub action: ChangeAction,
    pub summary: String,
    /// `None` for system-wide events.
    pub table: Option<TableKind>,
    #[serde(default)]
    pub cell_changes: Vec<CellChange>,
    #[serde(default)]
    pub read: bool,
}

impl ChangeLogEntry {
    pub fn is_lifecycle(&self) -> bool {
        self.cell_changes.is_empty()
    }

    /// Comma-separated cell references touched by this entry.
    pub fn coordinates(&self) -> String {
        self.cell_changes
            .iter()
            .map(|c| c.cell_ref.to_a1())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Display name of the entry's scope.
    pub fn scope(&self) -> &'static str {
        self.table.map_or("System", TableKind::display_name)
    }
}
