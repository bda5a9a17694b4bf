//! `solartrack-model` defines the data shared by the sheet sync engine and its
//! front ends:
//! - typed inventory / install-history rows and whole-table snapshots
//! - A1 cell references and the per-sheet coordinate resolver
//! - cell-level change records and change log entries (JSON-safe via `serde`)

mod address;
mod change;
pub mod layout;
pub mod normalize;
mod table;
mod value;

pub use address::{column_index, CellRef, CellRefError, SHEET_MAX_COLS, SHEET_MAX_ROWS};
pub use change::{
    CellChange, ChangeAction, ChangeId, ChangeKind, ChangeLogEntry, EntryId, IdGenerator,
};
pub use layout::{CoordinateResolver, LayoutError, ResolveError, SheetLayout};
pub use normalize::{rows_from_json, snapshot_from_json, NormalizeError};
pub use table::{
    Field, InstallField, InstallRecord, InventoryField, InventoryItem, RowIdentity, Snapshot,
    TableKind, TableSnapshot, TrackedRow, UnknownTable,
};
pub use value::{FieldKind, ScalarValue};
