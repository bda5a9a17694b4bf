//! Sheet layouts and the coordinate resolver.
//!
//! A layout pins every tracked field of a table to a column of its worksheet.
//! Rows are addressed by their zero-based position in the provider snapshot,
//! offset by the layout's header rows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::address::{column_index, CellRef, CellRefError, SHEET_MAX_ROWS};
use crate::table::{Field, TableKind};

pub const DEFAULT_HEADER_ROWS: u32 = 1;

pub const INVENTORY_SHEET_ID: u32 = 515_566_561;
pub const INSTALL_HISTORY_SHEET_ID: u32 = 390_609_277;

const INVENTORY_COLUMNS: &[&str] = &["A", "B", "C", "D", "E", "F", "G", "H", "I", "J"];
const INSTALL_HISTORY_COLUMNS: &[&str] = &["A", "B", "C", "D", "E", "F"];

/// Column layout of one worksheet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub table: TableKind,
    pub sheet_name: String,
    /// Numeric sheet id used by the write API.
    pub sheet_id: u32,
    #[serde(default = "default_header_rows")]
    pub header_rows: u32,
    /// Field -> column letters (`"A"`, `"AB"`).
    pub columns: BTreeMap<Field, String>,
}

fn default_header_rows() -> u32 {
    DEFAULT_HEADER_ROWS
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("layout for {table} maps field `{field}` which belongs to {owner}")]
    ForeignField {
        table: TableKind,
        field: Field,
        owner: TableKind,
    },
    #[error("layout for {table} maps field `{field}` to invalid column `{column}`")]
    InvalidColumn {
        table: TableKind,
        field: Field,
        column: String,
    },
    #[error("layout for {table} has no column for tracked field `{field}`")]
    MissingField { table: TableKind, field: Field },
}

impl SheetLayout {
    pub fn new<'a>(
        table: TableKind,
        sheet_id: u32,
        header_rows: u32,
        columns: impl IntoIterator<Item = (Field, &'a str)>,
    ) -> Result<Self, LayoutError> {
        let layout = Self {
            table,
            sheet_name: table.sheet_name().to_string(),
            sheet_id,
            header_rows,
            columns: columns
                .into_iter()
                .map(|(field, col)| (field, col.trim().to_ascii_uppercase()))
                .collect(),
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Default layout of the inventory workbook.
    pub fn default_for(table: TableKind) -> Self {
        let (sheet_id, letters) = match table {
            TableKind::Inventory => (INVENTORY_SHEET_ID, INVENTORY_COLUMNS),
            TableKind::InstallHistory => (INSTALL_HISTORY_SHEET_ID, INSTALL_HISTORY_COLUMNS),
        };
        Self {
            table,
            sheet_name: table.sheet_name().to_string(),
            sheet_id,
            header_rows: DEFAULT_HEADER_ROWS,
            columns: table
                .fields()
                .iter()
                .copied()
                .zip(letters.iter().map(|l| l.to_string()))
                .collect(),
        }
    }

    /// Check that every mapped field belongs to this table and every column is valid.
    pub fn validate(&self) -> Result<(), LayoutError> {
        for (field, column) in &self.columns {
            if field.table() != self.table {
                return Err(LayoutError::ForeignField {
                    table: self.table,
                    field: *field,
                    owner: field.table(),
                });
            }
            if column_index(column).is_err() {
                return Err(LayoutError::InvalidColumn {
                    table: self.table,
                    field: *field,
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    /// Like [`SheetLayout::validate`], and additionally require a column for
    /// every tracked field of the table.
    pub fn validate_complete(&self) -> Result<(), LayoutError> {
        self.validate()?;
        match self
            .table
            .fields()
            .iter()
            .find(|f| !self.columns.contains_key(*f))
        {
            Some(field) => Err(LayoutError::MissingField {
                table: self.table,
                field: *field,
            }),
            None => Ok(()),
        }
    }

    /// 0-based column of `field`, if mapped.
    pub fn column_of(&self, field: Field) -> Option<u32> {
        self.columns
            .get(&field)
            .and_then(|letters| column_index(letters).ok())
    }
}

/// Coordinate resolution failures.
///
/// These indicate a static-configuration bug rather than a data problem;
/// callers should surface them instead of skipping the change.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("field `{field}` has no column mapping in the {table} layout")]
    UnmappedField { table: TableKind, field: String },
    #[error("no sheet layout configured for {0}")]
    MissingLayout(TableKind),
    #[error("row index {row_index} of {table} is beyond the last sheet row")]
    RowOutOfRange { table: TableKind, row_index: usize },
    #[error(transparent)]
    InvalidCellReference(#[from] CellRefError),
}

/// Maps `(table, row index, field)` triples to cell references and back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinateResolver {
    layouts: BTreeMap<TableKind, SheetLayout>,
}

impl Default for CoordinateResolver {
    fn default() -> Self {
        Self::new(TableKind::ALL.into_iter().map(SheetLayout::default_for))
    }
}

impl CoordinateResolver {
    pub fn new(layouts: impl IntoIterator<Item = SheetLayout>) -> Self {
        Self {
            layouts: layouts.into_iter().map(|l| (l.table, l)).collect(),
        }
    }

    pub fn layout(&self, table: TableKind) -> Option<&SheetLayout> {
        self.layouts.get(&table)
    }

    pub fn layouts(&self) -> impl Iterator<Item = &SheetLayout> {
        self.layouts.values()
    }

    /// Resolve the cell holding `field` of the zero-based `row_index`-th row.
    pub fn to_cell_ref(
        &self,
        table: TableKind,
        row_index: usize,
        field: Field,
    ) -> Result<CellRef, ResolveError> {
        let layout = self
            .layouts
            .get(&table)
            .ok_or(ResolveError::MissingLayout(table))?;
        let unmapped = || ResolveError::UnmappedField {
            table,
            field: field.name().to_string(),
        };
        if field.table() != table {
            return Err(unmapped());
        }
        let col = layout.column_of(field).ok_or_else(unmapped)?;

        let row = u32::try_from(row_index)
            .ok()
            .and_then(|r| r.checked_add(layout.header_rows))
            .filter(|r| *r < SHEET_MAX_ROWS)
            .ok_or(ResolveError::RowOutOfRange { table, row_index })?;

        Ok(CellRef::new(row, col))
    }

    /// Like [`CoordinateResolver::to_cell_ref`], for a field named at a string boundary.
    pub fn to_cell_ref_by_name(
        &self,
        table: TableKind,
        row_index: usize,
        field_name: &str,
    ) -> Result<CellRef, ResolveError> {
        let field = Field::from_header(table, field_name).ok_or_else(|| {
            ResolveError::UnmappedField {
                table,
                field: field_name.to_string(),
            }
        })?;
        self.to_cell_ref(table, row_index, field)
    }

    /// Parse an A1 reference into zero-based `(row, col)` coordinates.
    pub fn from_cell_ref(cell_ref: &str) -> Result<CellRef, ResolveError> {
        Ok(CellRef::from_a1(cell_ref)?)
    }

    /// Reverse lookup: which row index and field a cell of `table` holds.
    pub fn locate(&self, table: TableKind, cell: CellRef) -> Option<(usize, Field)> {
        let layout = self.layouts.get(&table)?;
        let row_index = cell.row.checked_sub(layout.header_rows)?;
        let field = layout
            .columns
            .keys()
            .copied()
            .find(|f| layout.column_of(*f) == Some(cell.col))?;
        Some((row_index as usize, field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{InstallField, InventoryField};
    use pretty_assertions::assert_eq;

    #[test]
    fn rows_are_offset_past_the_header() {
        let resolver = CoordinateResolver::default();
        let cell = resolver
            .to_cell_ref(
                TableKind::Inventory,
                0,
                Field::Inventory(InventoryField::ModulesCount),
            )
            .unwrap();
        assert_eq!(cell.to_a1(), "A2");

        let cell = resolver
            .to_cell_ref(
                TableKind::Inventory,
                4,
                Field::Inventory(InventoryField::Conduits),
            )
            .unwrap();
        assert_eq!(cell.to_a1(), "J6");
    }

    #[test]
    fn unmapped_fields_do_not_default_to_column_a() {
        let mut layout = SheetLayout::default_for(TableKind::Inventory);
        layout
            .columns
            .remove(&Field::Inventory(InventoryField::Rails));
        let resolver = CoordinateResolver::new([layout]);

        let err = resolver
            .to_cell_ref(TableKind::Inventory, 0, Field::Inventory(InventoryField::Rails))
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnmappedField { .. }));

        let err = resolver
            .to_cell_ref(TableKind::Inventory, 0, Field::InstallHistory(InstallField::Date))
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnmappedField { .. }));

        let err = resolver
            .to_cell_ref_by_name(TableKind::Inventory, 0, "warranty")
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnmappedField {
                table: TableKind::Inventory,
                field: "warranty".into()
            }
        );
    }

    #[test]
    fn missing_layout_is_reported() {
        let resolver = CoordinateResolver::new([SheetLayout::default_for(TableKind::Inventory)]);
        let err = resolver
            .to_cell_ref(
                TableKind::InstallHistory,
                0,
                Field::InstallHistory(InstallField::Date),
            )
            .unwrap_err();
        assert_eq!(err, ResolveError::MissingLayout(TableKind::InstallHistory));
    }

    #[test]
    fn layouts_reject_bad_columns() {
        let err = SheetLayout::new(
            TableKind::Inventory,
            1,
            1,
            [(Field::Inventory(InventoryField::Rails), "G1")],
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidColumn { .. }));

        let err = SheetLayout::new(
            TableKind::Inventory,
            1,
            1,
            [(Field::InstallHistory(InstallField::Status), "F")],
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::ForeignField { .. }));
    }

    #[test]
    fn complete_layouts_map_every_field() {
        for table in TableKind::ALL {
            SheetLayout::default_for(table).validate_complete().unwrap();
        }

        let mut layout = SheetLayout::default_for(TableKind::Inventory);
        layout
            .columns
            .remove(&Field::Inventory(InventoryField::Rails));
        layout.validate().unwrap();
        assert_eq!(
            layout.validate_complete(),
            Err(LayoutError::MissingField {
                table: TableKind::Inventory,
                field: Field::Inventory(InventoryField::Rails),
            })
        );
    }

    #[test]
    fn locate_inverts_resolution() {
        let resolver = CoordinateResolver::default();
        let cell = CoordinateResolver::from_cell_ref("C7").unwrap();
        assert_eq!(
            resolver.locate(TableKind::InstallHistory, cell),
            Some((5, Field::InstallHistory(InstallField::SystemSize)))
        );
        assert_eq!(
            resolver.locate(TableKind::Inventory, CellRef::new(0, 0)),
            None,
            "header row holds no data"
        );
    }
}
