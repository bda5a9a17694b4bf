//! Tracked tables and their statically declared fields.
//!
//! Rows are typed records rather than open-ended key/value maps: every field a
//! table can carry is enumerated here, along with its canonical type and the
//! header aliases accepted at the provider boundary.

use chrono::{DateTime, Utc};
use core::fmt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use thiserror::Error;

use crate::value::{FieldKind, ScalarValue};

static EMPTY: ScalarValue = ScalarValue::Empty;

/// The tables mirrored from the inventory spreadsheet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Inventory,
    InstallHistory,
}

/// How rows of a table are matched across two snapshots.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RowIdentity {
    /// Rows are matched by the value of the table's key field.
    NaturalKey,
    /// Rows are only ever appended; new rows are those past the previous length.
    Appended,
}

impl TableKind {
    pub const ALL: [TableKind; 2] = [TableKind::Inventory, TableKind::InstallHistory];

    pub fn as_str(self) -> &'static str {
        match self {
            TableKind::Inventory => "inventory",
            TableKind::InstallHistory => "install_history",
        }
    }

    /// Human-readable name used in log summaries.
    pub fn display_name(self) -> &'static str {
        match self {
            TableKind::Inventory => "Inventory",
            TableKind::InstallHistory => "Install History",
        }
    }

    /// Worksheet tab backing the table.
    pub fn sheet_name(self) -> &'static str {
        match self {
            TableKind::Inventory => "Sheet1",
            TableKind::InstallHistory => "Sheet2",
        }
    }

    pub fn row_identity(self) -> RowIdentity {
        match self {
            TableKind::Inventory => RowIdentity::NaturalKey,
            TableKind::InstallHistory => RowIdentity::Appended,
        }
    }

    /// The field that identifies a row (natural key or synthetic append key).
    pub fn key_field(self) -> Field {
        match self {
            TableKind::Inventory => Field::Inventory(InventoryField::ModuleCompany),
            TableKind::InstallHistory => Field::InstallHistory(InstallField::Date),
        }
    }

    /// All fields in declared (column) order.
    pub fn fields(self) -> &'static [Field] {
        match self {
            TableKind::Inventory => INVENTORY_FIELDS,
            TableKind::InstallHistory => INSTALL_FIELDS,
        }
    }

    /// Fields in comparison order: key field first, then declared order.
    pub fn comparison_order(self) -> impl Iterator<Item = Field> {
        let key = self.key_field();
        std::iter::once(key).chain(self.fields().iter().copied().filter(move |f| *f != key))
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown table `{0}` (expected: inventory|install_history)")]
pub struct UnknownTable(pub String);

impl FromStr for TableKind {
    type Err = UnknownTable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "inventory" | "sheet1" => Ok(TableKind::Inventory),
            "installhistory" | "installs" | "sheet2" => Ok(TableKind::InstallHistory),
            _ => Err(UnknownTable(s.to_string())),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InventoryField {
    ModulesCount,
    ModuleCompany,
    OptimizersCount,
    OptimizersCompany,
    InverterCompany,
    BatteryCompany,
    Rails,
    Clamps,
    Disconnects,
    Conduits,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstallField {
    Date,
    Customer,
    SystemSize,
    Panels,
    Inverter,
    Status,
}

/// A tracked field of one of the tables.
///
/// Serialized as its snake_case name; names are unique across tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Inventory(InventoryField),
    InstallHistory(InstallField),
}

const INVENTORY_FIELDS: &[Field] = &[
    Field::Inventory(InventoryField::ModulesCount),
    Field::Inventory(InventoryField::ModuleCompany),
    Field::Inventory(InventoryField::OptimizersCount),
    Field::Inventory(InventoryField::OptimizersCompany),
    Field::Inventory(InventoryField::InverterCompany),
    Field::Inventory(InventoryField::BatteryCompany),
    Field::Inventory(InventoryField::Rails),
    Field::Inventory(InventoryField::Clamps),
    Field::Inventory(InventoryField::Disconnects),
    Field::Inventory(InventoryField::Conduits),
];

const INSTALL_FIELDS: &[Field] = &[
    Field::InstallHistory(InstallField::Date),
    Field::InstallHistory(InstallField::Customer),
    Field::InstallHistory(InstallField::SystemSize),
    Field::InstallHistory(InstallField::Panels),
    Field::InstallHistory(InstallField::Inverter),
    Field::InstallHistory(InstallField::Status),
];

impl Field {
    pub fn table(self) -> TableKind {
        match self {
            Field::Inventory(_) => TableKind::Inventory,
            Field::InstallHistory(_) => TableKind::InstallHistory,
        }
    }

    pub fn name(self) -> &'static str {
        use InstallField as I;
        use InventoryField as V;
        match self {
            Field::Inventory(V::ModulesCount) => "modules_count",
            Field::Inventory(V::ModuleCompany) => "module_company",
            Field::Inventory(V::OptimizersCount) => "optimizers_count",
            Field::Inventory(V::OptimizersCompany) => "optimizers_company",
            Field::Inventory(V::InverterCompany) => "inverter_company",
            Field::Inventory(V::BatteryCompany) => "battery_company",
            Field::Inventory(V::Rails) => "rails",
            Field::Inventory(V::Clamps) => "clamps",
            Field::Inventory(V::Disconnects) => "disconnects",
            Field::Inventory(V::Conduits) => "conduits",
            Field::InstallHistory(I::Date) => "date",
            Field::InstallHistory(I::Customer) => "customer",
            Field::InstallHistory(I::SystemSize) => "system_size",
            Field::InstallHistory(I::Panels) => "panels",
            Field::InstallHistory(I::Inverter) => "inverter",
            Field::InstallHistory(I::Status) => "status",
        }
    }

    /// Column header as it appears in the sheet.
    pub fn label(self) -> &'static str {
        use InstallField as I;
        use InventoryField as V;
        match self {
            Field::Inventory(V::ModulesCount) => "No. Of Modules",
            Field::Inventory(V::ModuleCompany) => "Module Company",
            Field::Inventory(V::OptimizersCount) => "No. of Optimizers",
            Field::Inventory(V::OptimizersCompany) => "Optimizers Company",
            Field::Inventory(V::InverterCompany) => "Inverter Company",
            Field::Inventory(V::BatteryCompany) => "Battery Company",
            Field::Inventory(V::Rails) => "Rails",
            Field::Inventory(V::Clamps) => "Clamps",
            Field::Inventory(V::Disconnects) => "Disconnects",
            Field::Inventory(V::Conduits) => "Conduits",
            Field::InstallHistory(I::Date) => "Date",
            Field::InstallHistory(I::Customer) => "Customer",
            Field::InstallHistory(I::SystemSize) => "System Size",
            Field::InstallHistory(I::Panels) => "Panels",
            Field::InstallHistory(I::Inverter) => "Inverter",
            Field::InstallHistory(I::Status) => "Status",
        }
    }

    pub fn kind(self) -> FieldKind {
        use InstallField as I;
        use InventoryField as V;
        match self {
            Field::Inventory(V::ModulesCount | V::OptimizersCount)
            | Field::InstallHistory(I::SystemSize | I::Panels) => FieldKind::Number,
            _ => FieldKind::Text,
        }
    }

    /// Extra provider header spellings beyond [`Field::name`] and [`Field::label`].
    fn aliases(self) -> &'static [&'static str] {
        use InstallField as I;
        use InventoryField as V;
        match self {
            Field::Inventory(V::ModulesCount) => &["modules", "module count", "count"],
            Field::Inventory(V::ModuleCompany) => &["company", "model", "key"],
            Field::Inventory(V::OptimizersCount) => &["optimizers"],
            Field::InstallHistory(I::Date) => &["install date", "installed on"],
            Field::InstallHistory(I::Customer) => &["customer name", "client"],
            Field::InstallHistory(I::SystemSize) => &["system size kw", "size"],
            Field::InstallHistory(I::Panels) => &["panel count", "no. of panels"],
            _ => &[],
        }
    }

    /// Resolve a provider header to a field of `table`.
    ///
    /// Matching ignores case, whitespace and punctuation, so `"No. Of Modules"`,
    /// `"modules_count"` and `"MODULES COUNT"` all resolve to the same field.
    pub fn from_header(table: TableKind, header: &str) -> Option<Field> {
        let wanted = normalize_label(header);
        if wanted.is_empty() {
            return None;
        }
        table.fields().iter().copied().find(|field| {
            normalize_label(field.name()) == wanted
                || normalize_label(field.label()) == wanted
                || field.aliases().iter().any(|a| normalize_label(a) == wanted)
        })
    }

    /// Look up a field by its exact snake_case name in any table.
    pub fn from_name(name: &str) -> Option<Field> {
        TableKind::ALL
            .iter()
            .flat_map(|t| t.fields().iter().copied())
            .find(|f| f.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Field::from_name(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown field `{raw}`")))
    }
}

fn normalize_label(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A typed row of one tracked table.
pub trait TrackedRow: Clone + fmt::Debug + Default + PartialEq + Send + Sync + 'static {
    const TABLE: TableKind;

    /// Value of `field`; fields belonging to another table read as empty.
    fn value(&self, field: Field) -> &ScalarValue;

    /// Assign `field`; fields belonging to another table are ignored.
    fn set(&mut self, field: Field, value: ScalarValue);

    /// Canonical value of the row's key field.
    fn key(&self) -> ScalarValue {
        let field = Self::TABLE.key_field();
        self.value(field).canonical(field.kind())
    }
}

/// A row of the inventory sheet.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryItem {
    pub modules_count: ScalarValue,
    pub module_company: ScalarValue,
    pub optimizers_count: ScalarValue,
    pub optimizers_company: ScalarValue,
    pub inverter_company: ScalarValue,
    pub battery_company: ScalarValue,
    pub rails: ScalarValue,
    pub clamps: ScalarValue,
    pub disconnects: ScalarValue,
    pub conduits: ScalarValue,
}

impl InventoryItem {
    /// Shorthand for tests and fixtures: a company with a module count.
    pub fn new(module_company: impl Into<String>, modules_count: f64) -> Self {
        Self {
            module_company: ScalarValue::Text(module_company.into()),
            modules_count: ScalarValue::Number(modules_count),
            ..Self::default()
        }
    }

    fn slot(&mut self, field: InventoryField) -> &mut ScalarValue {
        use InventoryField as V;
        match field {
            V::ModulesCount => &mut self.modules_count,
            V::ModuleCompany => &mut self.module_company,
            V::OptimizersCount => &mut self.optimizers_count,
            V::OptimizersCompany => &mut self.optimizers_company,
            V::InverterCompany => &mut self.inverter_company,
            V::BatteryCompany => &mut self.battery_company,
            V::Rails => &mut self.rails,
            V::Clamps => &mut self.clamps,
            V::Disconnects => &mut self.disconnects,
            V::Conduits => &mut self.conduits,
        }
    }
}

impl TrackedRow for InventoryItem {
    const TABLE: TableKind = TableKind::Inventory;

    fn value(&self, field: Field) -> &ScalarValue {
        use InventoryField as V;
        let Field::Inventory(field) = field else {
            return &EMPTY;
        };
        match field {
            V::ModulesCount => &self.modules_count,
            V::ModuleCompany => &self.module_company,
            V::OptimizersCount => &self.optimizers_count,
            V::OptimizersCompany => &self.optimizers_company,
            V::InverterCompany => &self.inverter_company,
            V::BatteryCompany => &self.battery_company,
            V::Rails => &self.rails,
            V::Clamps => &self.clamps,
            V::Disconnects => &self.disconnects,
            V::Conduits => &self.conduits,
        }
    }

    fn set(&mut self, field: Field, value: ScalarValue) {
        if let Field::Inventory(field) = field {
            *self.slot(field) = value;
        }
    }
}

/// A row of the install-history sheet.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallRecord {
    pub date: ScalarValue,
    pub customer: ScalarValue,
    pub system_size: ScalarValue,
    pub panels: ScalarValue,
    pub inverter: ScalarValue,
    pub status: ScalarValue,
}

impl InstallRecord {
    fn slot(&mut self, field: InstallField) -> &mut ScalarValue {
        use InstallField as I;
        match field {
            I::Date => &mut self.date,
            I::Customer => &mut self.customer,
            I::SystemSize => &mut self.system_size,
            I::Panels => &mut self.panels,
            I::Inverter => &mut self.inverter,
            I::Status => &mut self.status,
        }
    }
}

impl TrackedRow for InstallRecord {
    const TABLE: TableKind = TableKind::InstallHistory;

    fn value(&self, field: Field) -> &ScalarValue {
        use InstallField as I;
        let Field::InstallHistory(field) = field else {
            return &EMPTY;
        };
        match field {
            I::Date => &self.date,
            I::Customer => &self.customer,
            I::SystemSize => &self.system_size,
            I::Panels => &self.panels,
            I::Inverter => &self.inverter,
            I::Status => &self.status,
        }
    }

    fn set(&mut self, field: Field, value: ScalarValue) {
        if let Field::InstallHistory(field) = field {
            *self.slot(field) = value;
        }
    }
}

/// A complete copy of one table as observed by a single poll.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<R> {
    pub observed_at: DateTime<Utc>,
    pub rows: Vec<R>,
}

impl<R> Snapshot<R> {
    pub fn new(observed_at: DateTime<Utc>, rows: Vec<R>) -> Self {
        Self { observed_at, rows }
    }
}

/// A snapshot of any tracked table.
#[derive(Clone, Debug, PartialEq)]
pub enum TableSnapshot {
    Inventory(Snapshot<InventoryItem>),
    InstallHistory(Snapshot<InstallRecord>),
}

impl TableSnapshot {
    pub fn table(&self) -> TableKind {
        match self {
            TableSnapshot::Inventory(_) => TableKind::Inventory,
            TableSnapshot::InstallHistory(_) => TableKind::InstallHistory,
        }
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        match self {
            TableSnapshot::Inventory(s) => s.observed_at,
            TableSnapshot::InstallHistory(s) => s.observed_at,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TableSnapshot::Inventory(s) => s.rows.len(),
            TableSnapshot::InstallHistory(s) => s.rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Snapshot<InventoryItem>> for TableSnapshot {
    fn from(value: Snapshot<InventoryItem>) -> Self {
        TableSnapshot::Inventory(value)
    }
}

impl From<Snapshot<InstallRecord>> for TableSnapshot {
    fn from(value: Snapshot<InstallRecord>) -> Self {
        TableSnapshot::InstallHistory(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_order_puts_key_first() {
        let order: Vec<&str> = TableKind::Inventory
            .comparison_order()
            .map(Field::name)
            .collect();
        assert_eq!(order[0], "module_company");
        assert_eq!(order[1], "modules_count");
        assert_eq!(order.len(), TableKind::Inventory.fields().len());

        let order: Vec<Field> = TableKind::InstallHistory.comparison_order().collect();
        assert_eq!(order, TableKind::InstallHistory.fields());
    }

    #[test]
    fn headers_resolve_loosely() {
        let modules = Field::Inventory(InventoryField::ModulesCount);
        assert_eq!(Field::from_header(TableKind::Inventory, "No. Of Modules"), Some(modules));
        assert_eq!(Field::from_header(TableKind::Inventory, "modules_count"), Some(modules));
        assert_eq!(Field::from_header(TableKind::Inventory, "count"), Some(modules));
        assert_eq!(Field::from_header(TableKind::Inventory, "Date"), None);
        assert_eq!(
            Field::from_header(TableKind::InstallHistory, "System Size"),
            Some(Field::InstallHistory(InstallField::SystemSize))
        );
    }

    #[test]
    fn field_names_are_unique_and_roundtrip() {
        for table in TableKind::ALL {
            for field in table.fields() {
                assert_eq!(Field::from_name(field.name()), Some(*field));
                let json = serde_json::to_string(field).unwrap();
                assert_eq!(serde_json::from_str::<Field>(&json).unwrap(), *field);
            }
        }
    }

    #[test]
    fn foreign_fields_read_as_empty() {
        let item = InventoryItem::new("Hanwa Qcell", 11.0);
        assert!(item.value(Field::InstallHistory(InstallField::Date)).is_empty());
        assert_eq!(item.key(), ScalarValue::Text("Hanwa Qcell".into()));
    }

    #[test]
    fn table_names_parse() {
        assert_eq!("inventory".parse::<TableKind>().unwrap(), TableKind::Inventory);
        assert_eq!("install-history".parse::<TableKind>().unwrap(), TableKind::InstallHistory);
        assert_eq!("Sheet2".parse::<TableKind>().unwrap(), TableKind::InstallHistory);
        assert!("orders".parse::<TableKind>().is_err());
    }
}
