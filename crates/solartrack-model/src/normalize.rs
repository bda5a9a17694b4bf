//! Boundary normalization of provider rows into typed table rows.
//!
//! Providers deliver JSON objects keyed by whatever header spelling the
//! source sheet uses. Everything past this module works on typed rows only.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::table::{
    Field, InstallRecord, InventoryItem, Snapshot, TableKind, TableSnapshot, TrackedRow,
};
use crate::value::ScalarValue;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("{table} payload is not an array of rows")]
    NotAnArray { table: TableKind },
    #[error("row {index} of {table} is not a JSON object")]
    NotAnObject { table: TableKind, index: usize },
    #[error("provider reported failure for {table}: {message}")]
    ProviderFailure { table: TableKind, message: String },
}

/// Convert a JSON scalar to a [`ScalarValue`]; nested values degrade to their JSON text.
pub fn scalar_from_json(value: &JsonValue) -> ScalarValue {
    match value {
        JsonValue::Null => ScalarValue::Empty,
        JsonValue::Number(n) => n
            .as_f64()
            .map(ScalarValue::Number)
            .unwrap_or_else(|| ScalarValue::Text(n.to_string())),
        JsonValue::String(s) => ScalarValue::Text(s.clone()),
        JsonValue::Bool(b) => ScalarValue::Text(b.to_string()),
        other => ScalarValue::Text(other.to_string()),
    }
}

/// Unwrap either a bare row array or a `{ "success": .., "data": [..] }` envelope.
fn row_array(table: TableKind, payload: &JsonValue) -> Result<&Vec<JsonValue>, NormalizeError> {
    match payload {
        JsonValue::Array(rows) => Ok(rows),
        JsonValue::Object(map) => {
            if map.get("success").and_then(JsonValue::as_bool) == Some(false) {
                let message = map
                    .get("error")
                    .or_else(|| map.get("message"))
                    .and_then(JsonValue::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                return Err(NormalizeError::ProviderFailure { table, message });
            }
            map.get("data")
                .and_then(JsonValue::as_array)
                .ok_or(NormalizeError::NotAnArray { table })
        }
        _ => Err(NormalizeError::NotAnArray { table }),
    }
}

/// Normalize a provider payload into typed rows of `R`.
///
/// Unknown headers are ignored; fields missing from a row stay empty.
pub fn rows_from_json<R: TrackedRow>(payload: &JsonValue) -> Result<Vec<R>, NormalizeError> {
    let table = R::TABLE;
    row_array(table, payload)?
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let object = raw
                .as_object()
                .ok_or(NormalizeError::NotAnObject { table, index })?;
            let mut row = R::default();
            for (header, value) in object {
                if let Some(field) = Field::from_header(table, header) {
                    row.set(field, scalar_from_json(value));
                }
            }
            Ok(row)
        })
        .collect()
}

/// Normalize a provider payload for `table` into a complete snapshot.
pub fn snapshot_from_json(
    table: TableKind,
    payload: &JsonValue,
    observed_at: DateTime<Utc>,
) -> Result<TableSnapshot, NormalizeError> {
    Ok(match table {
        TableKind::Inventory => TableSnapshot::Inventory(Snapshot::new(
            observed_at,
            rows_from_json::<InventoryItem>(payload)?,
        )),
        TableKind::InstallHistory => TableSnapshot::InstallHistory(Snapshot::new(
            observed_at,
            rows_from_json::<InstallRecord>(payload)?,
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sheet_headers_map_to_typed_fields() {
        let payload = json!({
            "success": true,
            "data": [
                {"No. Of Modules": 11, "Module Company": "Hanwa Qcell", "Rails": "12", "Notes": "x"},
                {"modules_count": "4", "module_company": "Maxeon 7 Series"}
            ]
        });
        let rows: Vec<InventoryItem> = rows_from_json(&payload).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].modules_count, ScalarValue::Number(11.0));
        assert_eq!(rows[0].module_company, ScalarValue::Text("Hanwa Qcell".into()));
        assert_eq!(rows[0].rails, ScalarValue::Text("12".into()));
        assert_eq!(rows[1].modules_count, ScalarValue::Text("4".into()));
        assert!(rows[1].clamps.is_empty());
    }

    #[test]
    fn bare_arrays_are_accepted() {
        let payload = json!([{"Date": "2024-05-01", "Customer": "Ortiz", "Panels": 18}]);
        let rows: Vec<InstallRecord> = rows_from_json(&payload).unwrap();
        assert_eq!(rows[0].customer, ScalarValue::Text("Ortiz".into()));
        assert_eq!(rows[0].panels, ScalarValue::Number(18.0));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let err = rows_from_json::<InventoryItem>(&json!([{"Rails": 1}, 7])).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::NotAnObject {
                table: TableKind::Inventory,
                index: 1
            }
        );

        let err = rows_from_json::<InventoryItem>(&json!({"success": false, "error": "quota"}))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::ProviderFailure { ref message, .. } if message == "quota"));

        assert!(rows_from_json::<InventoryItem>(&json!("nope")).is_err());
    }
}
