//! Batched writes to the external spreadsheet.
//!
//! A [`BatchUpdate`] holds every cell mutation for one worksheet. The
//! [`SheetWriter`] trait is the transport seam; [`GoogleSheetsWriter`] speaks
//! the Sheets v4 `spreadsheets.batchUpdate` API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use solartrack_model::{CellRef, TableKind};
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::error::WriteError;

pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Rgba {
    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }
}

/// Visual treatment of a changed cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightStyle {
    pub background: Rgba,
    pub border: Rgba,
    pub border_width: u32,
    pub bold: bool,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            background: Rgba::new(0.98, 0.85, 0.4, 0.9),
            border: Rgba::new(0.9, 0.4, 0.0, 1.0),
            border_width: 3,
            bold: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Formatting {
    Highlight(HighlightStyle),
    /// Drop all user-entered formatting.
    Reset,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NoteUpdate {
    Set(String),
    Clear,
}

/// One mutation of a cell range; end indices are exclusive.
#[derive(Clone, Debug, PartialEq)]
pub struct CellMutation {
    pub sheet_id: u32,
    pub start_row: u32,
    pub end_row: u32,
    pub start_col: u32,
    pub end_col: u32,
    pub formatting: Option<Formatting>,
    pub note: Option<NoteUpdate>,
    /// Replaces the cell's value with a formula.
    pub formula: Option<String>,
}

impl CellMutation {
    pub fn for_cell(sheet_id: u32, cell: CellRef) -> Self {
        Self {
            sheet_id,
            start_row: cell.row,
            end_row: cell.row + 1,
            start_col: cell.col,
            end_col: cell.col + 1,
            formatting: None,
            note: None,
            formula: None,
        }
    }

    pub fn with_formatting(mut self, formatting: Formatting) -> Self {
        self.formatting = Some(formatting);
        self
    }

    pub fn with_note(mut self, note: NoteUpdate) -> Self {
        self.note = Some(note);
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// The Sheets `updateCells` request for this mutation.
    pub fn to_request(&self) -> JsonValue {
        let mut cell = Map::new();
        let mut fields = Vec::new();

        match self.formatting {
            Some(Formatting::Highlight(style)) => {
                cell.insert("userEnteredFormat".into(), highlight_format(&style));
                fields.push("userEnteredFormat");
            }
            Some(Formatting::Reset) => fields.push("userEnteredFormat"),
            None => {}
        }
        match &self.note {
            Some(NoteUpdate::Set(text)) => {
                cell.insert("note".into(), JsonValue::String(text.clone()));
                fields.push("note");
            }
            Some(NoteUpdate::Clear) => fields.push("note"),
            None => {}
        }
        if let Some(formula) = &self.formula {
            cell.insert("userEnteredValue".into(), json!({ "formulaValue": formula }));
            fields.push("userEnteredValue");
        }

        json!({
            "updateCells": {
                "range": {
                    "sheetId": self.sheet_id,
                    "startRowIndex": self.start_row,
                    "endRowIndex": self.end_row,
                    "startColumnIndex": self.start_col,
                    "endColumnIndex": self.end_col,
                },
                "rows": [{ "values": [JsonValue::Object(cell)] }],
                "fields": fields.join(","),
            }
        })
    }
}

fn highlight_format(style: &HighlightStyle) -> JsonValue {
    let border = json!({
        "style": "SOLID",
        "width": style.border_width,
        "color": style.border,
    });
    json!({
        "backgroundColor": style.background,
        "borders": {
            "top": border,
            "bottom": border,
            "left": border,
            "right": border,
        },
        "textFormat": { "bold": style.bold },
    })
}

/// Every mutation for one worksheet, submitted as a single request.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchUpdate {
    pub table: TableKind,
    pub sheet_id: u32,
    pub mutations: Vec<CellMutation>,
}

impl BatchUpdate {
    pub fn to_body(&self) -> JsonValue {
        json!({
            "requests": self.mutations.iter().map(CellMutation::to_request).collect::<Vec<_>>(),
        })
    }
}

/// Transport for batched spreadsheet writes.
pub trait SheetWriter: Send + Sync {
    fn batch_update(&self, batch: &BatchUpdate) -> impl Future<Output = Result<(), WriteError>> + Send;
}

/// Writes batches through the Sheets v4 REST API.
#[derive(Debug, Clone)]
pub struct GoogleSheetsWriter {
    client: reqwest::Client,
    endpoint: Url,
    access_token: Option<String>,
}

impl GoogleSheetsWriter {
    pub fn new(
        api_base: &str,
        spreadsheet_id: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, WriteError> {
        let base = api_base.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{base}/spreadsheets/{spreadsheet_id}:batchUpdate"))
            .map_err(|e| WriteError::Rejected(format!("invalid sheets endpoint: {e}")))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            access_token,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl SheetWriter for GoogleSheetsWriter {
    async fn batch_update(&self, batch: &BatchUpdate) -> Result<(), WriteError> {
        if batch.mutations.is_empty() {
            return Ok(());
        }
        let mut request = self.client.post(self.endpoint.clone()).json(&batch.to_body());
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WriteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        log::debug!(
            "sheets batch for {} applied {} mutations",
            batch.table,
            batch.mutations.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn highlight_request_layout() {
        let mutation = CellMutation::for_cell(515_566_561, CellRef::new(1, 0))
            .with_formatting(Formatting::Highlight(HighlightStyle::default()))
            .with_note(NoteUpdate::Set("CHANGED".into()));
        let request = mutation.to_request();
        let update = &request["updateCells"];

        assert_eq!(
            update["range"],
            json!({
                "sheetId": 515_566_561u32,
                "startRowIndex": 1,
                "endRowIndex": 2,
                "startColumnIndex": 0,
                "endColumnIndex": 1,
            })
        );
        assert_eq!(update["fields"], "userEnteredFormat,note");
        let cell = &update["rows"][0]["values"][0];
        assert_eq!(cell["note"], "CHANGED");
        assert_eq!(cell["userEnteredFormat"]["borders"]["left"]["style"], "SOLID");
        assert_eq!(cell["userEnteredFormat"]["borders"]["left"]["width"], 3);
        assert_eq!(cell["userEnteredFormat"]["textFormat"]["bold"], true);
    }

    #[test]
    fn reset_request_clears_without_values() {
        let request = CellMutation::for_cell(7, CellRef::new(4, 2))
            .with_formatting(Formatting::Reset)
            .with_note(NoteUpdate::Clear)
            .to_request();
        assert_eq!(request["updateCells"]["fields"], "userEnteredFormat,note");
        assert_eq!(request["updateCells"]["rows"][0]["values"][0], json!({}));
    }

    #[test]
    fn endpoint_includes_spreadsheet_id() {
        let writer = GoogleSheetsWriter::new(
            "https://sheets.googleapis.com/v4/",
            "abc123",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            writer.endpoint().as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123:batchUpdate"
        );
    }
}
