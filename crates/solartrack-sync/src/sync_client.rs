//! Pushes change highlights to the external spreadsheet.
//!
//! Changes are grouped by table and each group becomes exactly one
//! [`BatchUpdate`]. Groups are written independently: a failed group does not
//! stop the others, and nothing is retried automatically.

use serde::{Deserialize, Serialize};
use solartrack_model::{
    CellChange, ChangeKind, CoordinateResolver, RowIdentity, ScalarValue, TableKind,
};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::sheets::{BatchUpdate, CellMutation, Formatting, HighlightStyle, NoteUpdate, SheetWriter};

/// What `push` writes for each changed cell.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightMode {
    /// Formatting only.
    Highlight,
    /// Notes only.
    Comment,
    #[default]
    #[serde(alias = "interactive")]
    Both,
}

impl HighlightMode {
    fn formats(self) -> bool {
        matches!(self, HighlightMode::Highlight | HighlightMode::Both)
    }

    fn annotates(self) -> bool {
        matches!(self, HighlightMode::Comment | HighlightMode::Both)
    }
}

impl FromStr for HighlightMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highlight" => Ok(HighlightMode::Highlight),
            "comment" => Ok(HighlightMode::Comment),
            "both" | "interactive" => Ok(HighlightMode::Both),
            other => Err(format!(
                "unknown highlight mode `{other}` (expected highlight, comment or both)"
            )),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub mode: HighlightMode,
    /// Base URL of the dashboard, used for note links and hyperlinks.
    pub dashboard_url: Option<String>,
    /// Replace changed cells with a `HYPERLINK` formula pointing at the dashboard.
    pub hyperlinks: bool,
    pub highlight: HighlightStyle,
}

/// Outcome of the batch for one table.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupOutcome {
    pub table: TableKind,
    pub sheet_id: Option<u32>,
    pub changes: Vec<CellChange>,
    pub mutations: usize,
    /// `None` on success.
    pub error: Option<String>,
}

impl GroupOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncResult {
    pub groups: Vec<GroupOutcome>,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.groups.iter().all(GroupOutcome::is_success)
    }

    pub fn failed_groups(&self) -> impl Iterator<Item = &GroupOutcome> {
        self.groups.iter().filter(|g| !g.is_success())
    }

    /// Changes whose group failed, in input order per group; feed these back
    /// to `push` to retry.
    pub fn failed_changes(&self) -> Vec<CellChange> {
        self.failed_groups()
            .flat_map(|g| g.changes.iter().cloned())
            .collect()
    }

    /// Mutations in groups that were applied.
    pub fn mutations_applied(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.is_success())
            .map(|g| g.mutations)
            .sum()
    }

    pub fn changes_synced(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.is_success())
            .map(|g| g.changes.len())
            .sum()
    }
}

pub struct SyncClient<W> {
    writer: W,
    sheet_ids: BTreeMap<TableKind, u32>,
    options: SyncOptions,
}

impl<W: SheetWriter> SyncClient<W> {
    pub fn new(writer: W, resolver: &CoordinateResolver, options: SyncOptions) -> Self {
        let sheet_ids = resolver.layouts().map(|l| (l.table, l.sheet_id)).collect();
        Self {
            writer,
            sheet_ids,
            options,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Highlight and annotate every change. An empty list is a successful no-op.
    ///
    /// Removed rows of keyed tables are skipped: the rows below them have
    /// shifted up in the sheet, so their old position holds another row.
    pub async fn push(&self, changes: &[CellChange]) -> SyncResult {
        let changes = located(changes);
        self.submit(&changes, |sheet_id, group| {
            group
                .iter()
                .flat_map(|change| self.highlight_mutations(sheet_id, change))
                .collect()
        })
        .await
    }

    /// Remove highlighting and notes from the cells touched by `changes`.
    pub async fn clear(&self, changes: &[CellChange]) -> SyncResult {
        let changes = located(changes);
        self.submit(&changes, |sheet_id, group| {
            let cells: BTreeSet<_> = group.iter().map(|c| c.cell_ref).collect();
            cells
                .into_iter()
                .map(|cell| {
                    CellMutation::for_cell(sheet_id, cell)
                        .with_formatting(Formatting::Reset)
                        .with_note(NoteUpdate::Clear)
                })
                .collect()
        })
        .await
    }

    async fn submit<F>(&self, changes: &[CellChange], build: F) -> SyncResult
    where
        F: Fn(u32, &[CellChange]) -> Vec<CellMutation>,
    {
        let mut groups: BTreeMap<TableKind, Vec<CellChange>> = BTreeMap::new();
        for change in changes {
            groups.entry(change.table).or_default().push(change.clone());
        }

        let mut result = SyncResult::default();
        for (table, group) in groups {
            let Some(&sheet_id) = self.sheet_ids.get(&table) else {
                log::warn!("no sheet layout for {table}; skipping {} changes", group.len());
                result.groups.push(GroupOutcome {
                    table,
                    sheet_id: None,
                    changes: group,
                    mutations: 0,
                    error: Some(format!("no sheet layout configured for {table}")),
                });
                continue;
            };

            let batch = BatchUpdate {
                table,
                sheet_id,
                mutations: build(sheet_id, &group),
            };
            let mutations = batch.mutations.len();
            let error = match self.writer.batch_update(&batch).await {
                Ok(()) => None,
                Err(err) => {
                    log::warn!("sheets batch for {table} failed: {err}");
                    Some(err.to_string())
                }
            };
            result.groups.push(GroupOutcome {
                table,
                sheet_id: Some(sheet_id),
                changes: group,
                mutations,
                error,
            });
        }
        result
    }

    fn highlight_mutations(&self, sheet_id: u32, change: &CellChange) -> Vec<CellMutation> {
        let cell = change.cell_ref;
        let mut mutations = Vec::with_capacity(3);
        if self.options.mode.formats() {
            mutations.push(
                CellMutation::for_cell(sheet_id, cell)
                    .with_formatting(Formatting::Highlight(self.options.highlight)),
            );
        }
        if self.options.mode.annotates() {
            mutations.push(
                CellMutation::for_cell(sheet_id, cell).with_note(NoteUpdate::Set(self.note_text(change))),
            );
        }
        if self.options.hyperlinks && change.kind != ChangeKind::Removed {
            if let (Some(link), Some(value)) = (self.change_link(change), &change.new_value) {
                mutations.push(CellMutation::for_cell(sheet_id, cell).with_formula(hyperlink_formula(&link, value)));
            }
        }
        mutations
    }

    fn change_link(&self, change: &CellChange) -> Option<String> {
        let base = self.options.dashboard_url.as_deref()?.trim_end_matches('/');
        Some(format!(
            "{base}/sheets?cell={}&change={}",
            change.cell_ref, change.change_id
        ))
    }

    fn note_text(&self, change: &CellChange) -> String {
        let mut note = format!(
            "CHANGED: {}\n{}: {} -> {}",
            change.observed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            change.field.label(),
            value_or_blank(change.old_value.as_ref()),
            value_or_blank(change.new_value.as_ref()),
        );
        if let Some(link) = self.change_link(change) {
            note.push_str("\nDetails: ");
            note.push_str(&link);
        }
        note
    }
}

/// Changes whose cell reference still points at the changed row.
fn located(changes: &[CellChange]) -> Vec<CellChange> {
    changes
        .iter()
        .filter(|c| {
            let keep = !(c.kind == ChangeKind::Removed
                && c.table.row_identity() == RowIdentity::NaturalKey);
            if !keep {
                log::debug!("not writing removed row {} of {} to the sheet", c.row_index, c.table);
            }
            keep
        })
        .cloned()
        .collect()
}

fn value_or_blank(value: Option<&ScalarValue>) -> String {
    value.map_or_else(|| "(blank)".to_string(), ToString::to_string)
}

fn hyperlink_formula(link: &str, label: &ScalarValue) -> String {
    let label = label.to_string().replace('"', "\"\"");
    format!("=HYPERLINK(\"{link}\",\"{label}\")")
}
