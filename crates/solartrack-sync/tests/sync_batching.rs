use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use solartrack_model::{
    CellChange, ChangeId, ChangeKind, CoordinateResolver, Field, InstallField, InventoryField,
    ScalarValue, TableKind,
};
use solartrack_sync::sheets::{Formatting, NoteUpdate};
use solartrack_sync::{BatchUpdate, SheetWriter, SyncClient, SyncOptions, WriteError};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Records every batch and fails those aimed at `failing` tables.
#[derive(Clone, Default)]
struct RecordingWriter {
    batches: Arc<Mutex<Vec<BatchUpdate>>>,
    failing: BTreeSet<TableKind>,
}

impl RecordingWriter {
    fn failing(tables: &[TableKind]) -> Self {
        Self {
            failing: tables.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn batches(&self) -> Vec<BatchUpdate> {
        self.batches.lock().unwrap().clone()
    }
}

impl SheetWriter for RecordingWriter {
    async fn batch_update(&self, batch: &BatchUpdate) -> Result<(), WriteError> {
        self.batches.lock().unwrap().push(batch.clone());
        if self.failing.contains(&batch.table) {
            return Err(WriteError::Status {
                status: 429,
                body: "rate limited".into(),
            });
        }
        Ok(())
    }
}

fn change(table: TableKind, field: Field, row_index: usize) -> CellChange {
    let cell_ref = CoordinateResolver::default()
        .to_cell_ref(table, row_index, field)
        .unwrap();
    CellChange {
        table,
        kind: ChangeKind::Modified,
        row_index,
        field,
        cell_ref,
        old_value: Some(ScalarValue::Number(11.0)),
        new_value: Some(ScalarValue::Number(15.0)),
        observed_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        change_id: ChangeId::from(format!("{}_{row_index}", field.name()).as_str()),
    }
}

fn inventory_change(row_index: usize) -> CellChange {
    change(
        TableKind::Inventory,
        Field::Inventory(InventoryField::ModulesCount),
        row_index,
    )
}

fn install_change(row_index: usize) -> CellChange {
    change(
        TableKind::InstallHistory,
        Field::InstallHistory(InstallField::Panels),
        row_index,
    )
}

fn client(writer: RecordingWriter) -> SyncClient<RecordingWriter> {
    SyncClient::new(writer, &CoordinateResolver::default(), SyncOptions::default())
}

#[tokio::test(flavor = "current_thread")]
async fn one_batch_per_table() {
    let writer = RecordingWriter::default();
    let client = client(writer.clone());

    let result = client.push(&[inventory_change(0), inventory_change(3)]).await;

    assert!(result.is_success());
    let batches = writer.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].sheet_id, 515_566_561);
    // Highlight and note for each change.
    assert_eq!(batches[0].mutations.len(), 4);
    assert_eq!(result.mutations_applied(), 4);
    assert_eq!(result.changes_synced(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn failed_batch_is_one_failed_group() {
    let writer = RecordingWriter::failing(&[TableKind::Inventory]);
    let client = client(writer.clone());

    let result = client.push(&[inventory_change(0), inventory_change(1)]).await;

    assert_eq!(writer.batches().len(), 1);
    assert!(!result.is_success());
    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.failed_groups().count(), 1);
    assert_eq!(result.failed_changes().len(), 2);
    assert!(result.groups[0]
        .error
        .as_deref()
        .unwrap()
        .contains("429"));
}

#[tokio::test(flavor = "current_thread")]
async fn other_groups_still_attempted_after_a_failure() {
    let writer = RecordingWriter::failing(&[TableKind::Inventory]);
    let client = client(writer.clone());

    let result = client
        .push(&[install_change(0), inventory_change(0), install_change(1)])
        .await;

    let tables: Vec<TableKind> = writer.batches().iter().map(|b| b.table).collect();
    assert_eq!(tables, vec![TableKind::Inventory, TableKind::InstallHistory]);
    assert_eq!(result.changes_synced(), 2);

    let retry: Vec<CellChange> = result.failed_changes();
    assert_eq!(retry, vec![inventory_change(0)]);
}

#[tokio::test(flavor = "current_thread")]
async fn empty_push_is_a_successful_noop() {
    let writer = RecordingWriter::default();
    let result = client(writer.clone()).push(&[]).await;
    assert!(result.is_success());
    assert!(result.groups.is_empty());
    assert!(writer.batches().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn clear_resets_each_cell_once() {
    let writer = RecordingWriter::default();
    let client = client(writer.clone());

    let result = client
        .clear(&[inventory_change(2), inventory_change(2), inventory_change(5)])
        .await;

    assert!(result.is_success());
    let batches = writer.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].mutations.len(), 2);
    for mutation in &batches[0].mutations {
        assert_eq!(mutation.formatting, Some(Formatting::Reset));
        assert_eq!(mutation.note, Some(NoteUpdate::Clear));
    }
}

#[tokio::test(flavor = "current_thread")]
async fn keyed_removals_stay_out_of_the_sheet() {
    let writer = RecordingWriter::default();
    let client = client(writer.clone());
    let removed = CellChange {
        kind: ChangeKind::Removed,
        new_value: None,
        ..change(
            TableKind::Inventory,
            Field::Inventory(InventoryField::ModuleCompany),
            1,
        )
    };

    let result = client.push(&[removed.clone()]).await;
    assert!(result.is_success());
    assert!(result.groups.is_empty());
    assert!(writer.batches().is_empty());

    let result = client.push(&[inventory_change(0), removed.clone()]).await;
    assert_eq!(result.changes_synced(), 1);
    let batches = writer.batches();
    assert_eq!(batches.len(), 1);
    let cells: BTreeSet<String> = batches[0]
        .mutations
        .iter()
        .map(|m| format!("{}:{}", m.start_row, m.start_col))
        .collect();
    assert_eq!(cells, BTreeSet::from(["1:0".to_string()]));

    assert!(client.clear(&[removed]).await.groups.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn truncated_install_rows_are_still_highlighted() {
    let writer = RecordingWriter::default();
    let client = client(writer.clone());
    let removed = CellChange {
        kind: ChangeKind::Removed,
        new_value: None,
        ..install_change(2)
    };

    let result = client.push(&[removed]).await;
    assert_eq!(result.changes_synced(), 1);
    assert_eq!(writer.batches()[0].mutations.len(), 2);
}
