use clap::Parser;
use pretty_assertions::assert_eq;
use solartrack_cli::cli::{diff_files, print_log, run_with_args, Args, OutputFormat};
use solartrack_model::{ChangeAction, CoordinateResolver, TableKind};
use solartrack_sync::{ChangeLogConfig, DiffOptions, SqliteKvStore, SyncEngine};
use std::sync::Arc;

fn write_json(dir: &tempfile::TempDir, name: &str, json: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, json).expect("write fixture");
    path
}

#[test]
fn diff_reports_count_change_and_removal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let previous = write_json(
        &dir,
        "previous.json",
        r#"{"success": true, "data": [
            {"No. Of Modules": 11, "Module Company": "Hanwa Qcell"},
            {"No. Of Modules": 30, "Module Company": "Maxeon 7 Series"}
        ]}"#,
    );
    let current = write_json(
        &dir,
        "current.json",
        r#"[{"No. Of Modules": "15", "Module Company": "Hanwa Qcell"}]"#,
    );

    let mut out = Vec::new();
    diff_files(
        TableKind::Inventory,
        &previous,
        &current,
        OutputFormat::Text,
        true,
        &mut out,
    )
    .unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "2 changes in Inventory\n\
         \x20 modified A2: No. Of Modules changed from \"11\" to \"15\"\n\
         \x20 removed  B3: Module Company changed from \"Maxeon 7 Series\" to \"null\"\n"
    );

    let mut out = Vec::new();
    diff_files(
        TableKind::Inventory,
        &previous,
        &current,
        OutputFormat::Json,
        false,
        &mut out,
    )
    .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let changes = json.as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["cellRef"], "A2");
    assert_eq!(changes[0]["field"], "modules_count");
    assert_eq!(changes[0]["oldValue"], 11.0);
    assert_eq!(changes[0]["newValue"], 15.0);
}

#[test]
fn log_lists_unread_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("changes.sqlite");
    {
        let store = Arc::new(SqliteKvStore::open_path(&path).unwrap());
        let mut engine = SyncEngine::new(
            CoordinateResolver::default(),
            DiffOptions::default(),
            ChangeLogConfig::default(),
        )
        .with_store(store);
        let first = engine
            .record_lifecycle(ChangeAction::System, "Starting data refresh...")
            .unwrap();
        engine.record_lifecycle(ChangeAction::Error, "Failed to refresh data: timeout");
        engine.mark_read(&first.id);
    }

    let mut out = Vec::new();
    print_log(&path, true, OutputFormat::Text, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Change log: 2 entries, 1 unread");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("* "));
    assert!(lines[1].ends_with("[Error] System: Failed to refresh data: timeout"));
}

#[tokio::test]
async fn cell_ref_and_parse_cell() {
    let mut out = Vec::new();
    let args = Args::try_parse_from(["solartrack", "cell-ref", "inventory", "0", "No. Of Modules"]).unwrap();
    run_with_args(args, &mut out).await.unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "A2\n");

    let mut out = Vec::new();
    let args = Args::try_parse_from(["solartrack", "parse-cell", "$F$7"]).unwrap();
    run_with_args(args, &mut out).await.unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "F7: row 7 (index 6), column F (index 5)\n\
         \x20 Inventory: row index 5, Battery Company\n\
         \x20 Install History: row index 5, Status\n"
    );

    let args = Args::try_parse_from(["solartrack", "parse-cell", "7F"]).unwrap();
    assert!(run_with_args(args, &mut Vec::new()).await.is_err());
}
