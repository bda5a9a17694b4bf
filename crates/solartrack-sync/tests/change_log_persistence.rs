use rusqlite::{Connection, OpenFlags};
use solartrack_model::{ChangeAction, CoordinateResolver};
use solartrack_sync::persist::{load_change_log, save_change_log};
use solartrack_sync::{
    ChangeLogConfig, DiffOptions, KeyValueStore, SqliteKvStore, SyncEngine, CHANGE_LOG_KEY,
};
use std::sync::Arc;

fn engine() -> SyncEngine {
    SyncEngine::new(
        CoordinateResolver::default(),
        DiffOptions::default(),
        ChangeLogConfig::default(),
    )
}

#[test]
fn log_survives_reopening_the_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("changes.sqlite");

    {
        let store = Arc::new(SqliteKvStore::open_path(&path).expect("open store"));
        let mut engine = engine().with_store(store);
        engine.record_lifecycle(ChangeAction::System, "Starting data refresh...");
        engine.record_lifecycle(ChangeAction::System, "Data refreshed successfully");
        let newest = engine.entries()[0].id.clone();
        assert!(engine.mark_read(&newest));
    }

    let store = Arc::new(SqliteKvStore::open_path(&path).expect("reopen store"));
    let engine = engine().with_store(store);
    let entries = engine.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].summary, "Data refreshed successfully");
    assert!(entries[0].read);
    assert_eq!(engine.unread_count(), 1);
}

#[test]
fn corrupt_row_loads_as_empty_log() {
    let uri = "file:change_log_corrupt?mode=memory&cache=shared";
    let store = SqliteKvStore::open_uri(uri).expect("open store");
    save_change_log(&store, &[]).expect("seed value");

    let flags =
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_URI;
    let conn = Connection::open_with_flags(uri, flags).expect("open raw connection");
    conn.execute(
        "UPDATE kv_store SET value = '[{\"id\":' WHERE key = ?1",
        rusqlite::params![CHANGE_LOG_KEY],
    )
    .expect("corrupt value");

    assert!(load_change_log(&store).is_empty());

    let engine = engine().with_store(Arc::new(store));
    assert!(engine.entries().is_empty());
}

#[test]
fn missing_key_is_an_empty_log() {
    let store = SqliteKvStore::open_in_memory().expect("open store");
    assert_eq!(store.get(CHANGE_LOG_KEY).expect("get"), None);
    assert!(load_change_log(&store).is_empty());
}
