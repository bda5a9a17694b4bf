//! Snapshot diffing and spreadsheet sync engine.
//!
//! A [`PollScheduler`] periodically fetches both tracked tables from a
//! [`TableSource`], diffs each table against the generation held in the
//! [`SnapshotStore`], swaps the new snapshots in, records the cell changes in a bounded
//! [`ChangeLog`] and optionally pushes highlights through a [`SyncClient`].

pub mod change_log;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod events;
pub mod persist;
pub mod scheduler;
pub mod sheets;
pub mod snapshot;
pub mod source;
pub mod sync_client;

pub use change_log::{ChangeLog, ChangeLogConfig};
pub use config::SyncConfig;
pub use diff::{DiffError, DiffOptions, Differ};
pub use engine::{lock_engine, SharedEngine, SyncEngine};
pub use error::{ConfigError, FetchError, PersistenceError, WriteError};
pub use events::{EventHub, PollState, PollStatus};
pub use persist::{KeyValueStore, MemoryKvStore, SqliteKvStore, CHANGE_LOG_KEY};
pub use scheduler::{PollScheduler, SchedulerConfig, TriggerOutcome};
pub use sheets::{BatchUpdate, CellMutation, GoogleSheetsWriter, SheetWriter};
pub use snapshot::SnapshotStore;
pub use source::{HttpTableSource, TableSource};
pub use sync_client::{GroupOutcome, HighlightMode, SyncClient, SyncOptions, SyncResult};
