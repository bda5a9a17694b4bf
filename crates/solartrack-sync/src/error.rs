use solartrack_model::{LayoutError, NormalizeError, TableKind};
use thiserror::Error;

/// The table data provider could not deliver a snapshot.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {table} to {url} failed: {source}")]
    Transport {
        table: TableKind,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error(transparent)]
    Payload(#[from] NormalizeError),
    #[error("{table} source unavailable: {reason}")]
    Unavailable { table: TableKind, reason: String },
}

/// A batched write to the external spreadsheet failed.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("sheets request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("sheets API responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("sheets API rejected the batch: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("environment variable {name} has invalid value `{value}`")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid {field} url `{value}`: {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}
