//! Table data providers.

use chrono::Utc;
use serde_json::Value as JsonValue;
use solartrack_model::{snapshot_from_json, TableKind, TableSnapshot};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::error::FetchError;

/// Delivers complete, normalized snapshots of a table.
pub trait TableSource: Send + Sync {
    fn fetch(&self, table: TableKind) -> impl Future<Output = Result<TableSnapshot, FetchError>> + Send;
}

/// Fetches each table with a plain `GET` returning a JSON row array or a
/// `{ "success": .., "data": [..] }` envelope.
#[derive(Debug, Clone)]
pub struct HttpTableSource {
    client: reqwest::Client,
    urls: BTreeMap<TableKind, Url>,
}

impl HttpTableSource {
    pub fn new(urls: BTreeMap<TableKind, Url>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, urls })
    }

    pub fn url(&self, table: TableKind) -> Option<&Url> {
        self.urls.get(&table)
    }
}

impl TableSource for HttpTableSource {
    async fn fetch(&self, table: TableKind) -> Result<TableSnapshot, FetchError> {
        let url = self.urls.get(&table).ok_or_else(|| FetchError::Unavailable {
            table,
            reason: "no provider url configured".to_string(),
        })?;
        let transport = |source| FetchError::Transport {
            table,
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let payload: JsonValue = response.json().await.map_err(transport)?;
        let snapshot = snapshot_from_json(table, &payload, Utc::now())?;
        log::debug!("fetched {} rows of {table}", snapshot.len());
        Ok(snapshot)
    }
}
