//! Engine configuration: JSON file, `SOLARTRACK_*` environment overrides,
//! validation.

use serde::{Deserialize, Serialize};
use solartrack_model::{CoordinateResolver, SheetLayout, TableKind};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::change_log::ChangeLogConfig;
use crate::diff::DiffOptions;
use crate::error::ConfigError;
use crate::scheduler::SchedulerConfig;
use crate::sheets::DEFAULT_SHEETS_API_BASE;
use crate::sync_client::SyncOptions;

pub const DEFAULT_INVENTORY_URL: &str = "http://127.0.0.1:8003/sheets/data/Sheet1";
pub const DEFAULT_INSTALL_HISTORY_URL: &str = "http://127.0.0.1:8003/sheets/data/Sheet2";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub inventory_url: String,
    pub install_history_url: String,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            inventory_url: DEFAULT_INVENTORY_URL.to_string(),
            install_history_url: DEFAULT_INSTALL_HISTORY_URL.to_string(),
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    pub fn urls(&self) -> Result<BTreeMap<TableKind, Url>, ConfigError> {
        Ok(BTreeMap::from([
            (TableKind::Inventory, parse_url("inventory_url", &self.inventory_url)?),
            (
                TableKind::InstallHistory,
                parse_url("install_history_url", &self.install_history_url)?,
            ),
        ]))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// Empty disables writing highlights.
    pub spreadsheet_id: String,
    pub api_base: String,
    /// Bearer token for the Sheets API. Never written back out.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            api_base: DEFAULT_SHEETS_API_BASE.to_string(),
            access_token: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub scheduler: SchedulerConfig,
    pub change_log: ChangeLogConfig,
    pub diff: DiffOptions,
    pub sync: SyncOptions,
    pub provider: ProviderConfig,
    pub sheets: SheetsConfig,
    /// SQLite file for the persisted change log; in-memory when unset.
    pub database_path: Option<PathBuf>,
    pub layouts: Vec<SheetLayout>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            change_log: ChangeLogConfig::default(),
            diff: DiffOptions::default(),
            sync: SyncOptions::default(),
            provider: ProviderConfig::default(),
            sheets: SheetsConfig::default(),
            database_path: None,
            layouts: TableKind::ALL
                .into_iter()
                .map(SheetLayout::default_for)
                .collect(),
        }
    }
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Apply `SOLARTRACK_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(value) = var("SOLARTRACK_POLL_INTERVAL_SECS") {
            self.scheduler.poll_interval_secs =
                value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    name: "SOLARTRACK_POLL_INTERVAL_SECS",
                    value,
                })?;
        }
        if let Some(value) = var("SOLARTRACK_AUTO_SYNC") {
            self.scheduler.auto_sync = env_flag("SOLARTRACK_AUTO_SYNC", value)?;
        }
        if let Some(value) = var("SOLARTRACK_INVENTORY_URL") {
            self.provider.inventory_url = value;
        }
        if let Some(value) = var("SOLARTRACK_INSTALL_HISTORY_URL") {
            self.provider.install_history_url = value;
        }
        if let Some(value) = var("SOLARTRACK_SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = value;
        }
        if let Some(value) = var("SOLARTRACK_SHEETS_TOKEN") {
            self.sheets.access_token = Some(value);
        }
        if let Some(value) = var("SOLARTRACK_DASHBOARD_URL") {
            self.sync.dashboard_url = Some(value);
        }
        if let Some(value) = var("SOLARTRACK_SYNC_MODE") {
            self.sync.mode = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "SOLARTRACK_SYNC_MODE",
                value,
            })?;
        }
        if let Some(value) = var("SOLARTRACK_DB_PATH") {
            self.database_path = Some(PathBuf::from(value));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.change_log.capacity == 0 {
            return Err(ConfigError::Invalid(
                "change_log.capacity must be greater than zero".to_string(),
            ));
        }
        self.provider.urls()?;
        if let Some(dashboard) = &self.sync.dashboard_url {
            parse_url("sync.dashboard_url", dashboard)?;
        }
        if self.sheets_enabled() {
            parse_url("sheets.api_base", &self.sheets.api_base)?;
        }
        for table in TableKind::ALL {
            let count = self.layouts.iter().filter(|l| l.table == table).count();
            if count != 1 {
                return Err(ConfigError::Invalid(format!(
                    "expected exactly one layout for {table}, found {count}"
                )));
            }
        }
        for layout in &self.layouts {
            layout.validate_complete()?;
        }
        Ok(())
    }

    pub fn sheets_enabled(&self) -> bool {
        !self.sheets.spreadsheet_id.trim().is_empty()
    }

    pub fn resolver(&self) -> CoordinateResolver {
        CoordinateResolver::new(self.layouts.iter().cloned())
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })
}

fn env_flag(name: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::sync_client::HighlightMode;
    use solartrack_model::LayoutError;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = SyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 300);
        assert_eq!(config.change_log.capacity, 50);
        assert_eq!(config.change_log.coalesce_window_ms, 1000);
        assert!(config.diff.detect_removed_rows);
        assert!(!config.sheets_enabled());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SyncConfig::from_json(
            r#"{ "scheduler": { "poll_interval_secs": 20 }, "sheets": { "spreadsheet_id": "abc" } }"#,
        )
        .unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 20);
        assert!(config.scheduler.auto_sync);
        assert!(config.sheets_enabled());
        assert_eq!(config.layouts.len(), 2);
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SOLARTRACK_POLL_INTERVAL_SECS", "20"),
            ("SOLARTRACK_AUTO_SYNC", "off"),
            ("SOLARTRACK_SHEETS_TOKEN", "secret"),
            ("SOLARTRACK_DASHBOARD_URL", "http://localhost:3001"),
            ("SOLARTRACK_SYNC_MODE", "comment"),
            ("SOLARTRACK_DB_PATH", ""),
        ]);
        let mut config = SyncConfig::default();
        config
            .apply_env_with(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 20);
        assert!(!config.scheduler.auto_sync);
        assert_eq!(config.sheets.access_token.as_deref(), Some("secret"));
        assert_eq!(config.sync.dashboard_url.as_deref(), Some("http://localhost:3001"));
        assert_eq!(config.sync.mode, HighlightMode::Comment);
        assert_eq!(config.database_path, None);

        let token_json = serde_json::to_string(&config).unwrap();
        assert!(!token_json.contains("secret"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = SyncConfig::default();
        let err = config
            .apply_env_with(|name| (name == "SOLARTRACK_POLL_INTERVAL_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));

        let mut config = SyncConfig::default();
        config.scheduler.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.provider.inventory_url = "not a url".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { field: "inventory_url", .. })));

        let mut config = SyncConfig::default();
        config.layouts.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn layouts_must_map_every_tracked_field() {
        let config = SyncConfig::from_json(
            r#"{ "layouts": [
                { "table": "inventory", "sheet_name": "Sheet1", "sheet_id": 515566561,
                  "columns": { "modules_count": "A", "module_company": "B" } },
                { "table": "install_history", "sheet_name": "Sheet2", "sheet_id": 390609277,
                  "columns": { "date": "A", "customer": "B", "system_size": "C",
                               "panels": "D", "inverter": "E", "status": "F" } }
            ] }"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Layout(LayoutError::MissingField {
                table: TableKind::Inventory,
                ..
            })
        ));
    }
}
