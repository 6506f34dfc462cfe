use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::chart::ChartMode;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "bp-tracker.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// Where readings are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Google Sheets spreadsheet, `store_id` is the spreadsheet key
    Sheets,
    /// Local CSV file, `store_id` is the file path
    Csv,
    /// In-process only, lost on exit
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sheets" => Ok(StoreBackend::Sheets),
            "csv" => Ok(StoreBackend::Csv),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

/// Application configuration, passed explicitly to the store factory and
/// the web layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: StoreBackend,

    /// Spreadsheet key for `sheets`, file path for `csv`
    pub store_id: String,

    /// Service-account key file used by the `sheets` backend
    pub credentials_path: PathBuf,

    pub chart_mode: ChartMode,

    /// Address the web server listens on
    pub bind_addr: String,

    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sheets,
            store_id: String::new(),
            credentials_path: PathBuf::from("credentials.json"),
            chart_mode: ChartMode::Interactive,
            bind_addr: "127.0.0.1:3000".to_string(),
            chart_width: 900,
            chart_height: 500,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from [`DEFAULT_CONFIG_FILE`] if it
    /// exists, then applies `BP_TRACKER_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Applies overrides looked up by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let invalid = |key: &str, value: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        if let Some(value) = lookup("BP_TRACKER_BACKEND") {
            self.backend = value
                .parse()
                .map_err(|_| invalid("BP_TRACKER_BACKEND", &value))?;
        }
        if let Some(value) = lookup("BP_TRACKER_STORE_ID") {
            self.store_id = value;
        }
        if let Some(value) = lookup("BP_TRACKER_CREDENTIALS") {
            self.credentials_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("BP_TRACKER_CHART") {
            self.chart_mode = value
                .parse()
                .map_err(|_| invalid("BP_TRACKER_CHART", &value))?;
        }
        if let Some(value) = lookup("BP_TRACKER_BIND") {
            self.bind_addr = value;
        }
        Ok(())
    }
}
