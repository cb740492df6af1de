//! Configuration for AppMine tools.
//!
//! [`NodeConfig`] carries defaults for the data directory, logging and the
//! ledger API. [`NodeConfig::load`] layers an optional TOML file and
//! `APPMINE_*` environment variables on top of those defaults; nested keys
//! use `__`, e.g. `APPMINE_LEDGER__TIMEOUT_SECS=30`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use appmine_core::constants::{
    DEFAULT_EXPLORER_URL, DEFAULT_LEDGER_API, DEFAULT_LEDGER_OUTPUT_LIMIT,
};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "APPMINE";

/// Settings for the public ledger API used during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Raw-transaction endpoint; the transaction id is appended as a path segment.
    pub api_base: String,
    /// Human-facing transaction page, used for links in reports.
    pub explorer_url: String,
    pub timeout_secs: u64,
    /// Maximum number of outputs requested per transaction.
    pub output_limit: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_LEDGER_API.to_string(),
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
            timeout_secs: 10,
            output_limit: DEFAULT_LEDGER_OUTPUT_LIMIT,
        }
    }
}

impl LedgerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Explorer link for a transaction.
    pub fn transaction_url(&self, transaction_id: &str) -> String {
        format!("{}/{}", self.explorer_url.trim_end_matches('/'), transaction_id)
    }
}

/// Configuration shared by the AppMine binaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "debug", "appmine_score=trace").
    pub log_level: String,
    /// Log output format, "text" or "json".
    pub log_format: String,
    pub ledger: LedgerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("appmine");

        Self {
            data_dir,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults, then the file at `path` (if given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Path to the RocksDB store directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}
