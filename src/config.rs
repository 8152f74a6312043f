//! Startup configuration for the store and the rejection log.
//!
//! The library never reads the environment; callers build a [`LedgerConfig`]
//! (usually from a JSON file) and hand it to the constructors.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LedgerError, LedgerResult};

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_STORE_FILE: &str = "error_records.csv";
const DEFAULT_TABLE_FILE: &str = "error_records.db";
const DEFAULT_REJECTION_LOG_FILE: &str = "rejected_messages.log";
const DEFAULT_BACKUP_DIR: &str = "rejection_backups";

/// Which persistence backend the store gateway opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    FlatFile,
    Table,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FlatFile => "flat_file",
            Self::Table => "table",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub data_dir: PathBuf,
    pub backend: StoreBackend,
    pub store_file: String,
    pub table_file: String,
    pub rejection_log_file: String,
    pub backup_dir: String,
    pub min_message_len: usize,
    pub min_responsible_len: usize,
    pub min_reason_len: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            backend: StoreBackend::default(),
            store_file: DEFAULT_STORE_FILE.to_string(),
            table_file: DEFAULT_TABLE_FILE.to_string(),
            rejection_log_file: DEFAULT_REJECTION_LOG_FILE.to_string(),
            backup_dir: DEFAULT_BACKUP_DIR.to_string(),
            min_message_len: 10,
            min_responsible_len: 3,
            min_reason_len: 5,
        }
    }
}

impl LedgerConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>, backend: StoreBackend) -> Self {
        Self {
            data_dir: data_dir.into(),
            backend,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> LedgerResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| LedgerError::io("read config file", path, e))?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        let names = [
            ("store_file", &self.store_file),
            ("table_file", &self.table_file),
            ("rejection_log_file", &self.rejection_log_file),
            ("backup_dir", &self.backup_dir),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(LedgerError::Config(format!("{field} must not be empty")));
            }
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(LedgerError::Config("data_dir must not be empty".to_string()));
        }
        if self.min_message_len == 0 || self.min_responsible_len == 0 || self.min_reason_len == 0 {
            return Err(LedgerError::Config(
                "length thresholds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the file backing the configured backend.
    pub fn store_path(&self) -> PathBuf {
        match self.backend {
            StoreBackend::FlatFile => self.data_dir.join(&self.store_file),
            StoreBackend::Table => self.data_dir.join(&self.table_file),
        }
    }

    pub fn rejection_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.rejection_log_file)
    }

    pub fn backup_dir_path(&self) -> PathBuf {
        self.data_dir.join(&self.backup_dir)
    }

    pub fn gate_limits(&self) -> crate::report_gate::GateLimits {
        crate::report_gate::GateLimits {
            min_message_len: self.min_message_len,
            min_responsible_len: self.min_responsible_len,
            min_reason_len: self.min_reason_len,
        }
    }
}
