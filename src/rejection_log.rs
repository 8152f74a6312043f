//! Append-only log of raw messages that failed the admission gate.
//!
//! Each entry is a header line `--- <RFC 3339 timestamp> ---` followed by the
//! raw text. Entries are not addressable; the log is read back as a whole and
//! split on the header pattern.

use chrono::{DateTime, Local, SecondsFormat};
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};

const BACKUP_FILE_PREFIX: &str = "rejected_messages_";
const BACKUP_FILE_EXTENSION: &str = "log";

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^--- \d{4}-\d{2}-\d{2}T\S* ---[ \t]*\r?$").expect("invalid header regex")
    })
}

/// Splits raw log content into entry bodies. Text before the first header is
/// kept as a block of its own; whitespace-only blocks are dropped.
pub fn split_blocks(content: &str) -> Vec<String> {
    header_re()
        .split(content)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct RejectionLog {
    path: PathBuf,
    backup_dir: PathBuf,
}

impl RejectionLog {
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn from_config(cfg: &LedgerConfig) -> Self {
        Self::new(cfg.rejection_log_path(), cfg.backup_dir_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn append(&self, raw_text: &str) -> LedgerResult<()> {
        self.append_at(raw_text, Local::now())
    }

    pub fn append_at(&self, raw_text: &str, at: DateTime<Local>) -> LedgerResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LedgerError::io("create rejection log dir", parent, e))?;
        }
        // A header-shaped line in the message would split it on read.
        let body = header_re().replace_all(raw_text, " $0");
        let entry = format!(
            "\n--- {} ---\n{}\n",
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
            body
        );
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LedgerError::io("open rejection log", &self.path, e))?;
        file.write_all(entry.as_bytes())
            .map_err(|e| LedgerError::io("append rejection log", &self.path, e))
    }

    /// Whole log content, or `None` when the log was never written.
    pub fn read_all(&self) -> LedgerResult<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&self.path)
            .map(Some)
            .map_err(|e| LedgerError::io("read rejection log", &self.path, e))
    }

    pub fn read_blocks(&self) -> LedgerResult<Vec<String>> {
        Ok(self
            .read_all()?
            .map(|content| split_blocks(&content))
            .unwrap_or_default())
    }

    /// Copies the current log, unmodified, into the backup directory.
    pub fn backup(&self) -> LedgerResult<PathBuf> {
        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| LedgerError::io("create backup dir", &self.backup_dir, e))?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S%.3f").to_string();
        let suffix = Uuid::new_v4().simple().to_string();
        let target = self.backup_dir.join(format!(
            "{BACKUP_FILE_PREFIX}{stamp}_{}.{BACKUP_FILE_EXTENSION}",
            &suffix[..8]
        ));
        fs::copy(&self.path, &target)
            .map_err(|e| LedgerError::io("copy rejection log to backup", &target, e))?;
        Ok(target)
    }

    pub fn truncate(&self) -> LedgerResult<()> {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map(|_| ())
            .map_err(|e| LedgerError::io("truncate rejection log", &self.path, e))
    }

    /// Backup files, oldest first.
    pub fn list_backups(&self) -> LedgerResult<Vec<PathBuf>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.backup_dir)
            .map_err(|e| LedgerError::io("list backup dir", &self.backup_dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| LedgerError::io("read backup dir entry", &self.backup_dir, e))?
                .path();
            let is_backup = path.is_file()
                && path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .is_some_and(|name| {
                        name.starts_with(BACKUP_FILE_PREFIX)
                            && name.ends_with(&format!(".{BACKUP_FILE_EXTENSION}"))
                    });
            if is_backup {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
