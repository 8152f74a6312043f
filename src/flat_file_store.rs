use csv::{ReaderBuilder, WriterBuilder};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::StoreBackend;
use crate::error::{LedgerError, LedgerResult};
use crate::record_store::{RecordStore, StoreStatus};
use crate::report_model::{ErrorRecord, Marketplace, RecordOrigin, RecordTemplate};

pub const STORE_HEADERS: &[&str] = &[
    "responsible",
    "account",
    "marketplace",
    "sale_id",
    "sku",
    "reason",
    "cost_text",
    "cost_total",
    "template",
    "recorded_at",
    "origin",
];

/// Records kept as rows of a single CSV file with a fixed header.
#[derive(Debug, Clone)]
pub struct FlatFileStore {
    path: PathBuf,
}

impl FlatFileStore {
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let store = Self { path: path.into() };
        ensure_csv_file_with_headers(&store.path)?;
        Ok(store)
    }
}

fn opt_cell(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn record_to_row(record: &ErrorRecord) -> Vec<String> {
    vec![
        record.responsible.clone(),
        opt_cell(&record.account),
        record
            .marketplace
            .map(|m| m.label().to_string())
            .unwrap_or_default(),
        opt_cell(&record.sale_id),
        opt_cell(&record.sku),
        record.reason.clone(),
        opt_cell(&record.cost_text),
        opt_cell(&record.cost_total),
        record.template.as_str().to_string(),
        record.recorded_at.clone(),
        record.origin.as_str().to_string(),
    ]
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn row_to_record(row: &csv::StringRecord) -> Option<ErrorRecord> {
    let cell = |idx: usize| row.get(idx).unwrap_or_default();
    Some(ErrorRecord {
        responsible: non_empty(cell(0))?,
        account: non_empty(cell(1)),
        marketplace: non_empty(cell(2)).and_then(|v| Marketplace::from_label(&v)),
        sale_id: non_empty(cell(3)),
        sku: non_empty(cell(4)),
        reason: non_empty(cell(5))?,
        cost_text: non_empty(cell(6)),
        cost_total: non_empty(cell(7)),
        template: RecordTemplate::from_str_lossy(cell(8)),
        recorded_at: cell(9).trim().to_string(),
        origin: RecordOrigin::from_str_lossy(cell(10)),
    })
}

fn ensure_csv_file_with_headers(path: &Path) -> LedgerResult<()> {
    if path.exists() {
        return Ok(());
    }
    write_csv_rows(path, &[])
}

fn read_csv_records(path: &Path) -> LedgerResult<Vec<ErrorRecord>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(LedgerError::csv("open store file", path))?;
    let headers = reader
        .headers()
        .map_err(LedgerError::csv("read store header", path))?;
    if headers.iter().collect::<Vec<_>>() != STORE_HEADERS {
        return Err(LedgerError::StoreSchema(format!(
            "unexpected header in {}",
            path.display()
        )));
    }

    let mut records = Vec::new();
    for (idx, rec) in reader.records().enumerate() {
        let row = rec.map_err(LedgerError::csv("parse store row", path))?;
        if row.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        match row_to_record(&row) {
            Some(record) => records.push(record),
            None => tracing::warn!(row = idx + 1, path = %path.display(), "skipping store row without responsible/reason"),
        }
    }
    Ok(records)
}

/// Rewrites the whole file through a sibling temp file so a failed write
/// never leaves a half-written store behind.
fn write_csv_rows(path: &Path, records: &[ErrorRecord]) -> LedgerResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| LedgerError::io("create store dir", parent, e))?;
    }
    let tmp_path = path.with_extension("csv.tmp");
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(&tmp_path)
        .map_err(LedgerError::csv("open store temp file", &tmp_path))?;
    writer
        .write_record(STORE_HEADERS)
        .map_err(LedgerError::csv("write store header", &tmp_path))?;
    for record in records {
        writer
            .write_record(record_to_row(record))
            .map_err(LedgerError::csv("write store row", &tmp_path))?;
    }
    writer
        .flush()
        .map_err(|e| LedgerError::io("flush store temp file", &tmp_path, e))?;
    drop(writer);
    fs::rename(&tmp_path, path).map_err(|e| LedgerError::io("replace store file", path, e))
}

impl RecordStore for FlatFileStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::FlatFile
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn save_all(&self, records: &[ErrorRecord]) -> LedgerResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        ensure_csv_file_with_headers(&self.path)?;
        let mut rows = read_csv_records(&self.path)?;
        rows.extend_from_slice(records);
        write_csv_rows(&self.path, &rows)
    }

    fn list(&self) -> LedgerResult<Vec<ErrorRecord>> {
        ensure_csv_file_with_headers(&self.path)?;
        read_csv_records(&self.path)
    }

    fn status(&self) -> LedgerResult<StoreStatus> {
        let exists = self.path.exists();
        let record_count = if exists {
            read_csv_records(&self.path)?.len()
        } else {
            0
        };
        Ok(StoreStatus {
            backend: StoreBackend::FlatFile.as_str(),
            path: self.path.to_string_lossy().to_string(),
            exists,
            record_count,
            applied_migrations: Vec::new(),
            pending_migrations: Vec::new(),
        })
    }
}
