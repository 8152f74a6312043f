//! Backend-agnostic gateway over persisted error records.

use serde::Serialize;
use std::path::Path;

use crate::config::{LedgerConfig, StoreBackend};
use crate::error::LedgerResult;
use crate::flat_file_store::FlatFileStore;
use crate::report_model::ErrorRecord;
use crate::table_store::TableStore;

/// Append-only record persistence. Records are never updated or deleted, and
/// `list` returns them in insertion order.
pub trait RecordStore {
    fn backend(&self) -> StoreBackend;

    fn path(&self) -> &Path;

    fn save(&self, record: &ErrorRecord) -> LedgerResult<()> {
        self.save_all(std::slice::from_ref(record))
    }

    /// Appends every record or none of them.
    fn save_all(&self, records: &[ErrorRecord]) -> LedgerResult<()>;

    fn list(&self) -> LedgerResult<Vec<ErrorRecord>>;

    fn count(&self) -> LedgerResult<usize> {
        Ok(self.list()?.len())
    }

    fn status(&self) -> LedgerResult<StoreStatus>;
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub backend: &'static str,
    pub path: String,
    pub exists: bool,
    pub record_count: usize,
    pub applied_migrations: Vec<String>,
    pub pending_migrations: Vec<String>,
}

/// Opens the backend selected by `cfg.backend`, creating its storage when
/// absent.
pub fn open_store(cfg: &LedgerConfig) -> LedgerResult<Box<dyn RecordStore>> {
    let path = cfg.store_path();
    tracing::debug!(backend = cfg.backend.as_str(), path = %path.display(), "opening record store");
    Ok(match cfg.backend {
        StoreBackend::FlatFile => Box::new(FlatFileStore::open(path)?),
        StoreBackend::Table => Box::new(TableStore::open(path)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_model::{RecordOrigin, RecordTemplate};
    use uuid::Uuid;

    fn temp_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "error_ledger_record_store_test_{}_{}",
            std::process::id(),
            Uuid::new_v4()
        ))
    }

    fn record(responsible: &str) -> ErrorRecord {
        ErrorRecord {
            responsible: responsible.to_string(),
            account: None,
            marketplace: None,
            sale_id: None,
            sku: None,
            reason: "Faltou 3 peças".to_string(),
            cost_text: None,
            cost_total: None,
            template: RecordTemplate::Basic,
            recorded_at: "2026-03-04T10:00:00-03:00".to_string(),
            origin: RecordOrigin::Live,
        }
    }

    #[test]
    fn both_backends_satisfy_the_gateway_contract() {
        for backend in [StoreBackend::FlatFile, StoreBackend::Table] {
            let dir = temp_dir();
            let cfg = LedgerConfig::with_data_dir(&dir, backend);
            let store = open_store(&cfg).expect("open store");
            assert_eq!(store.backend(), backend);
            assert_eq!(store.count().expect("count"), 0);

            store.save(&record("Montagem")).expect("save");
            store
                .save_all(&[record("Corte"), record("Expedição")])
                .expect("save all");

            let names = store
                .list()
                .expect("list")
                .into_iter()
                .map(|r| r.responsible)
                .collect::<Vec<_>>();
            assert_eq!(names, vec!["Montagem", "Corte", "Expedição"]);

            let status = store.status().expect("status");
            assert!(status.exists);
            assert_eq!(status.record_count, 3);
            assert!(status.pending_migrations.is_empty());
            let _ = std::fs::remove_dir_all(&dir);
        }
    }
}
