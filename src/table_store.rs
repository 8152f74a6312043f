use rusqlite::{params, Connection, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::StoreBackend;
use crate::error::{LedgerError, LedgerResult};
use crate::record_store::{RecordStore, StoreStatus};
use crate::report_model::{ErrorRecord, Marketplace, RecordOrigin, RecordTemplate};

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_error_records.sql",
        include_str!("../migrations/0001_error_records.sql"),
    ),
];

const SELECT_RECORDS_SQL: &str = "SELECT responsible, account, marketplace, sale_id, sku, reason, \
     cost_text, cost_total, template, recorded_at, origin \
     FROM error_records ORDER BY id ASC";

const INSERT_RECORD_SQL: &str = "INSERT INTO error_records (\
     responsible, account, marketplace, sale_id, sku, reason, \
     cost_text, cost_total, template, recorded_at, origin\
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

/// Records kept in the `error_records` table of a SQLite database.
#[derive(Debug, Clone)]
pub struct TableStore {
    db_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MigrateResult {
    pub created: bool,
    pub applied_now: Vec<String>,
    pub skipped: Vec<String>,
}

impl TableStore {
    pub fn open(db_path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let store = Self {
            db_path: db_path.into(),
        };
        let result = apply_embedded_migrations(&store.db_path)?;
        if !result.applied_now.is_empty() {
            tracing::info!(
                path = %store.db_path.display(),
                created = result.created,
                applied = ?result.applied_now,
                skipped = result.skipped.len(),
                "record table migrated"
            );
        }
        Ok(store)
    }

    fn connect(&self) -> LedgerResult<Connection> {
        Connection::open(&self.db_path).map_err(LedgerError::sqlite("open database"))
    }
}

fn ensure_schema_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
}

fn has_schema_migrations_table(conn: &Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations')",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map(|v| v != 0)
}

fn load_applied_versions(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

fn apply_embedded_migrations(db_path: &Path) -> LedgerResult<MigrateResult> {
    let created = !db_path.exists();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| LedgerError::io("create database dir", parent, e))?;
    }

    let mut conn = Connection::open(db_path).map_err(LedgerError::sqlite("open database"))?;
    ensure_schema_migrations_table(&conn)
        .map_err(LedgerError::sqlite("create schema_migrations"))?;
    let already = load_applied_versions(&conn)
        .map_err(LedgerError::sqlite("load applied migrations"))?
        .into_iter()
        .collect::<HashSet<_>>();

    let mut applied_now = Vec::new();
    let mut skipped = Vec::new();
    for (version, sql) in MIGRATIONS {
        if already.contains(*version) {
            skipped.push((*version).to_string());
            continue;
        }
        let tx = conn
            .transaction()
            .map_err(LedgerError::sqlite("begin migration"))?;
        tx.execute_batch(sql)
            .map_err(LedgerError::sqlite("run migration"))?;
        tx.execute(
            "INSERT INTO schema_migrations(version) VALUES (?1)",
            [*version],
        )
        .map_err(LedgerError::sqlite("record migration"))?;
        tx.commit().map_err(LedgerError::sqlite("commit migration"))?;
        applied_now.push((*version).to_string());
    }

    Ok(MigrateResult {
        created,
        applied_now,
        skipped,
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ErrorRecord> {
    let marketplace = row.get::<_, Option<String>>(2)?;
    let template = row.get::<_, String>(8)?;
    let origin = row.get::<_, String>(10)?;
    Ok(ErrorRecord {
        responsible: row.get(0)?,
        account: row.get(1)?,
        marketplace: marketplace.as_deref().and_then(Marketplace::from_label),
        sale_id: row.get(3)?,
        sku: row.get(4)?,
        reason: row.get(5)?,
        cost_text: row.get(6)?,
        cost_total: row.get(7)?,
        template: RecordTemplate::from_str_lossy(&template),
        recorded_at: row.get(9)?,
        origin: RecordOrigin::from_str_lossy(&origin),
    })
}

impl RecordStore for TableStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Table
    }

    fn path(&self) -> &Path {
        &self.db_path
    }

    fn save_all(&self, records: &[ErrorRecord]) -> LedgerResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .map_err(LedgerError::sqlite("begin insert"))?;
        {
            let mut stmt = tx
                .prepare(INSERT_RECORD_SQL)
                .map_err(LedgerError::sqlite("prepare insert"))?;
            for record in records {
                stmt.execute(params![
                    record.responsible,
                    record.account,
                    record.marketplace.map(Marketplace::label),
                    record.sale_id,
                    record.sku,
                    record.reason,
                    record.cost_text,
                    record.cost_total,
                    record.template.as_str(),
                    record.recorded_at,
                    record.origin.as_str(),
                ])
                .map_err(LedgerError::sqlite("insert record"))?;
            }
        }
        tx.commit().map_err(LedgerError::sqlite("commit insert"))
    }

    fn list(&self) -> LedgerResult<Vec<ErrorRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(SELECT_RECORDS_SQL)
            .map_err(LedgerError::sqlite("prepare select"))?;
        let rows = stmt
            .query_map([], row_to_record)
            .map_err(LedgerError::sqlite("select records"))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(LedgerError::sqlite("read record row"))?);
        }
        Ok(records)
    }

    fn count(&self) -> LedgerResult<usize> {
        let conn = self.connect()?;
        let total = conn
            .query_row("SELECT COUNT(*) FROM error_records", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(LedgerError::sqlite("count records"))?;
        Ok(usize::try_from(total).unwrap_or_default())
    }

    fn status(&self) -> LedgerResult<StoreStatus> {
        let migration_files = MIGRATIONS
            .iter()
            .map(|(v, _)| (*v).to_string())
            .collect::<Vec<_>>();
        let path = self.db_path.to_string_lossy().to_string();
        if !self.db_path.exists() {
            return Ok(StoreStatus {
                backend: StoreBackend::Table.as_str(),
                path,
                exists: false,
                record_count: 0,
                applied_migrations: Vec::new(),
                pending_migrations: migration_files,
            });
        }

        let conn = self.connect()?;
        let applied = if has_schema_migrations_table(&conn)
            .map_err(LedgerError::sqlite("inspect schema_migrations"))?
        {
            load_applied_versions(&conn).map_err(LedgerError::sqlite("load applied migrations"))?
        } else {
            Vec::new()
        };
        let applied_set = applied.iter().cloned().collect::<HashSet<_>>();
        let pending = migration_files
            .into_iter()
            .filter(|v| !applied_set.contains(v))
            .collect::<Vec<_>>();
        let record_count = if pending.is_empty() { self.count()? } else { 0 };

        Ok(StoreStatus {
            backend: StoreBackend::Table.as_str(),
            path,
            exists: true,
            record_count,
            applied_migrations: applied,
            pending_migrations: pending,
        })
    }
}
