//! Re-parsing of the rejection log and merging of recovered records.
//!
//! `recover` alone is a dry run: it never touches the store, the log or the
//! backup directory. `merge_recovered` is the only path that does.

use chrono::Local;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::LedgerResult;
use crate::record_store::RecordStore;
use crate::rejection_log::RejectionLog;
use crate::report_gate::{parse_report, GateLimits};
use crate::report_model::{ErrorRecord, RecordOrigin};

#[derive(Debug, Clone, Default)]
pub struct RecoveryOutcome {
    pub records: Vec<ErrorRecord>,
    pub total_blocks: usize,
    pub failed_blocks: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub merged: usize,
    pub backup_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoverySummary {
    pub total_blocks: usize,
    pub recovered_count: usize,
    pub failed_count: usize,
    pub by_responsible: BTreeMap<String, usize>,
    pub backup_path: Option<String>,
}

/// Runs every logged block through the same gate as live ingestion.
pub fn recover(log: &RejectionLog, limits: &GateLimits) -> LedgerResult<RecoveryOutcome> {
    let blocks = log.read_blocks()?;
    let recorded_at = Local::now();
    let mut outcome = RecoveryOutcome {
        total_blocks: blocks.len(),
        ..RecoveryOutcome::default()
    };
    for block in &blocks {
        let record = parse_report(block, limits)
            .ok()
            .and_then(|c| ErrorRecord::from_candidate(c, RecordOrigin::Recovered, recorded_at));
        match record {
            Some(record) => outcome.records.push(record),
            None => outcome.failed_blocks += 1,
        }
    }
    tracing::debug!(
        total = outcome.total_blocks,
        recovered = outcome.records.len(),
        failed = outcome.failed_blocks,
        "rejection log re-parsed"
    );
    Ok(outcome)
}

/// Backs the log up, appends `records` to the store, then empties the log.
///
/// A failed backup leaves both the store and the log untouched. A failed
/// store write leaves the log untouched, with the backup already on disk.
/// Empty `records` is a no-op.
pub fn merge_recovered(
    store: &dyn RecordStore,
    log: &RejectionLog,
    records: &[ErrorRecord],
) -> LedgerResult<MergeReport> {
    if records.is_empty() {
        return Ok(MergeReport::default());
    }
    let backup_path = log.backup()?;
    store.save_all(records)?;
    log.truncate()?;
    tracing::info!(
        merged = records.len(),
        backup = %backup_path.display(),
        "recovered records merged"
    );
    Ok(MergeReport {
        merged: records.len(),
        backup_path: Some(backup_path),
    })
}

pub fn count_by_responsible(records: &[ErrorRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.responsible.clone()).or_insert(0) += 1;
    }
    counts
}

/// Recover, then merge when anything was recovered.
pub fn run_recovery(
    store: &dyn RecordStore,
    log: &RejectionLog,
    limits: &GateLimits,
) -> LedgerResult<RecoverySummary> {
    let outcome = recover(log, limits)?;
    let merge = merge_recovered(store, log, &outcome.records)?;
    let summary = RecoverySummary {
        total_blocks: outcome.total_blocks,
        recovered_count: outcome.records.len(),
        failed_count: outcome.failed_blocks,
        by_responsible: count_by_responsible(&outcome.records),
        backup_path: merge
            .backup_path
            .map(|p| p.to_string_lossy().to_string()),
    };
    tracing::info!(
        recovered = summary.recovered_count,
        failed = summary.failed_count,
        "recovery finished"
    );
    Ok(summary)
}
