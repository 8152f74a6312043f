//! Live path: one raw message in, one stored record or one logged rejection
//! out.

use chrono::Local;

use crate::config::LedgerConfig;
use crate::error::LedgerResult;
use crate::record_store::{open_store, RecordStore};
use crate::recovery::{run_recovery, RecoverySummary};
use crate::rejection_log::RejectionLog;
use crate::report_gate::{parse_report, GateLimits, RejectReason};
use crate::report_model::{ErrorRecord, RawMessage, RecordOrigin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogPolicy {
    #[default]
    LogRejections,
    Silent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted(ErrorRecord),
    Rejected { reason: RejectReason, logged: bool },
}

pub struct Ingestor {
    store: Box<dyn RecordStore>,
    log: RejectionLog,
    limits: GateLimits,
}

impl Ingestor {
    pub fn new(store: Box<dyn RecordStore>, log: RejectionLog, limits: GateLimits) -> Self {
        Self { store, log, limits }
    }

    pub fn from_config(cfg: &LedgerConfig) -> LedgerResult<Self> {
        Ok(Self::new(
            open_store(cfg)?,
            RejectionLog::from_config(cfg),
            cfg.gate_limits(),
        ))
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn rejection_log(&self) -> &RejectionLog {
        &self.log
    }

    pub fn limits(&self) -> &GateLimits {
        &self.limits
    }

    /// Stores the message when it parses, otherwise logs it according to
    /// `policy`. A store failure is returned; a log failure only downgrades
    /// the rejection to `logged: false`.
    pub fn ingest(&self, message: &RawMessage, policy: LogPolicy) -> LedgerResult<IngestOutcome> {
        let parsed = parse_report(&message.text, &self.limits).and_then(|candidate| {
            ErrorRecord::from_candidate(candidate, RecordOrigin::Live, Local::now())
                .ok_or(RejectReason::MissingResponsible)
        });
        match parsed {
            Ok(record) => {
                self.store.save(&record)?;
                tracing::info!(
                    responsible = %record.responsible,
                    template = record.template.as_str(),
                    "error report stored"
                );
                Ok(IngestOutcome::Accepted(record))
            }
            Err(reason) => Ok(IngestOutcome::Rejected {
                reason,
                logged: self.log_rejection(&message.text, reason, policy),
            }),
        }
    }

    fn log_rejection(&self, text: &str, reason: RejectReason, policy: LogPolicy) -> bool {
        if policy == LogPolicy::Silent {
            tracing::debug!(%reason, "message rejected, not logged");
            return false;
        }
        match self.log.append(text) {
            Ok(()) => {
                tracing::warn!(%reason, "message rejected and logged");
                true
            }
            Err(err) => {
                tracing::warn!(%reason, error = %err, "message rejected, log append failed");
                false
            }
        }
    }

    pub fn recover(&self) -> LedgerResult<RecoverySummary> {
        run_recovery(self.store.as_ref(), &self.log, &self.limits)
    }
}
