pub mod config;
pub mod cost_categories;
pub mod error;
pub mod flat_file_store;
pub mod ingest;
pub mod message_parser;
pub mod record_store;
pub mod recovery;
pub mod rejection_log;
pub mod report_aggregation;
pub mod report_gate;
pub mod report_model;
pub mod table_store;

pub use config::{LedgerConfig, StoreBackend};
pub use cost_categories::{categorize, sum_by_category, CategoryTotals, CostBreakdown, CostCategory};
pub use error::{LedgerError, LedgerResult};
pub use ingest::{IngestOutcome, Ingestor, LogPolicy};
pub use message_parser::{extract_field, extract_fields, ReportField};
pub use record_store::{open_store, RecordStore, StoreStatus};
pub use recovery::{merge_recovered, recover, run_recovery, RecoveryOutcome, RecoverySummary};
pub use rejection_log::RejectionLog;
pub use report_aggregation::{group_by, summarize_groups, GroupDimension, GroupSummary, ReportWindow};
pub use report_gate::{parse_report, validate, GateLimits, RejectReason};
pub use report_model::{ErrorRecord, Marketplace, RawMessage, RecordOrigin, RecordTemplate};
