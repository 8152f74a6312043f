use chrono::NaiveDate;
use error_ledger::{
    categorize, group_by, recover, summarize_groups, sum_by_category, ErrorRecord,
    GroupDimension, IngestOutcome, Ingestor, LedgerConfig, LedgerError, LogPolicy, RawMessage,
    ReportWindow, StoreBackend,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::io::{self, Read};
use std::path::Path;
use tracing_subscriber::EnvFilter;

const SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Deserialize)]
struct LedgerRequest {
    schema_version: u64,
    endpoint: String,
    #[serde(default)]
    query: Value,
    dataset: Dataset,
}

/// Where the ledger lives: a config file, a data directory, or both (the
/// directory and backend then override the file).
#[derive(Debug, Default, Deserialize)]
struct Dataset {
    config_path: Option<String>,
    data_dir: Option<String>,
    backend: Option<StoreBackend>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum FailureCategory {
    Protocol,
    UnsupportedEndpoint,
    Validation,
    InvalidRange,
    Config,
    Storage,
}

#[derive(Debug, PartialEq, Serialize)]
struct Failure {
    category: FailureCategory,
    message: String,
}

impl Failure {
    fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for Failure {
    fn from(err: LedgerError) -> Self {
        let category = match err {
            LedgerError::Config(_) => FailureCategory::Config,
            _ => FailureCategory::Storage,
        };
        Self::new(category, err.to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum LedgerResponse {
    Success { payload: Value },
    Error { error: Failure },
}

#[derive(Debug, Default, Deserialize)]
struct WindowQuery {
    window: Option<String>,
    date: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IngestQuery {
    text: Option<String>,
    log_rejections: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RecoverQuery {
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Default, Deserialize)]
struct GroupsQuery {
    dimension: Option<String>,
    #[serde(default)]
    include_records: bool,
    #[serde(flatten)]
    window: WindowQuery,
}

#[derive(Debug, Default, Deserialize)]
struct CostsQuery {
    cost_text: Option<String>,
    #[serde(flatten)]
    window: WindowQuery,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn read_request(raw: &str) -> Result<LedgerRequest, Failure> {
    if raw.trim().is_empty() {
        return Err(Failure::new(FailureCategory::Protocol, "empty request"));
    }
    let request: LedgerRequest = serde_json::from_str(raw)
        .map_err(|e| Failure::new(FailureCategory::Protocol, format!("invalid request: {e}")))?;
    if request.schema_version != SCHEMA_VERSION {
        return Err(Failure::new(
            FailureCategory::Protocol,
            format!("unsupported schema_version: {}", request.schema_version),
        ));
    }
    Ok(request)
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn resolve_config(dataset: &Dataset) -> Result<LedgerConfig, Failure> {
    let data_dir = non_empty(dataset.data_dir.as_deref());
    let mut cfg = match (non_empty(dataset.config_path.as_deref()), data_dir) {
        (Some(path), _) => LedgerConfig::from_json_file(Path::new(path))?,
        (None, Some(dir)) => LedgerConfig::with_data_dir(dir, StoreBackend::default()),
        (None, None) => {
            return Err(Failure::new(
                FailureCategory::Protocol,
                "dataset needs config_path or data_dir",
            ))
        }
    };
    if let Some(dir) = data_dir {
        cfg.data_dir = dir.into();
    }
    if let Some(backend) = dataset.backend {
        cfg.backend = backend;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn parse_date_text(raw: Option<&str>, field: &str) -> Result<NaiveDate, Failure> {
    let raw = non_empty(raw)
        .ok_or_else(|| Failure::new(FailureCategory::Validation, format!("{field} is required")))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        Failure::new(
            FailureCategory::Validation,
            format!("{field} must be YYYY-MM-DD, got {raw}"),
        )
    })
}

fn build_window(query: &WindowQuery) -> Result<Option<ReportWindow>, Failure> {
    let Some(kind) = non_empty(query.window.as_deref()) else {
        return Ok(None);
    };
    let window = match kind.to_lowercase().as_str() {
        "day" => ReportWindow::Day(parse_date_text(query.date.as_deref(), "date")?),
        "week" => ReportWindow::Week(parse_date_text(query.date.as_deref(), "date")?),
        "month" => ReportWindow::month_of(parse_date_text(query.date.as_deref(), "date")?),
        "range" => {
            let start = parse_date_text(query.start.as_deref(), "start")?;
            let end = parse_date_text(query.end.as_deref(), "end")?;
            ReportWindow::range(start, end).ok_or_else(|| {
                Failure::new(
                    FailureCategory::InvalidRange,
                    format!("start {start} is after end {end}"),
                )
            })?
        }
        other => {
            return Err(Failure::new(
                FailureCategory::Validation,
                format!("unsupported window: {other}"),
            ))
        }
    };
    Ok(Some(window))
}

/// A missing or null query reads as the endpoint's defaults.
fn parse_query<T: DeserializeOwned + Default>(query: Value, endpoint: &str) -> Result<T, Failure> {
    if query.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(query).map_err(|e| {
        Failure::new(
            FailureCategory::Protocol,
            format!("query invalid for {endpoint}: {e}"),
        )
    })
}

fn windowed_records(ingestor: &Ingestor, query: &WindowQuery) -> Result<Vec<ErrorRecord>, Failure> {
    let window = build_window(query)?;
    let records = ingestor.store().list()?;
    Ok(match window {
        Some(window) => window.filter(&records),
        None => records,
    })
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, Failure> {
    serde_json::to_value(value).map_err(|e| Failure::from(LedgerError::from(e)))
}

fn dispatch(req: LedgerRequest) -> Result<Value, Failure> {
    let cfg = resolve_config(&req.dataset)?;
    let ingestor = Ingestor::from_config(&cfg)?;

    match req.endpoint.trim() {
        "/api/ingest" => {
            let query: IngestQuery = parse_query(req.query, "ingest")?;
            let text = query
                .text
                .ok_or_else(|| Failure::new(FailureCategory::Validation, "text is required"))?;
            let policy = if query.log_rejections.unwrap_or(true) {
                LogPolicy::LogRejections
            } else {
                LogPolicy::Silent
            };
            Ok(match ingestor.ingest(&RawMessage::new(text), policy)? {
                IngestOutcome::Accepted(record) => json!({
                    "outcome": "accepted",
                    "record": to_payload(&record)?,
                }),
                IngestOutcome::Rejected { reason, logged } => json!({
                    "outcome": "rejected",
                    "reason": reason.as_str(),
                    "logged": logged,
                }),
            })
        }
        "/api/recover" => {
            let query: RecoverQuery = parse_query(req.query, "recover")?;
            if !query.dry_run {
                return to_payload(&ingestor.recover()?);
            }
            let outcome = recover(ingestor.rejection_log(), ingestor.limits())?;
            Ok(json!({
                "dry_run": true,
                "total_blocks": outcome.total_blocks,
                "recovered_count": outcome.records.len(),
                "failed_count": outcome.failed_blocks,
                "records": to_payload(&outcome.records)?,
            }))
        }
        "/api/records" => {
            let query: WindowQuery = parse_query(req.query, "records")?;
            let records = windowed_records(&ingestor, &query)?;
            Ok(json!({
                "count": records.len(),
                "records": to_payload(&records)?,
            }))
        }
        "/api/groups" => {
            let query: GroupsQuery = parse_query(req.query, "groups")?;
            let raw_dimension = non_empty(query.dimension.as_deref()).ok_or_else(|| {
                Failure::new(FailureCategory::Validation, "dimension is required")
            })?;
            let dimension = GroupDimension::parse(raw_dimension).ok_or_else(|| {
                Failure::new(
                    FailureCategory::Validation,
                    format!("unsupported dimension: {raw_dimension}"),
                )
            })?;
            let records = windowed_records(&ingestor, &query.window)?;
            let mut payload = json!({
                "dimension": dimension.as_str(),
                "record_count": records.len(),
                "groups": to_payload(&summarize_groups(&records, dimension))?,
            });
            if query.include_records {
                payload["records_by_group"] = to_payload(&group_by(&records, dimension))?;
            }
            Ok(payload)
        }
        "/api/costs" => {
            let query: CostsQuery = parse_query(req.query, "costs")?;
            if let Some(cost_text) = query.cost_text.as_deref() {
                return Ok(json!({ "breakdown": to_payload(&categorize(cost_text))? }));
            }
            let records = windowed_records(&ingestor, &query.window)?;
            let totals = sum_by_category(&records);
            Ok(json!({
                "record_count": records.len(),
                "totals": to_payload(&totals)?,
                "total_cents": totals.total_cents(),
            }))
        }
        "/api/store-status" => {
            let log = ingestor.rejection_log();
            let backups = log
                .list_backups()?
                .into_iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect::<Vec<_>>();
            Ok(json!({
                "store": to_payload(&ingestor.store().status()?)?,
                "rejection_log": {
                    "path": log.path().to_string_lossy(),
                    "pending_blocks": log.read_blocks()?.len(),
                    "backups": backups,
                },
            }))
        }
        other => Err(Failure::new(
            FailureCategory::UnsupportedEndpoint,
            format!("unsupported endpoint: {other}"),
        )),
    }
}

fn main() {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let pretty = args.iter().any(|a| a == "--pretty");
    init_tracing(args.iter().any(|a| a == "--verbose"));

    let mut raw = String::new();
    let result = io::stdin()
        .read_to_string(&mut raw)
        .map_err(|e| Failure::new(FailureCategory::Protocol, format!("read stdin failed: {e}")))
        .and_then(|_| read_request(&raw))
        .and_then(|req| {
            tracing::debug!(endpoint = %req.endpoint, "ledger request");
            dispatch(req)
        });
    let resp = match result {
        Ok(payload) => LedgerResponse::Success { payload },
        Err(error) => {
            tracing::warn!(category = ?error.category, detail = %error.message, "ledger request failed");
            LedgerResponse::Error { error }
        }
    };

    let out = if pretty {
        serde_json::to_string_pretty(&resp)
    } else {
        serde_json::to_string(&resp)
    }
    .unwrap_or_else(|e| {
        json!({
            "status": "error",
            "error": { "category": "PROTOCOL", "message": format!("serialize response failed: {e}") },
        })
        .to_string()
    });

    print!("{out}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(kind: &str) -> WindowQuery {
        WindowQuery {
            window: Some(kind.to_string()),
            ..WindowQuery::default()
        }
    }

    #[test]
    fn window_query_builds_each_kind() {
        let day = WindowQuery {
            date: Some("2026-03-04".to_string()),
            ..window("day")
        };
        assert!(matches!(build_window(&day), Ok(Some(ReportWindow::Day(_)))));
        assert_eq!(build_window(&WindowQuery::default()), Ok(None));

        let reversed = WindowQuery {
            start: Some("2026-03-05".to_string()),
            end: Some("2026-03-01".to_string()),
            ..window("range")
        };
        let err = build_window(&reversed).expect_err("reversed range");
        assert_eq!(err.category, FailureCategory::InvalidRange);

        let bad_date = WindowQuery {
            date: Some("04/03/2026".to_string()),
            ..window("week")
        };
        let err = build_window(&bad_date).expect_err("bad date");
        assert_eq!(err.category, FailureCategory::Validation);

        let err = build_window(&window("year")).expect_err("unknown window");
        assert_eq!(err.category, FailureCategory::Validation);
    }

    #[test]
    fn dataset_needs_a_location() {
        let err = resolve_config(&Dataset::default()).expect_err("missing location");
        assert_eq!(err.category, FailureCategory::Protocol);

        let dataset = Dataset {
            data_dir: Some("some/dir".to_string()),
            backend: Some(StoreBackend::Table),
            ..Dataset::default()
        };
        let cfg = resolve_config(&dataset).expect("config");
        assert_eq!(cfg.backend, StoreBackend::Table);
        assert!(cfg.store_path().ends_with("error_records.db"));
    }

    #[test]
    fn request_envelope_is_checked_before_dispatch() {
        assert_eq!(
            read_request("  ").expect_err("empty").category,
            FailureCategory::Protocol
        );
        let wrong_version = r#"{"schema_version":2,"endpoint":"/api/records","dataset":{"data_dir":"d"}}"#;
        assert_eq!(
            read_request(wrong_version).expect_err("version").category,
            FailureCategory::Protocol
        );
        let ok = r#"{"schema_version":1,"endpoint":"/api/records","dataset":{"data_dir":"d"}}"#;
        let req = read_request(ok).expect("request");
        assert!(req.query.is_null());
    }

    #[test]
    fn ledger_errors_map_to_categories() {
        let config = Failure::from(LedgerError::Config("bad".to_string()));
        assert_eq!(config.category, FailureCategory::Config);
        let schema = Failure::from(LedgerError::StoreSchema("bad header".to_string()));
        assert_eq!(schema.category, FailureCategory::Storage);
    }

    #[test]
    fn error_response_uses_status_tag() {
        let resp = LedgerResponse::Error {
            error: Failure::new(FailureCategory::UnsupportedEndpoint, "unsupported endpoint: /x"),
        };
        let value = serde_json::to_value(&resp).expect("serialize");
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["category"], "UNSUPPORTED_ENDPOINT");
    }
}
