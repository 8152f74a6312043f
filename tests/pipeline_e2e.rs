use error_ledger::{
    categorize, open_store, recover, summarize_groups, sum_by_category, CostCategory,
    GroupDimension, IngestOutcome, Ingestor, LedgerConfig, LogPolicy, Marketplace, RawMessage,
    RecordOrigin, RejectReason, ReportWindow, StoreBackend,
};
use std::fs;
use std::path::PathBuf;

const BACKENDS: [StoreBackend; 2] = [StoreBackend::FlatFile, StoreBackend::Table];

fn temp_data_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "error_ledger_e2e_{tag}_{}_{}",
        std::process::id(),
        uuid::Uuid::new_v4()
    ))
}

#[test]
fn live_ingest_stores_valid_and_logs_noise() {
    for backend in BACKENDS {
        let cfg = LedgerConfig::with_data_dir(temp_data_dir("ingest"), backend);
        let ingestor = Ingestor::from_config(&cfg).expect("ingestor");

        let accepted = ingestor
            .ingest(
                &RawMessage::new(
                    "Responsável pelo erro: Montagem\nConta: João - ML\nMotivo do erro: Faltou 3 peças",
                ),
                LogPolicy::LogRejections,
            )
            .expect("ingest report");
        let record = match accepted {
            IngestOutcome::Accepted(record) => record,
            other => panic!("expected accepted, got {other:?}"),
        };
        assert_eq!(record.responsible, "Montagem");
        assert_eq!(record.marketplace, Some(Marketplace::MercadoLivre));
        assert!(record.reason.contains("Faltou 3 peças"));

        let rejected = ingestor
            .ingest(&RawMessage::new("oi"), LogPolicy::LogRejections)
            .expect("ingest noise");
        assert_eq!(
            rejected,
            IngestOutcome::Rejected {
                reason: RejectReason::Throwaway,
                logged: true
            }
        );

        let reopened = open_store(&cfg).expect("reopen store");
        assert_eq!(reopened.list().expect("list"), vec![record]);
        assert_eq!(
            ingestor.rejection_log().read_blocks().expect("blocks"),
            vec!["oi".to_string()]
        );
        let _ = fs::remove_dir_all(&cfg.data_dir);
    }
}

#[test]
fn recovery_salvages_relaxed_rejections_after_threshold_change() {
    for backend in BACKENDS {
        let data_dir = temp_data_dir("recover");
        let mut strict = LedgerConfig::with_data_dir(&data_dir, backend);
        strict.min_reason_len = 40;
        let strict_ingestor = Ingestor::from_config(&strict).expect("strict ingestor");

        let report = "Responsável pelo erro: Corte\nConta: Loja 2 - Shopee\nMotivo do erro: Peça cortada menor";
        let outcome = strict_ingestor
            .ingest(&RawMessage::new(report), LogPolicy::LogRejections)
            .expect("strict ingest");
        assert_eq!(
            outcome,
            IngestOutcome::Rejected {
                reason: RejectReason::ReasonTooShort,
                logged: true
            }
        );
        strict_ingestor
            .ingest(&RawMessage::new("bom dia"), LogPolicy::LogRejections)
            .expect("noise ingest");
        let original_log = fs::read_to_string(strict.rejection_log_path()).expect("log");

        let relaxed = LedgerConfig::with_data_dir(&data_dir, backend);
        let ingestor = Ingestor::from_config(&relaxed).expect("relaxed ingestor");

        let preview = recover(ingestor.rejection_log(), ingestor.limits()).expect("dry run");
        assert_eq!(preview.records.len(), 1);
        assert_eq!(ingestor.store().count().expect("count before merge"), 0);

        let summary = ingestor.recover().expect("recover");
        assert_eq!(summary.total_blocks, 2);
        assert_eq!(summary.recovered_count, 1);
        assert_eq!(summary.failed_count, 1);

        let stored = ingestor.store().list().expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].origin, RecordOrigin::Recovered);
        assert_eq!(stored[0].marketplace, Some(Marketplace::Shopee));

        assert!(ingestor.rejection_log().read_blocks().expect("blocks").is_empty());
        let backups = ingestor.rejection_log().list_backups().expect("backups");
        assert_eq!(backups.len(), 1);
        let backup = fs::read_to_string(&backups[0]).expect("backup");
        assert_eq!(backup, original_log);
        assert!(backup.contains("Peça cortada menor") && backup.contains("bom dia"));
        let _ = fs::remove_dir_all(&data_dir);
    }
}

#[test]
fn stored_costs_aggregate_by_group_and_window() {
    let cfg = LedgerConfig::with_data_dir(temp_data_dir("costs"), StoreBackend::Table);
    let ingestor = Ingestor::from_config(&cfg).expect("ingestor");
    let reports = [
        "Responsável: Expedição\nConta: Loja 1 - ML\nMotivo: Caixa amassada no envio\nCusto: Envio: 16,08; Tampo: 5,00; Frete extra",
        "Responsável: Expedição\nConta: Loja 1 - ML\nMotivo: Etiqueta trocada\nCusto: Reembolso parcial: 20,00",
        "Responsável: Montagem\nMotivo: Parafuso faltando\nCusto: Desconto: 7,50",
    ];
    for report in reports {
        let outcome = ingestor
            .ingest(&RawMessage::new(report), LogPolicy::Silent)
            .expect("ingest");
        assert!(matches!(outcome, IngestOutcome::Accepted(_)), "{report}");
    }

    let records = ingestor.store().list().expect("list");
    let today = records[0].recorded_date().expect("recorded date");
    let in_window = ReportWindow::Day(today).filter(&records);
    assert_eq!(in_window.len(), 3);

    let rows = summarize_groups(&in_window, GroupDimension::Responsible);
    assert_eq!(rows[0].key, "Expedição");
    assert_eq!(rows[0].count, 2);
    assert_eq!(rows[0].costs.cents(CostCategory::Shipping), 1608);
    assert_eq!(rows[0].costs.cents(CostCategory::PackagingDefect), 500);
    assert_eq!(rows[0].costs.cents(CostCategory::PartialRefund), 2000);
    assert_eq!(rows[1].key, "Montagem");

    let accounts = summarize_groups(&in_window, GroupDimension::Account);
    assert!(accounts.iter().any(|row| row.key == "Loja 1 - ML [ML]" && row.count == 2));
    assert!(accounts.iter().any(|row| row.key == "-" && row.count == 1));

    let totals = sum_by_category(&records);
    assert_eq!(totals.cents(CostCategory::Discount), 750);
    assert_eq!(totals.total_cents(), 1608 + 500 + 2000 + 750);
    let _ = fs::remove_dir_all(&cfg.data_dir);
}

#[test]
fn cost_breakdown_display_matches_report_format() {
    let breakdown = categorize("Envio: 16,08; Tampo: 5,00; Frete extra");
    assert_eq!(breakdown.get(CostCategory::Shipping).display(), "16.08");
    assert_eq!(breakdown.get(CostCategory::PackagingDefect).display(), "5.00");
    assert_eq!(breakdown.get(CostCategory::Other).display(), "Frete extra");
    for category in [
        CostCategory::Discount,
        CostCategory::Refund,
        CostCategory::Return,
        CostCategory::PartialRefund,
    ] {
        assert_eq!(breakdown.get(category).display(), "-");
    }
}
