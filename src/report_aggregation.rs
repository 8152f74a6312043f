//! Grouping of stored records by a report dimension, date windows, and
//! per-group cost summaries.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cost_categories::{sum_by_category, CategoryTotals};
use crate::report_model::{ErrorRecord, PLACEHOLDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDimension {
    Responsible,
    Account,
    Sku,
    Date,
}

impl GroupDimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Responsible => "responsible",
            Self::Account => "account",
            Self::Sku => "sku",
            Self::Date => "date",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "responsible" => Some(Self::Responsible),
            "account" => Some(Self::Account),
            "sku" => Some(Self::Sku),
            "date" => Some(Self::Date),
            _ => None,
        }
    }
}

/// Key a record files under for `dimension`.
pub fn group_key(record: &ErrorRecord, dimension: GroupDimension) -> String {
    match dimension {
        GroupDimension::Responsible => record.responsible.clone(),
        GroupDimension::Account => match (&record.account, record.marketplace) {
            (Some(account), Some(marketplace)) => format!("{account} [{marketplace}]"),
            (Some(account), None) => account.clone(),
            (None, _) => PLACEHOLDER.to_string(),
        },
        GroupDimension::Sku => record
            .sku
            .clone()
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
        GroupDimension::Date => record
            .recorded_date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
    }
}

pub fn group_by(
    records: &[ErrorRecord],
    dimension: GroupDimension,
) -> BTreeMap<String, Vec<ErrorRecord>> {
    let mut groups = BTreeMap::<String, Vec<ErrorRecord>>::new();
    for record in records {
        groups
            .entry(group_key(record, dimension))
            .or_default()
            .push(record.clone());
    }
    groups
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub count: usize,
    pub costs: CategoryTotals,
}

/// Groups ordered by record count, largest first, ties broken by key.
pub fn summarize_groups(records: &[ErrorRecord], dimension: GroupDimension) -> Vec<GroupSummary> {
    let mut rows = group_by(records, dimension)
        .into_iter()
        .map(|(key, members)| GroupSummary {
            count: members.len(),
            costs: sum_by_category(&members),
            key,
        })
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    rows
}

/// Inclusive calendar window over `recorded_at` dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    Day(NaiveDate),
    /// Monday to Sunday week containing the anchor date.
    Week(NaiveDate),
    Month { year: i32, month: u32 },
    Range { start: NaiveDate, end: NaiveDate },
}

impl ReportWindow {
    pub fn month_of(date: NaiveDate) -> Self {
        Self::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// `None` when `start` is after `end`.
    pub fn range(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self::Range { start, end })
    }

    /// First and last day of the window; `None` for an impossible month.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match *self {
            Self::Day(date) => Some((date, date)),
            Self::Week(anchor) => {
                let start =
                    anchor - Duration::days(i64::from(anchor.weekday().num_days_from_monday()));
                Some((start, start + Duration::days(6)))
            }
            Self::Month { year, month } => {
                let start = NaiveDate::from_ymd_opt(year, month, 1)?;
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)?
                };
                Some((start, next - Duration::days(1)))
            }
            Self::Range { start, end } => Some((start, end)),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.bounds()
            .is_some_and(|(start, end)| start <= date && date <= end)
    }

    /// Records whose `recorded_at` falls inside the window. Records with an
    /// unreadable timestamp are left out.
    pub fn filter(&self, records: &[ErrorRecord]) -> Vec<ErrorRecord> {
        records
            .iter()
            .filter(|r| r.recorded_date().is_some_and(|d| self.contains(d)))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost_categories::CostCategory;
    use crate::report_model::{Marketplace, RecordOrigin, RecordTemplate};

    fn record(responsible: &str, recorded_at: &str) -> ErrorRecord {
        ErrorRecord {
            responsible: responsible.to_string(),
            account: None,
            marketplace: None,
            sale_id: None,
            sku: None,
            reason: "Peça com avaria".to_string(),
            cost_text: None,
            cost_total: None,
            template: RecordTemplate::Basic,
            recorded_at: recorded_at.to_string(),
            origin: RecordOrigin::Live,
        }
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("fixture date")
    }

    #[test]
    fn groups_by_responsible_keep_relative_order() {
        let mut first = record("A", "2026-03-02T09:00:00-03:00");
        first.sale_id = Some("1".to_string());
        let mut third = record("A", "2026-03-03T09:00:00-03:00");
        third.sale_id = Some("3".to_string());
        let records = vec![first.clone(), record("B", "2026-03-02T10:00:00-03:00"), third.clone()];

        let groups = group_by(&records, GroupDimension::Responsible);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["A"], vec![first, third]);
        assert_eq!(groups["B"].len(), 1);
    }

    #[test]
    fn account_key_carries_marketplace_and_absent_fields_use_placeholder() {
        let mut with_ml = record("A", "2026-03-02T09:00:00-03:00");
        with_ml.account = Some("Loja 1".to_string());
        with_ml.marketplace = Some(Marketplace::MercadoLivre);
        let mut plain = record("B", "2026-03-02T09:00:00-03:00");
        plain.account = Some("Loja 2".to_string());
        let bare = record("C", "not a timestamp");

        assert_eq!(group_key(&with_ml, GroupDimension::Account), "Loja 1 [ML]");
        assert_eq!(group_key(&plain, GroupDimension::Account), "Loja 2");
        assert_eq!(group_key(&bare, GroupDimension::Account), "-");
        assert_eq!(group_key(&bare, GroupDimension::Sku), "-");
        assert_eq!(group_key(&bare, GroupDimension::Date), "-");
        assert_eq!(group_key(&with_ml, GroupDimension::Date), "2026-03-02");
    }

    #[test]
    fn every_record_lands_in_exactly_one_group() {
        let records = vec![
            record("A", "2026-03-02T09:00:00-03:00"),
            record("B", "2026-03-05T09:00:00-03:00"),
            record("C", "garbage"),
        ];
        for dimension in [
            GroupDimension::Responsible,
            GroupDimension::Account,
            GroupDimension::Sku,
            GroupDimension::Date,
        ] {
            let total: usize = group_by(&records, dimension).values().map(Vec::len).sum();
            assert_eq!(total, records.len(), "dimension {}", dimension.as_str());
        }
    }

    #[test]
    fn summaries_sort_by_count_then_key_with_costs() {
        let mut b1 = record("B", "2026-03-02T09:00:00-03:00");
        b1.cost_text = Some("Envio: 10,00".to_string());
        let mut b2 = record("B", "2026-03-02T10:00:00-03:00");
        b2.cost_text = Some("Envio: 5,50".to_string());
        let records = vec![
            record("C", "2026-03-02T09:00:00-03:00"),
            b1,
            record("A", "2026-03-02T09:00:00-03:00"),
            b2,
        ];

        let rows = summarize_groups(&records, GroupDimension::Responsible);
        let keys = rows.iter().map(|r| r.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["B", "A", "C"]);
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].costs.cents(CostCategory::Shipping), 1550);
        assert_eq!(rows[1].costs.total_cents(), 0);
    }

    #[test]
    fn week_window_spans_monday_to_sunday() {
        let window = ReportWindow::Week(date("2026-03-04"));
        assert_eq!(window.bounds(), Some((date("2026-03-02"), date("2026-03-08"))));
        assert!(window.contains(date("2026-03-08")));
        assert!(!window.contains(date("2026-03-09")));
        assert!(!window.contains(date("2026-03-01")));
    }

    #[test]
    fn month_window_handles_december_and_bad_months() {
        let dec = ReportWindow::Month {
            year: 2025,
            month: 12,
        };
        assert_eq!(dec.bounds(), Some((date("2025-12-01"), date("2025-12-31"))));
        assert_eq!(
            ReportWindow::month_of(date("2024-02-10")).bounds(),
            Some((date("2024-02-01"), date("2024-02-29")))
        );
        let bad = ReportWindow::Month {
            year: 2026,
            month: 13,
        };
        assert_eq!(bad.bounds(), None);
        assert!(!bad.contains(date("2026-01-01")));
    }

    #[test]
    fn range_is_inclusive_and_rejects_reversed_bounds() {
        assert!(ReportWindow::range(date("2026-03-05"), date("2026-03-01")).is_none());
        let window = ReportWindow::range(date("2026-03-01"), date("2026-03-05")).expect("range");
        let records = vec![
            record("A", "2026-03-01T00:00:00-03:00"),
            record("B", "2026-03-05T23:59:59-03:00"),
            record("C", "2026-03-06T00:00:00-03:00"),
            record("D", "bad"),
        ];
        let kept = window
            .filter(&records)
            .into_iter()
            .map(|r| r.responsible)
            .collect::<Vec<_>>();
        assert_eq!(kept, vec!["A", "B"]);
        assert!(ReportWindow::Day(date("2026-03-06")).contains(date("2026-03-06")));
    }
}
