//! Decomposition of free-text cost descriptions into fixed cost buckets.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::message_parser::first_amount_token;
use crate::report_model::{ErrorRecord, PLACEHOLDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CostCategory {
    Discount,
    Refund,
    Return,
    #[serde(rename = "Partial-Refund")]
    PartialRefund,
    Shipping,
    #[serde(rename = "Packaging-Defect")]
    PackagingDefect,
    Other,
}

impl CostCategory {
    pub const ALL: [CostCategory; 7] = [
        CostCategory::Discount,
        CostCategory::Refund,
        CostCategory::Return,
        CostCategory::PartialRefund,
        CostCategory::Shipping,
        CostCategory::PackagingDefect,
        CostCategory::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Discount => "Discount",
            Self::Refund => "Refund",
            Self::Return => "Return",
            Self::PartialRefund => "Partial-Refund",
            Self::Shipping => "Shipping",
            Self::PackagingDefect => "Packaging-Defect",
            Self::Other => "Other",
        }
    }
}

/// Keyword sets in match priority; the first hit decides a fragment.
/// Partial refunds must be tested before plain refunds.
const CATEGORY_KEYWORDS: &[(CostCategory, &[&str])] = &[
    (
        CostCategory::PartialRefund,
        &["reembolso parcial", "estorno parcial", "reemb. parcial"],
    ),
    (CostCategory::Refund, &["reembolso", "estorno", "reemb"]),
    (CostCategory::Discount, &["desconto", "abatimento", "cupom"]),
    (
        CostCategory::Return,
        &["devolução", "devolucao", "devolvido", "retorno"],
    ),
    (CostCategory::Shipping, &["envio", "postagem", "coleta"]),
    (
        CostCategory::PackagingDefect,
        &["tampo", "embalagem", "avaria", "defeito", "quebra", "amassado"],
    ),
];

const OTHER_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryValue {
    Absent,
    Amount(i64),
    Note(String),
}

impl CategoryValue {
    pub fn display(&self) -> String {
        match self {
            Self::Absent => PLACEHOLDER.to_string(),
            Self::Amount(cents) => format_amount_cents(*cents),
            Self::Note(text) => text.clone(),
        }
    }

    /// Numeric contribution; a note contributes the first number of each
    /// joined fragment. Anything unparsable counts as zero.
    pub fn cents(&self) -> i64 {
        match self {
            Self::Absent => 0,
            Self::Amount(cents) => *cents,
            Self::Note(text) => text
                .split('|')
                .filter_map(|part| first_amount_token(part).and_then(|t| decimal_to_cents(&t)))
                .fold(0_i64, i64::saturating_add),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostBreakdown {
    values: BTreeMap<CostCategory, CategoryValue>,
}

impl Default for CostBreakdown {
    fn default() -> Self {
        Self {
            values: CostCategory::ALL
                .into_iter()
                .map(|c| (c, CategoryValue::Absent))
                .collect(),
        }
    }
}

impl CostBreakdown {
    pub fn get(&self, category: CostCategory) -> &CategoryValue {
        self.values.get(&category).unwrap_or(&CategoryValue::Absent)
    }

    pub fn display_map(&self) -> BTreeMap<CostCategory, String> {
        self.values.iter().map(|(k, v)| (*k, v.display())).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn add_amount(&mut self, category: CostCategory, cents: i64) {
        let slot = self.values.entry(category).or_insert(CategoryValue::Absent);
        *slot = match &*slot {
            CategoryValue::Amount(prev) => CategoryValue::Amount(prev.saturating_add(cents)),
            _ => CategoryValue::Amount(cents),
        };
    }

    fn push_other(&mut self, fragment: &str) {
        let slot = self
            .values
            .entry(CostCategory::Other)
            .or_insert(CategoryValue::Absent);
        *slot = match &*slot {
            CategoryValue::Note(prev) => CategoryValue::Note(format!("{prev}{OTHER_SEPARATOR}{fragment}")),
            _ => CategoryValue::Note(fragment.to_string()),
        };
    }
}

impl Serialize for CostBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.display_map().serialize(serializer)
    }
}

/// Per-category sums across many records, in cents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTotals {
    cents: BTreeMap<CostCategory, i64>,
}

impl Default for CategoryTotals {
    fn default() -> Self {
        Self {
            cents: CostCategory::ALL.into_iter().map(|c| (c, 0)).collect(),
        }
    }
}

impl CategoryTotals {
    pub fn cents(&self, category: CostCategory) -> i64 {
        self.cents.get(&category).copied().unwrap_or(0)
    }

    pub fn amount(&self, category: CostCategory) -> f64 {
        cents_to_value(self.cents(category))
    }

    pub fn total_cents(&self) -> i64 {
        self.cents.values().copied().fold(0_i64, i64::saturating_add)
    }

    pub fn add_breakdown(&mut self, breakdown: &CostBreakdown) {
        for category in CostCategory::ALL {
            let entry = self.cents.entry(category).or_insert(0);
            *entry = entry.saturating_add(breakdown.get(category).cents());
        }
    }
}

impl Serialize for CategoryTotals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.cents
            .iter()
            .map(|(k, v)| (*k, cents_to_value(*v)))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }
}

fn cents_to_value(cents: i64) -> f64 {
    round_to(cents as f64 / 100.0, 2)
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10_f64.powi(digits);
    (value * factor).round() / factor
}

pub fn format_amount_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Dot-decimal text to cents, rounding half up past the second decimal.
pub fn decimal_to_cents(raw: &str) -> Option<i64> {
    let text = raw.trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if unsigned.is_empty() {
        return None;
    }
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int_part = if int_part.is_empty() { "0" } else { int_part };
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let int_val = int_part.parse::<i64>().ok()?;
    let digits = frac_part
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(i64::from)
        .collect::<Vec<_>>();
    let mut frac_val =
        digits.first().copied().unwrap_or(0) * 10 + digits.get(1).copied().unwrap_or(0);
    if digits.get(2).is_some_and(|d| *d >= 5) {
        frac_val += 1;
    }
    let cents = int_val.checked_mul(100)?.checked_add(frac_val)?;
    Some(if negative { -cents } else { cents })
}

/// Splits on `;` and on `,` unless the comma sits between two digits.
fn split_fragments(text: &str) -> Vec<String> {
    let chars = text.chars().collect::<Vec<_>>();
    let mut out = Vec::new();
    let mut current = String::new();
    for (idx, c) in chars.iter().enumerate() {
        let decimal_comma = *c == ','
            && idx
                .checked_sub(1)
                .and_then(|p| chars.get(p))
                .is_some_and(char::is_ascii_digit)
            && chars.get(idx + 1).is_some_and(char::is_ascii_digit);
        if *c == ';' || (*c == ',' && !decimal_comma) {
            let fragment = current.trim();
            if !fragment.is_empty() {
                out.push(fragment.to_string());
            }
            current.clear();
        } else {
            current.push(*c);
        }
    }
    let fragment = current.trim();
    if !fragment.is_empty() {
        out.push(fragment.to_string());
    }
    out
}

fn match_category(fragment: &str) -> Option<CostCategory> {
    let target = fragment.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| target.contains(kw)))
        .map(|(category, _)| *category)
}

pub fn categorize(cost_text: &str) -> CostBreakdown {
    let mut breakdown = CostBreakdown::default();
    for fragment in split_fragments(cost_text) {
        match match_category(&fragment) {
            Some(category) => {
                if let Some(cents) = first_amount_token(&fragment).and_then(|t| decimal_to_cents(&t)) {
                    breakdown.add_amount(category, cents);
                }
            }
            None => breakdown.push_other(&fragment),
        }
    }
    breakdown
}

pub fn sum_by_category(records: &[ErrorRecord]) -> CategoryTotals {
    let mut totals = CategoryTotals::default();
    for record in records {
        if let Some(text) = record.cost_text.as_deref() {
            totals.add_breakdown(&categorize(text));
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_model::{RecordOrigin, RecordTemplate};
    use proptest::prelude::*;

    fn record_with_cost(cost: Option<&str>) -> ErrorRecord {
        ErrorRecord {
            responsible: "Montagem".to_string(),
            account: None,
            marketplace: None,
            sale_id: None,
            sku: None,
            reason: "Faltou peça".to_string(),
            cost_text: cost.map(str::to_string),
            cost_total: None,
            template: RecordTemplate::Basic,
            recorded_at: "2026-03-04T10:00:00-03:00".to_string(),
            origin: RecordOrigin::Live,
        }
    }

    #[test]
    fn splits_mixed_cost_text_into_categories() {
        let b = categorize("Envio: 16,08; Tampo: 5,00; Frete extra");
        assert_eq!(b.get(CostCategory::Shipping).display(), "16.08");
        assert_eq!(b.get(CostCategory::PackagingDefect).display(), "5.00");
        assert_eq!(b.get(CostCategory::Other).display(), "Frete extra");
        for category in [
            CostCategory::Discount,
            CostCategory::Refund,
            CostCategory::Return,
            CostCategory::PartialRefund,
        ] {
            assert_eq!(b.get(category).display(), "-");
        }
    }

    #[test]
    fn partial_refund_outranks_refund() {
        let b = categorize("Reembolso parcial 30,00, Reembolso 10");
        assert_eq!(b.get(CostCategory::PartialRefund), &CategoryValue::Amount(3000));
        assert_eq!(b.get(CostCategory::Refund), &CategoryValue::Amount(1000));
    }

    #[test]
    fn unmatched_fragments_are_joined_not_overwritten() {
        let b = categorize("Frete extra 12,50; Montador 40");
        assert_eq!(
            b.get(CostCategory::Other).display(),
            "Frete extra 12,50 | Montador 40"
        );
        assert_eq!(b.get(CostCategory::Other).cents(), 5250);
    }

    #[test]
    fn repeated_category_accumulates() {
        let b = categorize("Envio 10; Reenvio 15,5");
        assert_eq!(b.get(CostCategory::Shipping), &CategoryValue::Amount(2550));
    }

    #[test]
    fn keyword_without_number_keeps_placeholder() {
        let b = categorize("Desconto a combinar");
        assert_eq!(b.get(CostCategory::Discount), &CategoryValue::Absent);
    }

    #[test]
    fn breakdown_serializes_every_category() {
        let json = serde_json::to_value(categorize("Envio: 16,08")).expect("serialize");
        let obj = json.as_object().expect("object");
        assert_eq!(obj.len(), 7);
        assert_eq!(obj["Shipping"], "16.08");
        assert_eq!(obj["Partial-Refund"], "-");
    }

    #[test]
    fn sums_across_records_treating_missing_as_zero() {
        let records = vec![
            record_with_cost(Some("Envio: 16,08; Tampo: 5,00")),
            record_with_cost(None),
            record_with_cost(Some("Envio 3,92; Devolução: abc")),
        ];
        let totals = sum_by_category(&records);
        assert_eq!(totals.cents(CostCategory::Shipping), 2000);
        assert_eq!(totals.cents(CostCategory::PackagingDefect), 500);
        assert_eq!(totals.cents(CostCategory::Return), 0);
        assert_eq!(totals.total_cents(), 2500);
        assert!((totals.amount(CostCategory::Shipping) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn empty_record_set_sums_to_zero() {
        let totals = sum_by_category(&[]);
        for category in CostCategory::ALL {
            assert_eq!(totals.cents(category), 0);
        }
    }

    #[test]
    fn decimal_to_cents_rounds_and_rejects_garbage() {
        assert_eq!(decimal_to_cents("16.08"), Some(1608));
        assert_eq!(decimal_to_cents("7.5"), Some(750));
        assert_eq!(decimal_to_cents("1.005"), Some(101));
        assert_eq!(decimal_to_cents("-2"), Some(-200));
        assert_eq!(decimal_to_cents("1.2.3"), None);
        assert_eq!(decimal_to_cents(""), None);
    }

    proptest! {
        #[test]
        fn categorize_is_total(text in "\\PC{0,200}") {
            let b = categorize(&text);
            prop_assert_eq!(b.len(), 7);
            prop_assert_eq!(b.display_map().len(), 7);
        }
    }
}
