//! Field extraction from free-text error reports.
//!
//! Each field owns an ordered list of label patterns. The evaluator walks the
//! list and keeps the first capture that survives normalization, so more
//! specific labels must come before generic ones. Adding a message variant
//! means adding a label here, nothing else.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

use crate::report_model::{Marketplace, ReportCandidate, PLACEHOLDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportField {
    Responsible,
    Account,
    SaleId,
    Sku,
    Reason,
    Cost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueShape {
    Text,
    /// Keep only the first run of digits; no digits means no match.
    Digits,
}

#[derive(Debug)]
struct FieldRuleSpec {
    field: ReportField,
    shape: ValueShape,
    labels: &'static [&'static str],
}

const FIELD_RULE_SPECS: &[FieldRuleSpec] = &[
    FieldRuleSpec {
        field: ReportField::Responsible,
        shape: ValueShape::Text,
        labels: &[
            r"respons[áa]vel\s+pelo\s+erro",
            r"respons[áa]vel\s+pela\s+falha",
            r"setor\s+respons[áa]vel",
            r"respons[áa]veis",
            r"respons[áa]vel",
            r"culpado",
        ],
    },
    FieldRuleSpec {
        field: ReportField::Account,
        shape: ValueShape::Text,
        labels: &[
            r"conta\s+da\s+venda",
            r"conta\s+/\s+loja",
            r"conta",
            r"loja",
            r"canal",
        ],
    },
    FieldRuleSpec {
        field: ReportField::SaleId,
        shape: ValueShape::Digits,
        labels: &[
            r"id\s+da\s+venda",
            r"n[úu]mero\s+da\s+venda",
            r"n[º°o]\.?\s*da\s+venda",
            r"id\s+do\s+pedido",
            r"venda",
            r"pedido",
        ],
    },
    FieldRuleSpec {
        field: ReportField::Sku,
        shape: ValueShape::Text,
        labels: &[r"sku\s+do\s+produto", r"c[óo]digo\s+do\s+produto", r"sku"],
    },
    FieldRuleSpec {
        field: ReportField::Reason,
        shape: ValueShape::Text,
        labels: &[
            r"motivo\s+do\s+erro",
            r"descri[çc][ãa]o\s+do\s+erro",
            r"motivo",
            r"descri[çc][ãa]o",
            r"problema",
            r"erro",
        ],
    },
    FieldRuleSpec {
        field: ReportField::Cost,
        shape: ValueShape::Text,
        labels: &[
            r"custo\s+do\s+erro",
            r"custos?\s+extras?",
            r"custos?",
            r"preju[íi]zo",
            r"valor",
        ],
    },
];

const MARKETPLACE_KEYWORDS: &[(Marketplace, &[&str])] = &[
    (
        Marketplace::MercadoLivre,
        &["mercado livre", "mercadolivre", "meli", "ml"],
    ),
    (Marketplace::Shopee, &["shopee"]),
    (Marketplace::Amazon, &["amazon", "amz"]),
    (Marketplace::Magalu, &["magalu", "magazine luiza"]),
];

#[derive(Debug)]
struct CompiledFieldRules {
    field: ReportField,
    shape: ValueShape,
    patterns: Vec<Regex>,
}

const LABEL_PREFIX: &str = r"[ \t>*_~•\-]*";
const LABEL_SEPARATOR: &str = r"[ \t*_~]*[:=\-–—]";

fn label_pattern(label: &str) -> String {
    // Label at line start (bullets/markdown allowed), a separator, then the value.
    format!(r"(?im)^{LABEL_PREFIX}(?:{label}){LABEL_SEPARATOR}[ \t]*(.*)$")
}

fn compiled_field_rules() -> &'static [CompiledFieldRules] {
    static RULES: OnceLock<Vec<CompiledFieldRules>> = OnceLock::new();
    RULES.get_or_init(|| {
        FIELD_RULE_SPECS
            .iter()
            .map(|spec| CompiledFieldRules {
                field: spec.field,
                shape: spec.shape,
                patterns: spec
                    .labels
                    .iter()
                    .map(|label| Regex::new(&label_pattern(label)).expect("invalid field label regex"))
                    .collect(),
            })
            .collect()
    })
}

/// Matches a line that opens with any known field label.
fn label_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternatives = FIELD_RULE_SPECS
            .iter()
            .flat_map(|spec| spec.labels.iter().copied())
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)^{LABEL_PREFIX}(?:{alternatives}){LABEL_SEPARATOR}"))
            .expect("invalid label line regex")
    })
}

fn marketplace_res() -> &'static [(Marketplace, Regex)] {
    static RES: OnceLock<Vec<(Marketplace, Regex)>> = OnceLock::new();
    RES.get_or_init(|| {
        MARKETPLACE_KEYWORDS
            .iter()
            .map(|(marketplace, keywords)| {
                let alternatives = keywords
                    .iter()
                    .map(|kw| regex::escape(kw).replace(' ', r"\s+"))
                    .collect::<Vec<_>>()
                    .join("|");
                let re = Regex::new(&format!(r"(?i)\b(?:{alternatives})\b"))
                    .expect("invalid marketplace regex");
                (*marketplace, re)
            })
            .collect()
    })
}

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("invalid ws regex"))
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("invalid digits regex"))
}

fn amount_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:[.,]\d+)*").expect("invalid amount regex"))
}

fn trim_text(s: &str) -> String {
    ws_re().replace_all(s.trim(), " ").trim().to_string()
}

/// Strips emphasis markers, keeps the first line and trims it.
/// Returns `None` for empty values and the `-` placeholder.
pub fn normalize_value(raw: &str) -> Option<String> {
    let first_line = raw.lines().next().unwrap_or_default();
    let stripped = first_line
        .chars()
        .filter(|c| !matches!(c, '*' | '~' | '`'))
        .collect::<String>();
    let value = trim_text(stripped.trim_matches(|c: char| c == '_' || c.is_whitespace()));
    if value.is_empty() || value == PLACEHOLDER {
        return None;
    }
    Some(value)
}

fn shape_value(shape: ValueShape, value: String) -> Option<String> {
    match shape {
        ValueShape::Text => Some(value),
        ValueShape::Digits => digits_re().find(&value).map(|m| m.as_str().to_string()),
    }
}

fn is_blank_capture(raw: &str) -> bool {
    raw.chars()
        .all(|c| c.is_whitespace() || matches!(c, '*' | '_' | '~' | '`'))
}

/// First non-blank line after the label line, unless it is itself a label.
fn next_value_line(rest: &str) -> Option<&str> {
    let line = rest.lines().skip(1).find(|l| !l.trim().is_empty())?;
    (!label_line_re().is_match(line)).then_some(line)
}

/// Breaks `Label: a | Label: b` into one labelled line per field. A `|`
/// that is not followed by a label stays part of the value.
fn split_inline_labels(text: &str) -> Cow<'_, str> {
    if !text.contains('|') {
        return Cow::Borrowed(text);
    }
    let lines = text
        .lines()
        .map(|line| {
            let mut segments = line.split('|');
            let mut out = segments.next().unwrap_or_default().to_string();
            for segment in segments {
                if label_line_re().is_match(segment) {
                    out.push('\n');
                } else {
                    out.push('|');
                }
                out.push_str(segment);
            }
            out
        })
        .collect::<Vec<_>>();
    Cow::Owned(lines.join("\n"))
}

fn first_match(text: &str, rules: &CompiledFieldRules) -> Option<String> {
    rules.patterns.iter().find_map(|re| {
        re.captures_iter(text).find_map(|caps| {
            let inline = caps.get(1)?;
            let raw = if is_blank_capture(inline.as_str()) {
                next_value_line(&text[inline.end()..])?
            } else {
                inline.as_str()
            };
            normalize_value(raw).and_then(|v| shape_value(rules.shape, v))
        })
    })
}

/// Value of a single field, using the same rules as [`extract_fields`].
pub fn extract_field(text: &str, field: ReportField) -> Option<String> {
    let text = split_inline_labels(text);
    compiled_field_rules()
        .iter()
        .find(|rules| rules.field == field)
        .and_then(|rules| first_match(&text, rules))
}

/// Normalizes a numeric token to a dot decimal. The right-most of `,`/`.`
/// is the decimal separator when both appear; a repeated separator is a
/// thousands separator.
pub fn normalize_decimal_token(token: &str) -> String {
    let last_comma = token.rfind(',');
    let last_dot = token.rfind('.');
    match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (Some(_), None) if token.matches(',').count() > 1 => token.replace(',', ""),
        (Some(_), None) => token.replace(',', "."),
        (None, Some(_)) if token.matches('.').count() > 1 => token.replace('.', ""),
        _ => token.to_string(),
    }
}

/// First numeric token in `text`, normalized with [`normalize_decimal_token`].
pub fn first_amount_token(text: &str) -> Option<String> {
    amount_token_re()
        .find(text)
        .map(|m| normalize_decimal_token(m.as_str()))
}

pub fn infer_marketplace(account: &str) -> Option<Marketplace> {
    marketplace_res()
        .iter()
        .find(|(_, re)| re.is_match(account))
        .map(|(marketplace, _)| *marketplace)
}

pub fn extract_fields(text: &str) -> ReportCandidate {
    let text = split_inline_labels(text);
    let mut candidate = ReportCandidate::default();
    for rules in compiled_field_rules() {
        let Some(value) = first_match(&text, rules) else {
            continue;
        };
        match rules.field {
            ReportField::Responsible => candidate.responsible = Some(value),
            ReportField::Account => candidate.account = Some(value),
            ReportField::SaleId => candidate.sale_id = Some(value),
            ReportField::Sku => candidate.sku = Some(value),
            ReportField::Reason => candidate.reason = Some(value),
            ReportField::Cost => {
                candidate.cost_total = first_amount_token(&value);
                candidate.cost_text = Some(value);
            }
        }
    }
    candidate.marketplace = candidate.account.as_deref().and_then(infer_marketplace);
    tracing::debug!(
        template = candidate.template().as_str(),
        marketplace = ?candidate.marketplace,
        "extracted report fields"
    );
    candidate
}
