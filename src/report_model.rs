use chrono::{DateTime, Local, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder shown for an absent field or an untouched cost category.
pub const PLACEHOLDER: &str = "-";

/// One chat message as delivered by the transport layer.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Marketplace {
    #[serde(rename = "ML")]
    MercadoLivre,
    Shopee,
    Amazon,
    Magalu,
}

impl Marketplace {
    pub fn label(self) -> &'static str {
        match self {
            Self::MercadoLivre => "ML",
            Self::Shopee => "Shopee",
            Self::Amazon => "Amazon",
            Self::Magalu => "Magalu",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim() {
            "ML" => Some(Self::MercadoLivre),
            "Shopee" => Some(Self::Shopee),
            "Amazon" => Some(Self::Amazon),
            "Magalu" => Some(Self::Magalu),
            _ => None,
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which optional fields a report managed to populate. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordTemplate {
    Complete,
    CostSimple,
    Basic,
    Unknown,
}

impl RecordTemplate {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::CostSimple => "cost-simple",
            Self::Basic => "basic",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str_lossy(raw: &str) -> Self {
        match raw.trim() {
            "complete" => Self::Complete,
            "cost-simple" => Self::CostSimple,
            "basic" => Self::Basic,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOrigin {
    Live,
    Recovered,
}

impl RecordOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Recovered => "recovered",
        }
    }

    pub fn from_str_lossy(raw: &str) -> Self {
        if raw.trim() == "recovered" {
            Self::Recovered
        } else {
            Self::Live
        }
    }
}

/// Fields pulled out of a message before validation; everything is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportCandidate {
    pub responsible: Option<String>,
    pub account: Option<String>,
    pub marketplace: Option<Marketplace>,
    pub sale_id: Option<String>,
    pub sku: Option<String>,
    pub reason: Option<String>,
    pub cost_text: Option<String>,
    pub cost_total: Option<String>,
}

impl ReportCandidate {
    pub fn template(&self) -> RecordTemplate {
        let has_core = self.responsible.is_some() && self.reason.is_some();
        let has_account = self.account.is_some();
        if has_core && has_account && self.sale_id.is_some() && self.sku.is_some() {
            RecordTemplate::Complete
        } else if has_core && has_account && (self.sku.is_some() || self.cost_text.is_some()) {
            RecordTemplate::CostSimple
        } else if has_core {
            RecordTemplate::Basic
        } else {
            RecordTemplate::Unknown
        }
    }
}

/// A persisted, immutable error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub responsible: String,
    pub account: Option<String>,
    pub marketplace: Option<Marketplace>,
    pub sale_id: Option<String>,
    pub sku: Option<String>,
    pub reason: String,
    pub cost_text: Option<String>,
    pub cost_total: Option<String>,
    pub template: RecordTemplate,
    pub recorded_at: String,
    pub origin: RecordOrigin,
}

impl ErrorRecord {
    /// Builds the record from a candidate that already passed validation.
    /// Returns `None` when a required field is missing.
    pub(crate) fn from_candidate(
        candidate: ReportCandidate,
        origin: RecordOrigin,
        recorded_at: DateTime<Local>,
    ) -> Option<Self> {
        let template = candidate.template();
        Some(Self {
            responsible: candidate.responsible?,
            account: candidate.account,
            marketplace: candidate.marketplace,
            sale_id: candidate.sale_id,
            sku: candidate.sku,
            reason: candidate.reason?,
            cost_text: candidate.cost_text,
            cost_total: candidate.cost_total,
            template,
            recorded_at: recorded_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            origin,
        })
    }

    /// Calendar date of `recorded_at` in the offset it was written with.
    pub fn recorded_date(&self) -> Option<NaiveDate> {
        DateTime::parse_from_rfc3339(self.recorded_at.trim())
            .map(|dt| dt.date_naive())
            .ok()
    }
}
