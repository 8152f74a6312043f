//! Admission gate: cheap pre-checks on the raw text, then the
//! responsible/reason check on the extracted candidate.

use serde::Serialize;
use std::fmt;

use crate::message_parser::extract_fields;
use crate::report_model::ReportCandidate;

const COMMAND_PREFIXES: &[char] = &['/', '!'];
const THROWAWAY_PHRASES: &[&str] = &[
    "ok",
    "oi",
    "ola",
    "olá",
    "bom dia",
    "boa tarde",
    "boa noite",
    "obrigado",
    "obrigada",
    "muito obrigado",
    "muito obrigada",
    "valeu",
    "beleza",
    "blz",
    "teste",
    "testando",
    "ok obrigado",
    "ok obrigada",
    "bom dia pessoal",
    "boa tarde pessoal",
    "boa noite pessoal",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateLimits {
    pub min_message_len: usize,
    pub min_responsible_len: usize,
    pub min_reason_len: usize,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            min_message_len: 10,
            min_responsible_len: 3,
            min_reason_len: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Empty,
    TooShort,
    NumericOnly,
    Command,
    Throwaway,
    MissingResponsible,
    ResponsibleTooShort,
    MissingReason,
    ReasonTooShort,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooShort => "too_short",
            Self::NumericOnly => "numeric_only",
            Self::Command => "command",
            Self::Throwaway => "throwaway",
            Self::MissingResponsible => "missing_responsible",
            Self::ResponsibleTooShort => "responsible_too_short",
            Self::MissingReason => "missing_reason",
            Self::ReasonTooShort => "reason_too_short",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_numeric_only(text: &str) -> bool {
    let mut has_digit = false;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        if c.is_ascii_digit() {
            has_digit = true;
        } else if !matches!(c, '.' | ',' | '-' | '+' | '/') {
            return false;
        }
    }
    has_digit
}

fn is_throwaway(text: &str) -> bool {
    let folded = text
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    THROWAWAY_PHRASES.contains(&folded.as_str())
}

/// Checks that run before extraction. Order matters only for which reason
/// is reported.
pub fn pre_gate(text: &str, limits: &GateLimits) -> Result<(), RejectReason> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RejectReason::Empty);
    }
    if trimmed.starts_with(COMMAND_PREFIXES) {
        return Err(RejectReason::Command);
    }
    if is_numeric_only(trimmed) {
        return Err(RejectReason::NumericOnly);
    }
    if is_throwaway(trimmed) {
        return Err(RejectReason::Throwaway);
    }
    if trimmed.chars().count() < limits.min_message_len {
        return Err(RejectReason::TooShort);
    }
    Ok(())
}

fn check_len(
    value: Option<&str>,
    min_len: usize,
    missing: RejectReason,
    too_short: RejectReason,
) -> Result<(), RejectReason> {
    let value = value.map(str::trim).ok_or(missing)?;
    if value.chars().count() < min_len {
        return Err(too_short);
    }
    Ok(())
}

pub fn validate_candidate(
    candidate: &ReportCandidate,
    limits: &GateLimits,
) -> Result<(), RejectReason> {
    check_len(
        candidate.responsible.as_deref(),
        limits.min_responsible_len,
        RejectReason::MissingResponsible,
        RejectReason::ResponsibleTooShort,
    )?;
    check_len(
        candidate.reason.as_deref(),
        limits.min_reason_len,
        RejectReason::MissingReason,
        RejectReason::ReasonTooShort,
    )
}

pub fn validate(candidate: Option<&ReportCandidate>, limits: &GateLimits) -> bool {
    candidate.is_some_and(|c| validate_candidate(c, limits).is_ok())
}

/// Pre-gate, extraction and validation in one step. Shared by live ingestion
/// and recovery.
pub fn parse_report(text: &str, limits: &GateLimits) -> Result<ReportCandidate, RejectReason> {
    pre_gate(text, limits)?;
    let candidate = extract_fields(text);
    validate_candidate(&candidate, limits)?;
    Ok(candidate)
}
