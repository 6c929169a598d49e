//! Oracle verdict parsing
//!
//! A verdict is read in two tiers. A JSON object with a recognizable risk
//! level wins; otherwise the raw text is classified by keyword. The tier
//! that produced the verdict is kept in [`Confidence`] so reports can show
//! which judgements are structured and which are guesses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::response::json_object_candidates;

use super::finding::{value_to_text, Severity};

/// How a verdict was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Parsed from a JSON verdict
    Structured,
    /// Keyword classification of free text
    Heuristic,
    /// No oracle judgement (disabled or failed)
    Unevaluated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub risk_level: Severity,
    pub description: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub recommendation: String,
    pub confidence: Confidence,
}

impl Verdict {
    /// Low-risk placeholder used when no judgement could be obtained.
    pub fn unevaluated(reason: impl Into<String>) -> Self {
        Self {
            risk_level: Severity::Low,
            description: reason.into(),
            evidence: String::new(),
            recommendation: String::new(),
            confidence: Confidence::Unevaluated,
        }
    }

    pub fn is_low(&self) -> bool {
        self.risk_level == Severity::Low
    }
}

/// Keyword table, highest severity first. The first row with a matching
/// term decides the level; matching is case-insensitive substring search.
pub const KEYWORD_TABLE: &[(Severity, &[&str])] = &[
    (
        Severity::Critical,
        &["critical", "severe", "严重", "致命"],
    ),
    (
        Severity::High,
        &[
            "vulnerab",
            "attack",
            "exploit",
            "injection",
            "high risk",
            "high-risk",
            "漏洞",
            "攻击",
            "高危",
            "高风险",
        ],
    ),
    (
        Severity::Medium,
        &["warning", "caution", "suspicious", "警告", "注意", "可疑", "中危", "中风险"],
    ),
    (
        Severity::Low,
        &["safe", "pass", "no issue", "no risk", "安全", "通过", "低危", "无风险"],
    ),
];

/// Words that cancel a term placed directly after them ("no critical issues").
const NEGATIONS: &[&str] = &["no ", "not ", "non-", "without ", "未发现", "没有", "无"];

fn negated(before: &str) -> bool {
    NEGATIONS.iter().any(|neg| match before.strip_suffix(neg) {
        // ascii negations must start a word: "piano " is not "no "
        Some(head) if neg.is_ascii() => !head.chars().next_back().is_some_and(char::is_alphanumeric),
        Some(_) => true,
        None => false,
    })
}

/// True when `term` occurs in `lower` at least once without a negation
/// directly in front of it.
fn affirms(lower: &str, term: &str) -> bool {
    lower
        .match_indices(term)
        .any(|(at, _)| !negated(&lower[..at]))
}

/// Classify free text by keyword; unmatched text is low.
pub fn classify_keywords(text: &str) -> Severity {
    let lower = text.to_lowercase();
    KEYWORD_TABLE
        .iter()
        .find(|(_, terms)| terms.iter().any(|t| affirms(&lower, t)))
        .map(|(severity, _)| *severity)
        .unwrap_or(Severity::Low)
}

const RISK_KEYS: &[&str] = &["riskLevel", "risk_level", "risk", "severity", "level"];
const DESCRIPTION_KEYS: &[&str] = &["description", "analysis", "reason", "summary"];
const EVIDENCE_KEYS: &[&str] = &["evidence", "details"];
const RECOMMENDATION_KEYS: &[&str] = &["recommendation", "mitigation", "suggestion"];

fn first_text(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .map(value_to_text)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// The first JSON object in `text` that carries a recognizable risk level.
/// Replies often quote the target's output before the verdict, so objects
/// without one are skipped.
fn structured_verdict(text: &str) -> Option<Verdict> {
    json_object_candidates(text)
        .iter()
        .filter_map(Value::as_object)
        .find_map(verdict_from_object)
}

fn verdict_from_object(obj: &serde_json::Map<String, Value>) -> Option<Verdict> {
    let risk_level = RISK_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .find_map(Severity::parse_label)?;

    Some(Verdict {
        risk_level,
        description: first_text(obj, DESCRIPTION_KEYS),
        evidence: first_text(obj, EVIDENCE_KEYS),
        recommendation: first_text(obj, RECOMMENDATION_KEYS),
        confidence: Confidence::Structured,
    })
}

const HEURISTIC_EXCERPT_CHARS: usize = 500;

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(HEURISTIC_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Read the oracle's evaluation text as a [`Verdict`].
pub fn parse_verdict(text: &str) -> Verdict {
    if let Some(verdict) = structured_verdict(text) {
        return verdict;
    }

    tracing::debug!("Verdict is not structured JSON; falling back to keyword classification");
    Verdict {
        risk_level: classify_keywords(text),
        description: excerpt(text),
        evidence: String::new(),
        recommendation: String::new(),
        confidence: Confidence::Heuristic,
    }
}
