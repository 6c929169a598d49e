//! Severity and issue records
//!
//! Every problem the scanner reports, whichever stage found it, is an
//! [`IssueRecord`]. The component kind it was found on decides how it is
//! labelled downstream (vulnerability for tools, threat for prompts, risk
//! for resources).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Risk severity, totally ordered `Low < Medium < High < Critical`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Accepts the labels models actually emit: any case, `info`/`none` as
    /// low, `moderate` as medium, and the Chinese level names.
    pub fn parse_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        let label = label.trim_end_matches(" risk").trim_end_matches("风险");
        match label {
            "critical" | "severe" | "严重" | "致命" => Some(Severity::Critical),
            "high" | "高" | "高危" => Some(Severity::High),
            "medium" | "moderate" | "中" | "中危" | "中等" => Some(Severity::Medium),
            "low" | "info" | "informational" | "none" | "safe" | "低" | "低危" | "无" => {
                Some(Severity::Low)
            }
            _ => None,
        }
    }

    /// Highest severity in `iter`, `Low` when empty.
    pub fn max_of(iter: impl IntoIterator<Item = Severity>) -> Severity {
        iter.into_iter().max().unwrap_or_default()
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_label(s).ok_or_else(|| format!("unknown severity '{}'", s))
    }
}

/// Deserialize a severity from whatever the oracle wrote, defaulting to low.
pub(crate) fn lenient_severity<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(Severity::parse_label)
        .unwrap_or_default())
}

/// Component category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Tool,
    Prompt,
    Resource,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Tool => "tool",
            ComponentKind::Prompt => "prompt",
            ComponentKind::Resource => "resource",
        }
    }

    /// Label used for issues found on this kind of component
    pub fn issue_label(&self) -> &'static str {
        match self {
            ComponentKind::Tool => "vulnerability",
            ComponentKind::Prompt => "threat",
            ComponentKind::Resource => "risk",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stage that produced an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSource {
    StaticAnalysis,
    DynamicTest,
    Passive,
}

impl IssueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSource::StaticAnalysis => "static_analysis",
            IssueSource::DynamicTest => "dynamic_test",
            IssueSource::Passive => "passive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    /// Issue category, e.g. `command_injection`
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default)]
    pub recommendation: String,
    pub source: IssueSource,
    pub source_type: ComponentKind,
    /// Label of the test case that exposed the issue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case: Option<String>,
}

impl IssueRecord {
    pub fn new(
        source_type: ComponentKind,
        source: IssueSource,
        issue_type: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            issue_type: issue_type.into(),
            severity,
            description: description.into(),
            evidence: None,
            recommendation: String::new(),
            source,
            source_type,
            test_case: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = recommendation.into();
        self
    }

    pub fn with_test_case(mut self, label: impl Into<String>) -> Self {
        self.test_case = Some(label.into());
        self
    }

    /// Build an issue from one element of an oracle's issue array. Field
    /// names vary between models, so several spellings are accepted. Returns
    /// `None` when the element carries no description at all.
    pub fn from_oracle_value(value: &Value, kind: ComponentKind) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| obj.get(*k))
                .map(value_to_text)
                .find(|s| !s.is_empty())
        };

        let description = text(&["description", "title", "issue", "detail", "details"])?;
        let severity = text(&["severity", "riskLevel", "risk_level", "level"])
            .and_then(|s| Severity::parse_label(&s))
            .unwrap_or_default();
        let issue_type = text(&["type", "riskType", "risk_type", "category"])
            .unwrap_or_else(|| kind.issue_label().to_string());

        let mut issue = IssueRecord::new(
            kind,
            IssueSource::StaticAnalysis,
            issue_type,
            severity,
            description,
        );
        issue.evidence = text(&["evidence", "location", "example"]);
        issue.recommendation =
            text(&["recommendation", "mitigation", "remediation", "suggestion"]).unwrap_or_default();
        Some(issue)
    }
}

/// Flatten a JSON value to display text: strings verbatim, arrays joined
/// by newlines, anything else as compact JSON.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
