//! Test cases and their results
//!
//! A [`TestCase`] is the oracle's intent for one test; a [`TestResult`] is
//! what happened when it ran plus the oracle's judgement of that.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::ai::response::extract_json_array;

use super::component::Component;
use super::finding::{lenient_severity, Severity};
use super::verdict::Verdict;

fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    })
}

fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default, alias = "risk_type", deserialize_with = "text_or_empty")]
    pub risk_type: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub purpose: String,
    #[serde(default, alias = "arguments", deserialize_with = "object_or_empty")]
    pub parameters: Map<String, Value>,
    #[serde(default, alias = "expected_behavior", deserialize_with = "text_or_empty")]
    pub expected_behavior: String,
    #[serde(default, alias = "judgment_criteria", deserialize_with = "text_or_empty")]
    pub judgment_criteria: String,
    #[serde(
        default,
        alias = "riskLevel",
        alias = "risk_level",
        alias = "risk_level_hint",
        deserialize_with = "lenient_severity"
    )]
    pub risk_level_hint: Severity,
    #[serde(default, alias = "risk_description", deserialize_with = "text_or_empty")]
    pub risk_description: String,
}

impl TestCase {
    /// The single test run against a component without parameters.
    pub fn direct_access(component: &Component) -> Self {
        Self {
            risk_type: "direct_access".to_string(),
            purpose: format!("Direct access to {} without arguments", component.kind),
            parameters: Map::new(),
            expected_behavior: "Returns only data appropriate for an unauthenticated caller"
                .to_string(),
            judgment_criteria: "Output must not disclose secrets, system details or other users' data"
                .to_string(),
            risk_level_hint: Severity::Low,
            risk_description: String::new(),
        }
    }

    /// Harmless fallback used when generation output cannot be parsed:
    /// every declared parameter set to the empty string.
    pub fn default_case(component: &Component) -> Self {
        let parameters = component
            .parameter_analysis
            .names()
            .map(|name| (name.to_string(), Value::String(String::new())))
            .collect();
        Self {
            risk_type: "baseline".to_string(),
            purpose: "Baseline call with empty parameter values".to_string(),
            parameters,
            expected_behavior: "Input is rejected or handled without side effects".to_string(),
            judgment_criteria: "Errors must not leak internal details".to_string(),
            risk_level_hint: Severity::Low,
            risk_description: String::new(),
        }
    }

    /// `"Test {n}: {purpose}"`, numbered from 1
    pub fn label(&self, index: usize) -> String {
        let purpose = if self.purpose.is_empty() {
            &self.risk_type
        } else {
            &self.purpose
        };
        format!("Test {}: {}", index + 1, purpose)
    }
}

/// What the target returned for one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TestOutcome {
    Success { raw: Value },
    Error { message: String },
}

impl TestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TestOutcome::Success { .. })
    }

    /// Text shown to the oracle
    pub fn describe(&self) -> String {
        match self {
            TestOutcome::Success { raw } => {
                serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string())
            }
            TestOutcome::Error { message } => format!("ERROR: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_case_label: String,
    pub test_case: TestCase,
    /// Arguments actually sent (for resources, the resolved URI)
    pub parameters_used: Value,
    pub outcome: TestOutcome,
    pub risk_assessment: Verdict,
    /// Execution succeeded and the verdict is low
    pub passed: bool,
    pub duration_ms: u64,
}

impl TestResult {
    pub fn new(
        label: String,
        test_case: TestCase,
        parameters_used: Value,
        outcome: TestOutcome,
        risk_assessment: Verdict,
        duration_ms: u64,
    ) -> Self {
        let passed = outcome.is_success() && risk_assessment.is_low();
        Self {
            test_case_label: label,
            test_case,
            parameters_used,
            outcome,
            risk_assessment,
            passed,
            duration_ms,
        }
    }
}

/// Outcome of reading generated test cases
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedTestCases {
    /// Whole text was a JSON array
    Strict(Vec<TestCase>),
    /// An array literal was found inside surrounding text
    Embedded(Vec<TestCase>),
    /// Nothing usable; one default case substituted
    Fallback(TestCase),
}

impl ParsedTestCases {
    pub fn into_cases(self) -> Vec<TestCase> {
        match self {
            ParsedTestCases::Strict(cases) | ParsedTestCases::Embedded(cases) => cases,
            ParsedTestCases::Fallback(case) => vec![case],
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedTestCases::Fallback(_))
    }
}

/// Elements that are not objects are dropped. An array with elements of
/// which none survive counts as unparseable; an empty array is valid.
fn cases_from_array(value: &Value) -> Option<Vec<TestCase>> {
    let items = value.as_array()?;
    let cases: Vec<TestCase> = items
        .iter()
        .filter(|v| v.is_object())
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect();
    if cases.is_empty() && !items.is_empty() {
        return None;
    }
    Some(cases)
}

pub fn parse_test_cases(text: &str, component: &Component) -> ParsedTestCases {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if let Some(cases) = cases_from_array(&value) {
            return ParsedTestCases::Strict(cases);
        }
    }
    if let Some(cases) = extract_json_array(text).as_ref().and_then(cases_from_array) {
        return ParsedTestCases::Embedded(cases);
    }
    ParsedTestCases::Fallback(TestCase::default_case(component))
}
