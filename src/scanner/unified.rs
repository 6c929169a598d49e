//! Unified risk view
//!
//! Flattens a report into one list of [`UnifiedRiskItem`]s so downstream
//! statistics never branch on the per-kind result lists. Items are a pure
//! projection of the report: ids are derived from position, so collecting
//! the same report twice yields the same items.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::finding::{ComponentKind, IssueRecord, IssueSource, Severity};
use super::results::{ComponentResult, ScanReport, ScanType, StaticAnalysis};
use super::testcase::TestResult;
use super::verdict::classify_keywords;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskType {
    Vulnerability,
    Threat,
    Risk,
    TestFailure,
    LlmAnalysis,
}

impl RiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskType::Vulnerability => "vulnerability",
            RiskType::Threat => "threat",
            RiskType::Risk => "risk",
            RiskType::TestFailure => "test_failure",
            RiskType::LlmAnalysis => "llm_analysis",
        }
    }

    /// Type for an issue found by testing or observation
    pub fn for_kind(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Tool => RiskType::Vulnerability,
            ComponentKind::Prompt => RiskType::Threat,
            ComponentKind::Resource => RiskType::Risk,
        }
    }
}

impl std::fmt::Display for RiskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedRiskItem {
    /// `kind:name:scanType:ordinal`
    pub id: String,
    /// Component name
    pub source: String,
    pub source_type: ComponentKind,
    pub scan_type: ScanType,
    pub risk_type: RiskType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub evidence: String,
    pub recommendation: String,
    pub timestamp: DateTime<Utc>,
    /// The record this item was projected from
    pub raw_data: Value,
}

/// Queryable list of every risk in a report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRiskCollector {
    items: Vec<UnifiedRiskItem>,
}

impl UnifiedRiskCollector {
    pub fn collect(report: &ScanReport) -> Self {
        let items = report.all_results().flat_map(collect_component).collect();
        Self { items }
    }

    pub fn items(&self) -> &[UnifiedRiskItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn counts_by_severity(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn counts_by_type(&self) -> BTreeMap<RiskType, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.risk_type).or_insert(0) += 1;
        }
        counts
    }

    /// Items at or above `min`, highest severity first
    pub fn filter_min_severity(&self, min: Severity) -> Vec<&UnifiedRiskItem> {
        let mut items: Vec<&UnifiedRiskItem> =
            self.items.iter().filter(|i| i.severity >= min).collect();
        items.sort_by(|a, b| b.severity.cmp(&a.severity));
        items
    }
}

fn collect_component(result: &ComponentResult) -> Vec<UnifiedRiskItem> {
    let mut items = Vec::new();
    let mut next_id = {
        let prefix = format!("{}:{}:{}", result.kind, result.identity(), result.scan_type.as_str());
        let mut ordinal = 0usize;
        move || {
            let id = format!("{}:{}", prefix, ordinal);
            ordinal += 1;
            id
        }
    };

    for issue in &result.issues {
        items.push(issue_item(result, issue, next_id()));
    }

    if let StaticAnalysis::Raw(text) = &result.static_analysis {
        items.push(UnifiedRiskItem {
            id: next_id(),
            source: result.name.clone(),
            source_type: result.kind,
            scan_type: result.scan_type,
            risk_type: RiskType::LlmAnalysis,
            severity: classify_keywords(text),
            title: format!("Unstructured analysis of {} {}", result.kind, result.name),
            description: text.clone(),
            evidence: String::new(),
            recommendation: String::new(),
            timestamp: result.timestamp,
            raw_data: Value::String(text.clone()),
        });
    }

    for test in result.failed_tests() {
        let linked = result
            .issues
            .iter()
            .any(|i| i.test_case.as_deref() == Some(test.test_case_label.as_str()));
        if !linked {
            items.push(test_failure_item(result, test, next_id()));
        }
    }

    items
}

fn issue_item(result: &ComponentResult, issue: &IssueRecord, id: String) -> UnifiedRiskItem {
    let risk_type = match issue.source {
        IssueSource::StaticAnalysis => RiskType::LlmAnalysis,
        IssueSource::DynamicTest | IssueSource::Passive => RiskType::for_kind(issue.source_type),
    };
    UnifiedRiskItem {
        id,
        source: result.name.clone(),
        source_type: issue.source_type,
        scan_type: result.scan_type,
        risk_type,
        severity: issue.severity,
        title: issue.issue_type.clone(),
        description: issue.description.clone(),
        evidence: issue.evidence.clone().unwrap_or_default(),
        recommendation: issue.recommendation.clone(),
        timestamp: result.timestamp,
        raw_data: serde_json::to_value(issue).unwrap_or(Value::Null),
    }
}

fn test_failure_item(result: &ComponentResult, test: &TestResult, id: String) -> UnifiedRiskItem {
    let verdict = &test.risk_assessment;
    let description = if test.outcome.is_success() {
        verdict.description.clone()
    } else {
        test.outcome.describe()
    };
    UnifiedRiskItem {
        id,
        source: result.name.clone(),
        source_type: result.kind,
        scan_type: result.scan_type,
        risk_type: RiskType::TestFailure,
        severity: verdict.risk_level,
        title: test.test_case_label.clone(),
        description,
        evidence: verdict.evidence.clone(),
        recommendation: verdict.recommendation.clone(),
        timestamp: result.timestamp,
        raw_data: serde_json::to_value(test).unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::testcase::{TestCase, TestOutcome};
    use crate::scanner::verdict::Verdict;
    use serde_json::json;

    fn sample_report() -> ScanReport {
        let mut report = ScanReport::new("server");

        let mut tool = ComponentResult::empty(ComponentKind::Tool, "exec", None, ScanType::Active);
        tool.add_issue(IssueRecord::new(
            ComponentKind::Tool,
            IssueSource::StaticAnalysis,
            "command_injection",
            Severity::High,
            "Shell command built from input",
        ));
        tool.add_issue(
            IssueRecord::new(
                ComponentKind::Tool,
                IssueSource::DynamicTest,
                "command_injection",
                Severity::Critical,
                "Injected command ran",
            )
            .with_test_case("Test 1: chain"),
        );
        let case = TestCase {
            purpose: "chain".to_string(),
            ..Default::default()
        };
        let high = Verdict {
            risk_level: Severity::Critical,
            ..Verdict::unevaluated("")
        };
        tool.add_test_result(TestResult::new(
            case.label(0),
            case.clone(),
            json!({}),
            TestOutcome::Success { raw: json!({}) },
            high,
            1,
        ));
        // execution failure with no issue attached
        tool.add_test_result(TestResult::new(
            case.label(1),
            case,
            json!({}),
            TestOutcome::Error {
                message: "timeout".to_string(),
            },
            Verdict::unevaluated("disabled"),
            1,
        ));
        report.upsert(tool);

        let mut prompt = ComponentResult::empty(ComponentKind::Prompt, "greet", None, ScanType::Passive);
        prompt.add_issue(IssueRecord::new(
            ComponentKind::Prompt,
            IssueSource::Passive,
            "stack_trace",
            Severity::Medium,
            "trace",
        ));
        report.upsert(prompt);

        let mut resource = ComponentResult::empty(ComponentKind::Resource, "cfg", None, ScanType::Active);
        resource.static_analysis = StaticAnalysis::Raw("This exposes a password in cleartext".to_string());
        report.upsert(resource);

        report.finalize();
        report
    }

    #[test]
    fn flattens_every_source() {
        let collector = UnifiedRiskCollector::collect(&sample_report());
        let types: Vec<RiskType> = collector.items().iter().map(|i| i.risk_type).collect();
        assert_eq!(
            types,
            vec![
                RiskType::LlmAnalysis,
                RiskType::Vulnerability,
                RiskType::TestFailure,
                RiskType::Threat,
                RiskType::LlmAnalysis,
            ]
        );
        assert_eq!(collector.items()[2].title, "Test 2: chain");
        assert_eq!(collector.items()[2].description, "ERROR: timeout");
        assert_eq!(collector.items()[3].scan_type, ScanType::Passive);
    }

    #[test]
    fn ids_are_stable_and_unique() {
        let report = sample_report();
        let first = UnifiedRiskCollector::collect(&report);
        let second = UnifiedRiskCollector::collect(&report);
        assert_eq!(first, second);

        let ids: Vec<&str> = first.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids[0], "tool:exec:active:0");
        assert_eq!(ids[2], "tool:exec:active:2");
        assert_eq!(ids[3], "prompt:greet:passive:0");
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn counts_and_filters() {
        let collector = UnifiedRiskCollector::collect(&sample_report());
        let by_type = collector.counts_by_type();
        assert_eq!(by_type[&RiskType::LlmAnalysis], 2);
        assert_eq!(by_type[&RiskType::TestFailure], 1);

        let by_severity = collector.counts_by_severity();
        assert_eq!(by_severity[&Severity::Critical], 1);

        let serious = collector.filter_min_severity(Severity::High);
        assert_eq!(serious.len(), 2);
        assert_eq!(serious[0].severity, Severity::Critical);
    }
}
