//! Scan results and risk aggregation
//!
//! A component's risk is the highest severity among its issues (low when
//! there are none); the report's overall risk is the highest component
//! risk. [`ScanReport::finalize`] recomputes both along with the summary
//! and recommendations, so it is safe to call again after merging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::component::Component;
use super::finding::{ComponentKind, IssueRecord, IssueSource, Severity};
use super::testcase::TestResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Active,
    Passive,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Active => "active",
            ScanType::Passive => "passive",
        }
    }
}

/// Static assessment outcome for one component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum StaticAnalysis {
    /// Not run (LLM analysis disabled or a passive-only result)
    #[default]
    None,
    /// Oracle answered but the answer could not be parsed
    Raw(String),
    Parsed(Vec<IssueRecord>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResult {
    pub name: String,
    pub kind: ComponentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub scan_type: ScanType,
    pub risk_level: Severity,
    pub issues: Vec<IssueRecord>,
    pub test_results: Vec<TestResult>,
    #[serde(default)]
    pub static_analysis: StaticAnalysis,
    pub timestamp: DateTime<Utc>,
}

impl ComponentResult {
    pub fn new(component: &Component) -> Self {
        Self::empty(
            component.kind,
            &component.name,
            component.uri.clone(),
            ScanType::Active,
        )
    }

    pub fn empty(kind: ComponentKind, name: &str, uri: Option<String>, scan_type: ScanType) -> Self {
        Self {
            name: name.to_string(),
            kind,
            uri,
            scan_type,
            risk_level: Severity::Low,
            issues: Vec::new(),
            test_results: Vec::new(),
            static_analysis: StaticAnalysis::None,
            timestamp: Utc::now(),
        }
    }

    pub fn add_issue(&mut self, issue: IssueRecord) {
        self.risk_level = self.risk_level.max(issue.severity);
        self.issues.push(issue);
    }

    pub fn add_test_result(&mut self, result: TestResult) {
        self.test_results.push(result);
    }

    /// `max(issue severity)`, low when there are no issues
    pub fn computed_risk(&self) -> Severity {
        Severity::max_of(self.issues.iter().map(|i| i.severity))
    }

    pub fn recompute_risk(&mut self) {
        self.risk_level = self.computed_risk();
    }

    pub fn failed_tests(&self) -> impl Iterator<Item = &TestResult> {
        self.test_results.iter().filter(|t| !t.passed)
    }

    /// Tests whose invocation itself errored
    pub fn execution_failures(&self) -> usize {
        self.test_results
            .iter()
            .filter(|t| !t.outcome.is_success())
            .count()
    }

    pub fn issues_from(&self, source: IssueSource) -> impl Iterator<Item = &IssueRecord> {
        self.issues.iter().filter(move |i| i.source == source)
    }

    /// Resources are identified by URI, tools and prompts by name.
    pub fn identity(&self) -> &str {
        self.uri.as_deref().unwrap_or(&self.name)
    }

    /// Same kind, and the same URI when both sides carry one; otherwise
    /// the same name.
    pub fn same_component(&self, other: &ComponentResult) -> bool {
        self.kind == other.kind
            && match (&self.uri, &other.uri) {
                (Some(a), Some(b)) => a == b,
                _ => self.name == other.name,
            }
    }

    /// Fold another result for the same component into this one.
    pub fn absorb(&mut self, other: ComponentResult) {
        self.issues.extend(other.issues);
        self.test_results.extend(other.test_results);
        if self.uri.is_none() {
            self.uri = other.uri;
        }
        if self.static_analysis == StaticAnalysis::None {
            self.static_analysis = other.static_analysis;
        }
        if other.scan_type == ScanType::Active {
            self.scan_type = ScanType::Active;
        }
        self.risk_level = self.risk_level.max(other.risk_level).max(self.computed_risk());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Every issue, low severity included
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl ScanSummary {
    pub fn add(&mut self, severity: Severity) {
        self.total += 1;
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub id: String,
    pub server_name: String,
    pub timestamp: DateTime<Utc>,
    pub overall_risk: Severity,
    pub tool_results: Vec<ComponentResult>,
    pub prompt_results: Vec<ComponentResult>,
    pub resource_results: Vec<ComponentResult>,
    pub summary: ScanSummary,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_analysis: Option<String>,
    pub duration_ms: u64,
}

impl ScanReport {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            server_name: server_name.into(),
            timestamp: Utc::now(),
            overall_risk: Severity::Low,
            tool_results: Vec::new(),
            prompt_results: Vec::new(),
            resource_results: Vec::new(),
            summary: ScanSummary::default(),
            recommendations: Vec::new(),
            narrative_analysis: None,
            duration_ms: 0,
        }
    }

    pub fn results(&self, kind: ComponentKind) -> &[ComponentResult] {
        match kind {
            ComponentKind::Tool => &self.tool_results,
            ComponentKind::Prompt => &self.prompt_results,
            ComponentKind::Resource => &self.resource_results,
        }
    }

    pub fn results_mut(&mut self, kind: ComponentKind) -> &mut Vec<ComponentResult> {
        match kind {
            ComponentKind::Tool => &mut self.tool_results,
            ComponentKind::Prompt => &mut self.prompt_results,
            ComponentKind::Resource => &mut self.resource_results,
        }
    }

    pub fn find(&self, kind: ComponentKind, name: &str) -> Option<&ComponentResult> {
        self.results(kind).iter().find(|r| r.name == name)
    }

    /// Tools, then prompts, then resources
    pub fn all_results(&self) -> impl Iterator<Item = &ComponentResult> {
        self.tool_results
            .iter()
            .chain(&self.prompt_results)
            .chain(&self.resource_results)
    }

    /// Resource result for `uri`
    pub fn find_uri(&self, uri: &str) -> Option<&ComponentResult> {
        self.resource_results
            .iter()
            .find(|r| r.uri.as_deref() == Some(uri))
    }

    /// Append a result produced by this scan. Components listed by the
    /// server are distinct even when their names collide.
    pub fn push(&mut self, result: ComponentResult) {
        self.results_mut(result.kind).push(result);
    }

    /// Insert `result`, folding it into an existing result for the same
    /// component (see [`ComponentResult::same_component`]) if there is one.
    pub fn upsert(&mut self, result: ComponentResult) {
        let list = self.results_mut(result.kind);
        match list.iter_mut().find(|r| r.same_component(&result)) {
            Some(existing) => existing.absorb(result),
            None => list.push(result),
        }
    }

    /// Recompute component risks, overall risk, summary and
    /// recommendations from the current results.
    pub fn finalize(&mut self) {
        for kind in [ComponentKind::Tool, ComponentKind::Prompt, ComponentKind::Resource] {
            for result in self.results_mut(kind) {
                result.recompute_risk();
            }
        }

        self.overall_risk = Severity::max_of(self.all_results().map(|r| r.risk_level));

        let mut summary = ScanSummary::default();
        for issue in self.all_results().flat_map(|r| &r.issues) {
            summary.add(issue.severity);
        }
        let execution_failures: usize = self.all_results().map(|r| r.execution_failures()).sum();

        self.recommendations = build_recommendations(&summary, execution_failures);
        self.summary = summary;
    }

    pub fn total_tests(&self) -> usize {
        self.all_results().map(|r| r.test_results.len()).sum()
    }
}

/// Deterministic advice derived from the counts alone.
pub fn build_recommendations(summary: &ScanSummary, execution_failures: usize) -> Vec<String> {
    let mut recs = Vec::new();

    if summary.critical > 0 {
        recs.push(format!(
            "Fix {} critical issue(s) immediately; do not expose this server until they are resolved.",
            summary.critical
        ));
    }
    if summary.high > 0 && summary.critical == 0 {
        recs.push(format!(
            "Prioritize remediation of {} high-severity issue(s) before the next release.",
            summary.high
        ));
    }
    if summary.medium > 0 && summary.high == 0 && summary.critical == 0 {
        recs.push(format!(
            "Review {} medium-severity issue(s) as part of regular maintenance.",
            summary.medium
        ));
    }
    if summary.total == 0 {
        recs.push(
            "No issues detected. Re-scan periodically and after every change to exposed tools, prompts or resources."
                .to_string(),
        );
    }
    if execution_failures > 0 {
        recs.push(format!(
            "{} test execution(s) failed; inspect those components manually.",
            execution_failures
        ));
    }

    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::testcase::{TestCase, TestOutcome};
    use crate::scanner::verdict::Verdict;
    use serde_json::json;

    fn issue(kind: ComponentKind, severity: Severity) -> IssueRecord {
        IssueRecord::new(kind, IssueSource::DynamicTest, "x", severity, "d")
    }

    fn result(kind: ComponentKind, name: &str, severities: &[Severity]) -> ComponentResult {
        let mut r = ComponentResult::empty(kind, name, None, ScanType::Active);
        for s in severities {
            r.add_issue(issue(kind, *s));
        }
        r
    }

    #[test]
    fn component_risk_is_max_severity() {
        let mut r = result(
            ComponentKind::Tool,
            "t",
            &[Severity::Low, Severity::High, Severity::Medium],
        );
        assert_eq!(r.risk_level, Severity::High);
        r.risk_level = Severity::Critical;
        r.recompute_risk();
        assert_eq!(r.risk_level, Severity::High);
    }

    #[test]
    fn empty_component_is_low() {
        let r = result(ComponentKind::Resource, "r", &[]);
        assert_eq!(r.computed_risk(), Severity::Low);
    }

    #[test]
    fn overall_risk_is_max_of_components() {
        let mut report = ScanReport::new("srv");
        report.upsert(result(ComponentKind::Tool, "a", &[Severity::Medium]));
        report.upsert(result(ComponentKind::Prompt, "b", &[Severity::Critical]));
        report.upsert(result(ComponentKind::Resource, "c", &[]));
        report.finalize();

        assert_eq!(report.overall_risk, Severity::Critical);
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.critical, 1);
        assert!(report.recommendations[0].contains("immediately"));
    }

    #[test]
    fn empty_report_is_low_with_rescan_advice() {
        let mut report = ScanReport::new("srv");
        report.finalize();
        assert_eq!(report.overall_risk, Severity::Low);
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].contains("Re-scan periodically"));
    }

    #[test]
    fn low_issues_count_toward_total() {
        let mut report = ScanReport::new("srv");
        report.upsert(result(ComponentKind::Tool, "a", &[Severity::Low, Severity::Low]));
        report.finalize();
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.low, 2);
        assert_eq!(report.overall_risk, Severity::Low);
        // low-only findings get no severity advice and no re-scan line
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn high_without_critical_is_prioritized() {
        let summary = ScanSummary {
            total: 2,
            high: 1,
            medium: 1,
            ..Default::default()
        };
        let recs = build_recommendations(&summary, 0);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].starts_with("Prioritize"));
    }

    #[test]
    fn execution_failures_are_mentioned() {
        let mut report = ScanReport::new("srv");
        let mut r = result(ComponentKind::Tool, "a", &[]);
        r.add_test_result(TestResult::new(
            "Test 1: x".to_string(),
            TestCase::default(),
            json!({}),
            TestOutcome::Error {
                message: "timeout".to_string(),
            },
            Verdict::unevaluated("n/a"),
            3,
        ));
        report.upsert(r);
        report.finalize();
        assert!(report.recommendations.iter().any(|r| r.contains("1 test execution(s) failed")));
    }

    #[test]
    fn upsert_merges_same_name() {
        let mut report = ScanReport::new("srv");
        report.upsert(result(ComponentKind::Tool, "a", &[Severity::Medium]));
        report.upsert(result(ComponentKind::Tool, "a", &[Severity::High]));
        report.upsert(result(ComponentKind::Prompt, "a", &[]));

        assert_eq!(report.tool_results.len(), 1);
        assert_eq!(report.tool_results[0].issues.len(), 2);
        assert_eq!(report.tool_results[0].risk_level, Severity::High);
        assert_eq!(report.prompt_results.len(), 1);
    }

    #[test]
    fn resources_are_matched_by_uri() {
        let resource = |uri: &str, severities: &[Severity]| {
            let mut r = result(ComponentKind::Resource, "file", severities);
            r.uri = Some(uri.to_string());
            r
        };
        let mut report = ScanReport::new("srv");
        report.push(resource("file:///a.txt", &[Severity::Low]));
        report.push(resource("file:///b.txt", &[]));
        assert_eq!(report.resource_results.len(), 2);

        report.upsert(resource("file:///b.txt", &[Severity::High]));
        assert_eq!(report.resource_results.len(), 2);
        assert_eq!(report.find_uri("file:///b.txt").unwrap().risk_level, Severity::High);
        assert_eq!(report.find_uri("file:///a.txt").unwrap().risk_level, Severity::Low);

        // no URI on the incoming side: fall back to the name
        report.upsert(result(ComponentKind::Resource, "file", &[Severity::Medium]));
        assert_eq!(report.resource_results.len(), 2);
        assert_eq!(report.resource_results[0].issues.len(), 2);
    }

    #[test]
    fn push_never_merges() {
        let mut report = ScanReport::new("srv");
        report.push(result(ComponentKind::Tool, "a", &[]));
        report.push(result(ComponentKind::Tool, "a", &[]));
        assert_eq!(report.tool_results.len(), 2);
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = ScanReport::new("srv");
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("serverName").is_some());
        assert!(value.get("overallRisk").is_some());
        assert!(value.get("toolResults").is_some());
        assert!(value.get("narrativeAnalysis").is_none());
    }
}
