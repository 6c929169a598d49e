//! Folding passive results into an active report

use super::passive::PassiveResult;
use super::results::{ComponentResult, ScanReport, ScanType};

impl From<PassiveResult> for ComponentResult {
    fn from(passive: PassiveResult) -> Self {
        let mut result = ComponentResult::empty(
            passive.kind,
            &passive.target_name,
            passive.uri,
            ScanType::Passive,
        );
        result.timestamp = passive.observed_at;
        for issue in passive.issues {
            result.add_issue(issue);
        }
        result.test_results = passive.test_results;
        result
    }
}

impl ScanReport {
    /// Merge one passive result without re-aggregating.
    ///
    /// An existing result for the same component (same URI for resources
    /// observed with one, same name otherwise) absorbs the passive issues
    /// and tests and keeps its scan type; otherwise a passive result is
    /// inserted.
    pub fn merge_passive_result(&mut self, passive: PassiveResult) {
        tracing::debug!(
            "Merging passive result for {} {} ({} issue(s))",
            passive.kind,
            passive.target_name,
            passive.issues.len()
        );
        self.upsert(ComponentResult::from(passive));
    }

    /// Merge `results` and re-aggregate the report.
    pub fn merge_passive(&mut self, results: impl IntoIterator<Item = PassiveResult>) -> usize {
        let mut merged = 0;
        for passive in results {
            self.merge_passive_result(passive);
            merged += 1;
        }
        if merged > 0 {
            self.finalize();
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::finding::{ComponentKind, IssueRecord, IssueSource, Severity};

    fn issue(source: IssueSource, severity: Severity) -> IssueRecord {
        IssueRecord::new(ComponentKind::Tool, source, "vulnerability", severity, "issue")
    }

    fn active_report(name: &str, severity: Severity) -> ScanReport {
        let mut report = ScanReport::new("server");
        let mut result = ComponentResult::empty(ComponentKind::Tool, name, None, ScanType::Active);
        result.add_issue(issue(IssueSource::DynamicTest, severity));
        report.upsert(result);
        report.finalize();
        report
    }

    #[test]
    fn passive_raises_existing_active_result() {
        let mut report = active_report("X", Severity::Medium);
        let passive = PassiveResult::new(ComponentKind::Tool, "X")
            .with_issue(issue(IssueSource::Passive, Severity::High));

        assert_eq!(report.merge_passive([passive]), 1);

        let merged = report.find(ComponentKind::Tool, "X").unwrap();
        assert_eq!(merged.risk_level, Severity::High);
        assert_eq!(merged.issues.len(), 2);
        assert_eq!(merged.scan_type, ScanType::Active);
        assert_eq!(report.tool_results.len(), 1);
        assert_eq!(report.overall_risk, Severity::High);
        assert_eq!(report.summary.total, 2);
    }

    #[test]
    fn unknown_component_is_inserted_as_passive() {
        let mut report = active_report("X", Severity::Low);
        let passive = PassiveResult::new(ComponentKind::Resource, "secrets")
            .with_uri("file:///secrets")
            .with_issue(IssueRecord::new(
                ComponentKind::Resource,
                IssueSource::Passive,
                "private_key",
                Severity::Critical,
                "key",
            ));

        report.merge_passive([passive]);

        let inserted = report.find(ComponentKind::Resource, "secrets").unwrap();
        assert_eq!(inserted.scan_type, ScanType::Passive);
        assert_eq!(inserted.uri.as_deref(), Some("file:///secrets"));
        assert_eq!(report.overall_risk, Severity::Critical);
        assert!(report.recommendations[0].contains("critical"));
    }

    #[test]
    fn passive_resource_lands_on_matching_uri() {
        let mut report = ScanReport::new("server");
        for uri in ["file:///a.txt", "file:///b.txt"] {
            report.push(ComponentResult::empty(
                ComponentKind::Resource,
                "file",
                Some(uri.to_string()),
                ScanType::Active,
            ));
        }
        let passive = PassiveResult::new(ComponentKind::Resource, "file")
            .with_uri("file:///b.txt")
            .with_issue(IssueRecord::new(
                ComponentKind::Resource,
                IssueSource::Passive,
                "credential_leak",
                Severity::High,
                "token",
            ));

        report.merge_passive([passive]);

        assert_eq!(report.resource_results.len(), 2);
        assert!(report.find_uri("file:///a.txt").unwrap().issues.is_empty());
        let b = report.find_uri("file:///b.txt").unwrap();
        assert_eq!(b.risk_level, Severity::High);
        assert_eq!(b.scan_type, ScanType::Active);
    }

    #[test]
    fn merging_nothing_leaves_report_untouched() {
        let mut report = active_report("X", Severity::Medium);
        let before = report.recommendations.clone();
        assert_eq!(report.merge_passive(Vec::new()), 0);
        assert_eq!(report.recommendations, before);
    }
}
