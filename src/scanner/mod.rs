//! Scanner - comprehensive risk evaluation of MCP servers
//!
//! Components are preprocessed, statically assessed by the oracle,
//! exercised with generated test cases and judged one response at a time.
//! Results roll up into a [`ScanReport`]; passive findings can be merged in
//! and the whole report flattened with [`UnifiedRiskCollector`].

pub mod cancel;
pub mod component;
pub mod context;
mod engine;
pub mod evaluator;
pub mod executor;
pub mod finding;
pub mod log;
mod merge;
pub mod passive;
pub mod progress;
pub mod results;
pub mod session;
pub mod static_analysis;
pub mod testcase;
pub mod unified;
pub mod verdict;

pub use cancel::CancellationSignal;
pub use component::{
    preprocess_inventory, preprocess_prompt, preprocess_resource, preprocess_resource_template,
    preprocess_tool, Component, Inventory, ParameterInfo, PreprocessedInventory, ResourceType,
};
pub use context::{ScanConfig, StepContext};
pub use engine::{ScanEngine, ScanRequest};
pub use finding::{ComponentKind, IssueRecord, IssueSource, Severity};
pub use log::{ListenerId, LogType, ScanLog, ScanLogEntry};
pub use passive::{
    passive_channel, PassiveDetector, PassiveObservation, PassiveReceiver, PassiveResult,
    PassiveSender, DEFAULT_PASSIVE_CAPACITY,
};
pub use progress::ProgressCallback;
pub use results::{ComponentResult, ScanReport, ScanSummary, ScanType, StaticAnalysis};
pub use session::{ScanCoordinator, ScanPhase, SessionGuard};
pub use testcase::{TestCase, TestOutcome, TestResult};
pub use unified::{RiskType, UnifiedRiskCollector, UnifiedRiskItem};
pub use verdict::{Confidence, Verdict};

use anyhow::Result;
use colored::Colorize;

impl Severity {
    /// Upper-case label, colored by severity
    pub fn colored(&self) -> colored::ColoredString {
        let label = self.as_str().to_uppercase();
        match self {
            Severity::Critical => label.red().bold(),
            Severity::High => label.red(),
            Severity::Medium => label.yellow(),
            Severity::Low => label.blue(),
        }
    }
}

impl ScanReport {
    /// Print the report as formatted text
    pub fn print_text(&self) {
        println!("{}", "Comprehensive Scan Results".bold());
        println!("{}", "=".repeat(60));
        println!();
        println!("  {:<12} {}", "Server".dimmed(), self.server_name);
        println!("  {:<12} {}", "Report".dimmed(), self.id);
        println!("  {:<12} {}ms", "Duration".dimmed(), self.duration_ms);
        println!(
            "  {:<12} {} tool(s), {} prompt(s), {} resource(s), {} test(s)",
            "Scanned".dimmed(),
            self.tool_results.len(),
            self.prompt_results.len(),
            self.resource_results.len(),
            self.total_tests()
        );
        println!("  {:<12} {}", "Risk".dimmed(), self.overall_risk.colored());
        println!();

        let flagged: Vec<&ComponentResult> =
            self.all_results().filter(|r| !r.issues.is_empty()).collect();
        if flagged.is_empty() {
            println!("  {}", "No issues found".green());
        }
        for result in flagged {
            let scan_type = if result.scan_type == ScanType::Passive {
                " (passive)".dimmed().to_string()
            } else {
                String::new()
            };
            println!(
                "  [{}] {} {}{}",
                result.risk_level.colored(),
                result.kind,
                result.name.cyan(),
                scan_type
            );
            for issue in &result.issues {
                println!(
                    "    - [{}] {}: {}",
                    issue.severity.colored(),
                    issue.issue_type,
                    issue.description
                );
                if let Some(evidence) = &issue.evidence {
                    println!("      Evidence: {}", evidence.dimmed());
                }
                if !issue.recommendation.is_empty() {
                    println!("      Fix: {}", issue.recommendation.green());
                }
            }
            println!();
        }

        println!("{}", "-".repeat(60));
        println!(
            "Summary: {} total, {} critical, {} high, {} medium, {} low",
            self.summary.total,
            self.summary.critical.to_string().red(),
            self.summary.high.to_string().red(),
            self.summary.medium.to_string().yellow(),
            self.summary.low.to_string().blue()
        );

        if !self.recommendations.is_empty() {
            println!();
            println!("{}", "Recommendations".bold());
            for rec in &self.recommendations {
                println!("  * {}", rec);
            }
        }

        if let Some(narrative) = &self.narrative_analysis {
            println!();
            println!("{}", "Analysis".bold());
            for line in narrative.lines() {
                println!("  {}", line);
            }
        }
    }

    pub fn print_json(&self) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }

    /// Exit code for CI: 1 when anything high or critical was found
    pub fn exit_code(&self) -> i32 {
        if self.overall_risk >= Severity::High {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(severity: Severity) -> ScanReport {
        let mut report = ScanReport::new("test-server");
        let mut result = ComponentResult::empty(ComponentKind::Tool, "exec", None, ScanType::Active);
        result.add_issue(
            IssueRecord::new(
                ComponentKind::Tool,
                IssueSource::DynamicTest,
                "command_injection",
                severity,
                "Injected command ran",
            )
            .with_evidence("uid=0(root)")
            .with_recommendation("Avoid the shell"),
        );
        report.upsert(result);
        report.finalize();
        report
    }

    #[test]
    fn print_text_clean_report() {
        let mut report = ScanReport::new("test-server");
        report.finalize();
        report.print_text();
    }

    #[test]
    fn print_text_with_issues_and_narrative() {
        let mut report = report_with(Severity::Critical);
        report.narrative_analysis = Some("One critical issue.\nFix it.".to_string());
        report.print_text();
    }

    #[test]
    fn print_json_success() {
        assert!(report_with(Severity::Medium).print_json().is_ok());
    }

    #[test]
    fn exit_code_tracks_overall_risk() {
        assert_eq!(report_with(Severity::Critical).exit_code(), 1);
        assert_eq!(report_with(Severity::High).exit_code(), 1);
        assert_eq!(report_with(Severity::Medium).exit_code(), 0);
    }

    #[test]
    fn json_uses_camel_case() {
        let value = serde_json::to_value(report_with(Severity::High)).unwrap();
        assert_eq!(value["overallRisk"], "high");
        assert_eq!(value["toolResults"][0]["scanType"], "active");
        assert_eq!(value["toolResults"][0]["issues"][0]["type"], "command_injection");
        assert_eq!(value["toolResults"][0]["issues"][0]["sourceType"], "tool");
    }
}
