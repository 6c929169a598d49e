//! Result evaluation
//!
//! Every executed test is judged by the oracle and recorded, whatever the
//! outcome. Only a judgement above low turns into an issue.

use anyhow::Result;

use crate::ai::build_evaluation_request;
use crate::errors::is_cancellation;

use super::component::Component;
use super::context::StepContext;
use super::finding::{IssueRecord, IssueSource};
use super::log::{LogType, ScanLogEntry};
use super::results::ComponentResult;
use super::testcase::{TestCase, TestOutcome, TestResult};
use super::verdict::{parse_verdict, Verdict};

/// Ask the oracle for a verdict on one outcome.
///
/// Only cancellation is returned as an error. With LLM analysis disabled,
/// or when the oracle call fails, the verdict is low and unevaluated.
pub async fn evaluate_outcome(
    ctx: StepContext<'_>,
    component: &Component,
    test_case: &TestCase,
    outcome: &TestOutcome,
) -> Result<Verdict> {
    if !ctx.config.enable_llm_analysis {
        return Ok(Verdict::unevaluated("LLM analysis disabled"));
    }

    let request = build_evaluation_request(component, test_case, outcome);
    match ctx.consult(&request).await {
        Ok(response) => Ok(parse_verdict(&response.content)),
        Err(e) if is_cancellation(&e) => Err(e),
        Err(e) => {
            ctx.log.warning(
                ctx.phase,
                "Evaluation failed",
                format!("{}: {:#}", component.display_name(), e),
            );
            Ok(Verdict::unevaluated(format!("Evaluation failed: {:#}", e)))
        }
    }
}

/// Append the test result, and an issue when the verdict is above low.
pub fn record_test_result(ctx: StepContext<'_>, result: &mut ComponentResult, test: TestResult) {
    let verdict = &test.risk_assessment;

    if !verdict.is_low() {
        let issue_type = if test.test_case.risk_type.is_empty() {
            result.kind.issue_label().to_string()
        } else {
            test.test_case.risk_type.clone()
        };
        let description = if verdict.description.is_empty() {
            test.test_case.risk_description.clone()
        } else {
            verdict.description.clone()
        };
        let mut issue = IssueRecord::new(
            result.kind,
            IssueSource::DynamicTest,
            issue_type,
            verdict.risk_level,
            description,
        )
        .with_recommendation(verdict.recommendation.clone())
        .with_test_case(test.test_case_label.clone());
        if !verdict.evidence.is_empty() {
            issue = issue.with_evidence(verdict.evidence.clone());
        }
        result.add_issue(issue);
    }

    let log_type = match (test.passed, test.outcome.is_success()) {
        (true, _) => LogType::Success,
        (false, false) => LogType::Error,
        (false, true) => LogType::Warning,
    };
    ctx.log.emit(
        ScanLogEntry::new(
            log_type,
            ctx.phase,
            test.test_case_label.clone(),
            format!(
                "{} {}: {} risk ({})",
                result.kind,
                result.name,
                verdict.risk_level,
                if test.outcome.is_success() { "executed" } else { "execution failed" }
            ),
        )
        .with_metadata("component", result.name.as_str())
        .with_metadata("confidence", serde_json::to_value(verdict.confidence).unwrap_or_default())
        .with_duration(test.duration_ms),
    );

    result.add_test_result(test);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{LlmProvider, MockProvider, OracleClient, RequestKind};
    use crate::client::MockMcpClient;
    use crate::scanner::cancel::CancellationSignal;
    use crate::scanner::component::preprocess_tool;
    use crate::scanner::context::ScanConfig;
    use crate::scanner::finding::Severity;
    use crate::scanner::log::ScanLog;
    use crate::scanner::session::ScanPhase;
    use crate::scanner::verdict::Confidence;
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        oracle: OracleClient,
        config: ScanConfig,
        signal: CancellationSignal,
        log: ScanLog,
    }

    impl Fixture {
        fn new(provider: MockProvider) -> Self {
            let provider: Arc<dyn LlmProvider> = Arc::new(provider);
            Self {
                oracle: OracleClient::single(provider),
                config: ScanConfig::default(),
                signal: CancellationSignal::new(),
                log: ScanLog::new(),
            }
        }

        fn ctx(&self) -> StepContext<'_> {
            StepContext {
                oracle: &self.oracle,
                config: &self.config,
                signal: &self.signal,
                log: &self.log,
                phase: ScanPhase::ToolAnalysis,
            }
        }
    }

    fn exec() -> Component {
        preprocess_tool(&MockMcpClient::string_tool("exec", "Run a command", &["cmd"]))
    }

    fn ok_outcome() -> TestOutcome {
        TestOutcome::Success { raw: json!({"content": []}) }
    }

    #[tokio::test]
    async fn structured_verdict_from_oracle() {
        let fixture = Fixture::new(MockProvider::new().with_response(
            RequestKind::Evaluation,
            r#"{"riskLevel": "critical", "description": "Executed injected command", "evidence": "uid=0"}"#,
        ));
        let verdict = evaluate_outcome(fixture.ctx(), &exec(), &TestCase::default(), &ok_outcome())
            .await
            .unwrap();
        assert_eq!(verdict.risk_level, Severity::Critical);
        assert_eq!(verdict.confidence, Confidence::Structured);
    }

    #[tokio::test]
    async fn oracle_failure_is_unevaluated_low() {
        let provider = MockProvider::new();
        provider.set_should_fail(true, "quota").await;
        let fixture = Fixture::new(provider);
        let verdict = evaluate_outcome(fixture.ctx(), &exec(), &TestCase::default(), &ok_outcome())
            .await
            .unwrap();
        assert_eq!(verdict.confidence, Confidence::Unevaluated);
        assert!(verdict.is_low());
        assert!(verdict.description.contains("quota"));
        assert_eq!(fixture.log.entries()[0].log_type, LogType::Warning);
    }

    #[tokio::test]
    async fn disabled_llm_skips_oracle() {
        let mut fixture = Fixture::new(MockProvider::new());
        fixture.config.enable_llm_analysis = false;
        let verdict = evaluate_outcome(fixture.ctx(), &exec(), &TestCase::default(), &ok_outcome())
            .await
            .unwrap();
        assert_eq!(verdict.confidence, Confidence::Unevaluated);
        assert_eq!(fixture.oracle.stats().await.api_calls, 0);
    }

    #[tokio::test]
    async fn cancellation_propagates() {
        let fixture = Fixture::new(MockProvider::new());
        fixture.signal.cancel();
        let err = evaluate_outcome(fixture.ctx(), &exec(), &TestCase::default(), &ok_outcome())
            .await
            .unwrap_err();
        assert!(is_cancellation(&err));
    }

    #[test]
    fn only_non_low_verdicts_become_issues() {
        let fixture = Fixture::new(MockProvider::new());
        let component = exec();
        let mut result = ComponentResult::new(&component);

        let case = TestCase {
            risk_type: "command_injection".to_string(),
            purpose: "chain".to_string(),
            ..Default::default()
        };
        let high = Verdict {
            risk_level: Severity::High,
            description: "Runs arbitrary commands".to_string(),
            evidence: "uid=0(root)".to_string(),
            recommendation: "Do not pass input to a shell".to_string(),
            confidence: Confidence::Structured,
        };
        record_test_result(
            fixture.ctx(),
            &mut result,
            TestResult::new(case.label(0), case.clone(), json!({}), ok_outcome(), high, 4),
        );
        record_test_result(
            fixture.ctx(),
            &mut result,
            TestResult::new(
                case.label(1),
                case,
                json!({}),
                ok_outcome(),
                Verdict::unevaluated("n/a"),
                2,
            ),
        );

        assert_eq!(result.test_results.len(), 2);
        assert_eq!(result.issues.len(), 1);
        let issue = &result.issues[0];
        assert_eq!(issue.source, IssueSource::DynamicTest);
        assert_eq!(issue.issue_type, "command_injection");
        assert_eq!(issue.test_case.as_deref(), Some("Test 1: chain"));
        assert_eq!(issue.evidence.as_deref(), Some("uid=0(root)"));
        assert_eq!(result.risk_level, Severity::High);
    }
}
