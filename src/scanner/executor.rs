//! Test case generation and execution
//!
//! A component without parameters gets one direct-access call. A
//! parameterized component gets up to `max_test_cases` oracle-designed
//! test cases, executed one after another. Execution failures are outcomes,
//! not errors: the only error that leaves this module is cancellation.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

use crate::ai::build_test_case_request;
use crate::client::McpClientTrait;
use crate::errors::is_cancellation;
use crate::protocol::{CallToolResult, Content};

use super::component::{resolve_uri_template, Component};
use super::context::StepContext;
use super::evaluator::{evaluate_outcome, record_test_result};
use super::finding::ComponentKind;
use super::log::{LogType, ScanLogEntry};
use super::results::ComponentResult;
use super::testcase::{parse_test_cases, ParsedTestCases, TestCase, TestOutcome, TestResult};

/// One call against the target
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Arguments sent; for resources, the resolved URI
    pub parameters_used: Value,
    pub outcome: TestOutcome,
    pub duration_ms: u64,
}

/// Await `fut` under the per-call timeout, racing cancellation.
/// The outer error is cancellation only; the inner one is the call's failure.
async fn run_call<T, F>(ctx: StepContext<'_>, fut: F) -> Result<Result<T, String>>
where
    F: Future<Output = Result<T>>,
{
    let secs = ctx.config.timeout_secs;
    let timed = async {
        match tokio::time::timeout(Duration::from_secs(secs), fut).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("timed out after {}s", secs)),
        }
    };
    match ctx.signal.guard(timed).await {
        Ok(value) => Ok(Ok(value)),
        Err(e) if is_cancellation(&e) => Err(e),
        Err(e) => Ok(Err(format!("{:#}", e))),
    }
}

fn content_text(content: &[Content]) -> String {
    content
        .iter()
        .filter_map(|c| match c {
            Content::Text { text } => Some(text.clone()),
            Content::Resource { resource } => resource.text.clone(),
            Content::Image { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn tool_outcome(result: CallToolResult) -> TestOutcome {
    if result.is_error == Some(true) {
        let text = content_text(&result.content);
        return TestOutcome::Error {
            message: if text.is_empty() {
                "tool reported an error".to_string()
            } else {
                text
            },
        };
    }
    match serde_json::to_value(&result) {
        Ok(raw) => TestOutcome::Success { raw },
        Err(e) => TestOutcome::Error {
            message: format!("unserializable tool result: {}", e),
        },
    }
}

fn to_outcome<T: serde::Serialize>(result: Result<T, String>) -> TestOutcome {
    match result {
        Ok(value) => match serde_json::to_value(&value) {
            Ok(raw) => TestOutcome::Success { raw },
            Err(e) => TestOutcome::Error {
                message: format!("unserializable result: {}", e),
            },
        },
        Err(message) => TestOutcome::Error { message },
    }
}

/// MCP prompt arguments are strings.
fn stringify_arguments(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k.clone(), Value::String(text))
        })
        .collect()
}

/// Invoke `component` once with `params`.
pub async fn invoke(
    ctx: StepContext<'_>,
    client: &mut dyn McpClientTrait,
    component: &Component,
    params: &Map<String, Value>,
) -> Result<Invocation> {
    let start = Instant::now();
    let (parameters_used, outcome) = match component.kind {
        ComponentKind::Tool => {
            let args = Value::Object(params.clone());
            let result = run_call(ctx, client.call_tool(&component.name, Some(args.clone()))).await?;
            let outcome = match result {
                Ok(tool_result) => tool_outcome(tool_result),
                Err(message) => TestOutcome::Error { message },
            };
            (args, outcome)
        }
        ComponentKind::Prompt => {
            let args = Value::Object(stringify_arguments(params));
            let result = run_call(ctx, client.get_prompt(&component.name, Some(args.clone()))).await?;
            (args, to_outcome(result))
        }
        ComponentKind::Resource => {
            let template = component.uri.as_deref().unwrap_or(&component.name);
            let uri = resolve_uri_template(template, params);
            let result = run_call(ctx, client.read_resource(&uri)).await?;
            (Value::String(uri), to_outcome(result))
        }
    };

    Ok(Invocation {
        parameters_used,
        outcome,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Ask the oracle for test cases, capped at `max_test_cases`.
///
/// Unusable output, an oracle failure, or LLM analysis being disabled all
/// yield the single default case. Only cancellation is an error.
pub async fn generate_test_cases(ctx: StepContext<'_>, component: &Component) -> Result<Vec<TestCase>> {
    let max = ctx.config.max_test_cases;

    if !ctx.config.enable_llm_analysis {
        ctx.log.info(
            ctx.phase,
            "Using default case",
            format!("{}: LLM analysis disabled", component.display_name()),
        );
        return Ok(vec![TestCase::default_case(component)]);
    }

    let request = build_test_case_request(component, max);
    let text = match ctx.consult(&request).await {
        Ok(response) => response.content,
        Err(e) if is_cancellation(&e) => return Err(e),
        Err(e) => {
            ctx.log.emit(
                ScanLogEntry::new(
                    LogType::Error,
                    ctx.phase,
                    "Test generation failed",
                    format!("{}: using the default case", component.display_name()),
                )
                .with_details(format!("{:#}", e))
                .with_metadata("component", component.name.as_str()),
            );
            return Ok(vec![TestCase::default_case(component)]);
        }
    };

    let parsed = parse_test_cases(&text, component);
    if parsed.is_fallback() {
        ctx.log.emit(
            ScanLogEntry::new(
                LogType::Error,
                ctx.phase,
                "Test generation unparseable",
                format!(
                    "Could not read test cases for {}; using the default case",
                    component.display_name()
                ),
            )
            .with_details(text)
            .with_metadata("component", component.name.as_str()),
        );
        return Ok(parsed.into_cases());
    }

    let embedded = matches!(parsed, ParsedTestCases::Embedded(_));
    let mut cases = parsed.into_cases();
    if cases.is_empty() {
        ctx.log.warning(
            ctx.phase,
            "No test cases generated",
            format!("{}: the oracle returned an empty list", component.display_name()),
        );
        return Ok(cases);
    }
    if cases.len() > max {
        tracing::debug!(
            "Truncating {} generated test cases to {} for {}",
            cases.len(),
            max,
            component.name
        );
        cases.truncate(max);
    }

    ctx.log.emit(
        ScanLogEntry::new(
            LogType::Info,
            ctx.phase,
            "Test cases generated",
            format!("{}: {} test case(s)", component.display_name(), cases.len()),
        )
        .with_metadata("component", component.name.as_str())
        .with_metadata("embedded", embedded),
    );
    Ok(cases)
}

/// Run the dynamic phase for one component, appending every test result
/// (and any issue it raises) to `result`.
pub async fn run_dynamic_tests(
    ctx: StepContext<'_>,
    client: &mut dyn McpClientTrait,
    component: &Component,
    result: &mut ComponentResult,
) -> Result<()> {
    let cases = if !component.has_parameters() {
        vec![TestCase::direct_access(component)]
    } else if ctx.config.max_test_cases == 0 {
        ctx.log.info(
            ctx.phase,
            "Test generation skipped",
            format!("{}: max_test_cases is 0", component.display_name()),
        );
        return Ok(());
    } else {
        generate_test_cases(ctx, component).await?
    };

    for (index, case) in cases.into_iter().enumerate() {
        ctx.signal.check()?;
        let label = case.label(index);
        let invocation = invoke(ctx, client, component, &case.parameters).await?;
        let verdict = evaluate_outcome(ctx, component, &case, &invocation.outcome).await?;
        record_test_result(
            ctx,
            result,
            TestResult::new(
                label,
                case,
                invocation.parameters_used,
                invocation.outcome,
                verdict,
                invocation.duration_ms,
            ),
        );
    }
    Ok(())
}
