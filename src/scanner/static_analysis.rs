//! Static analysis of component definitions
//!
//! The oracle reviews a component's declared interface before anything is
//! invoked. Its answer is read as an issue array: the whole text as JSON,
//! then the first array literal inside the text, then an object wrapping
//! the array under a well-known key.

use anyhow::Result;
use serde_json::Value;

use crate::ai::build_static_analysis_request;
use crate::ai::response::{extract_json_array, extract_json_object};
use crate::errors::is_cancellation;

use super::component::Component;
use super::context::StepContext;
use super::finding::{ComponentKind, IssueRecord};
use super::log::{LogType, ScanLogEntry};
use super::results::StaticAnalysis;

/// Keys under which models wrap their issue arrays
const WRAPPER_KEYS: &[&str] = &["issues", "vulnerabilities", "findings", "threats", "risks"];

/// A non-empty array none of whose elements is an issue counts as
/// unparseable; an empty array is a valid "no issues" answer.
fn issues_from_array(value: &Value, kind: ComponentKind) -> Option<Vec<IssueRecord>> {
    let items = value.as_array()?;
    let issues: Vec<IssueRecord> = items
        .iter()
        .filter_map(|item| IssueRecord::from_oracle_value(item, kind))
        .collect();
    if issues.is_empty() && !items.is_empty() {
        return None;
    }
    Some(issues)
}

/// Parse the oracle's static assessment into issues.
pub fn parse_static_issues(text: &str, kind: ComponentKind) -> Option<Vec<IssueRecord>> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if let Some(issues) = issues_from_array(&value, kind) {
            return Some(issues);
        }
    }
    if let Some(issues) = extract_json_array(text)
        .as_ref()
        .and_then(|v| issues_from_array(v, kind))
    {
        return Some(issues);
    }
    let object = extract_json_object(text)?;
    WRAPPER_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(|v| issues_from_array(v, kind))
}

/// Run static analysis for `component`.
///
/// Only cancellation is returned as an error. An oracle failure leaves the
/// analysis at [`StaticAnalysis::None`]; an unreadable answer is kept as
/// [`StaticAnalysis::Raw`] with the full text in the log entry details.
pub async fn analyze_component(ctx: StepContext<'_>, component: &Component) -> Result<StaticAnalysis> {
    let request = build_static_analysis_request(component);
    let response = match ctx.consult(&request).await {
        Ok(response) => response,
        Err(e) if is_cancellation(&e) => return Err(e),
        Err(e) => {
            ctx.log.warning(
                ctx.phase,
                "Static analysis unavailable",
                format!("{}: {:#}", component.display_name(), e),
            );
            return Ok(StaticAnalysis::None);
        }
    };

    match parse_static_issues(&response.content, component.kind) {
        Some(issues) => {
            ctx.log.emit(
                ScanLogEntry::new(
                    LogType::Success,
                    ctx.phase,
                    "Static analysis complete",
                    format!(
                        "{}: {} issue(s) identified",
                        component.display_name(),
                        issues.len()
                    ),
                )
                .with_metadata("component", component.name.as_str())
                .with_duration(response.response_time_ms),
            );
            Ok(StaticAnalysis::Parsed(issues))
        }
        None => {
            ctx.log.emit(
                ScanLogEntry::new(
                    LogType::Error,
                    ctx.phase,
                    "Static analysis unparseable",
                    format!(
                        "Could not read an issue list for {}; continuing with dynamic tests",
                        component.display_name()
                    ),
                )
                .with_details(response.content.clone())
                .with_metadata("component", component.name.as_str()),
            );
            Ok(StaticAnalysis::Raw(response.content))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::finding::{IssueSource, Severity};

    #[test]
    fn strict_array() {
        let text = r#"[{"type": "path_traversal", "severity": "high", "description": "Unvalidated path"}]"#;
        let issues = parse_static_issues(text, ComponentKind::Tool).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, "path_traversal");
        assert_eq!(issues[0].severity, Severity::High);
        assert_eq!(issues[0].source, IssueSource::StaticAnalysis);
        assert_eq!(issues[0].source_type, ComponentKind::Tool);
    }

    #[test]
    fn empty_array_means_no_issues() {
        assert_eq!(parse_static_issues("[]", ComponentKind::Prompt), Some(vec![]));
    }

    #[test]
    fn array_embedded_in_prose() {
        let text = "I found the following:\n[{\"description\": \"Prompt injection via topic\", \"riskLevel\": \"Medium\"}]\nLet me know.";
        let issues = parse_static_issues(text, ComponentKind::Prompt).unwrap();
        assert_eq!(issues[0].severity, Severity::Medium);
        assert_eq!(issues[0].issue_type, "threat");
    }

    #[test]
    fn wrapped_in_object() {
        let text = r#"{"summary": "ok", "vulnerabilities": [{"title": "Secret in description", "severity": "critical"}]}"#;
        let issues = parse_static_issues(text, ComponentKind::Resource).unwrap();
        assert_eq!(issues[0].description, "Secret in description");
        assert_eq!(issues[0].severity, Severity::Critical);
    }

    #[test]
    fn prose_is_unparseable() {
        assert!(parse_static_issues("Looks fine to me.", ComponentKind::Tool).is_none());
        assert!(parse_static_issues(r#"["just a string"]"#, ComponentKind::Tool).is_none());
    }
}
