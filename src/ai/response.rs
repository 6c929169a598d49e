//! Oracle responses and JSON recovery helpers
//!
//! Models wrap JSON in prose or markdown fences more often than not. The
//! helpers here find the payload without trusting the surrounding text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw completion returned by a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResponse {
    pub content: String,
    pub tokens_used: u32,
    pub response_time_ms: u64,
}

impl LlmResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = ms;
        self
    }
}

/// Bodies of every markdown code fence, in order, language tags removed.
pub fn code_fences(text: &str) -> Vec<&str> {
    let mut bodies = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let Some(end) = after.find("```") else {
            break;
        };
        let body = &after[..end];
        // drop a language tag such as `json`
        let body = match body.find('\n') {
            Some(nl) if !body[..nl].trim().contains(['{', '[']) => &body[nl + 1..],
            _ => body,
        };
        bodies.push(body.trim());
        rest = &after[end + 3..];
    }
    bodies
}

/// Body of the first markdown code fence, language tag removed.
pub fn strip_code_fence(text: &str) -> Option<&str> {
    code_fences(text).into_iter().next()
}

/// Byte length of the bracket-balanced literal starting at `text[0]`,
/// honouring JSON string escapes.
fn balanced_len(text: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Every balanced `open`…`close` literal in `text` that parses as JSON,
/// by start position. Nested literals are yielded after their parent.
fn balanced_literals(text: &str, open: char, close: char) -> impl Iterator<Item = Value> + '_ {
    text.match_indices(open).filter_map(move |(start, _)| {
        let rest = &text[start..];
        let len = balanced_len(rest, open, close)?;
        serde_json::from_str(&rest[..len]).ok()
    })
}

fn first_balanced(text: &str, open: char, close: char) -> Option<Value> {
    balanced_literals(text, open, close).next()
}

fn extract_with(text: &str, open: char, close: char, accept: fn(&Value) -> bool) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if accept(&v) {
            return Some(v);
        }
    }
    if let Some(body) = strip_code_fence(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(body) {
            if accept(&v) {
                return Some(v);
            }
        }
    }
    first_balanced(trimmed, open, close).filter(accept)
}

/// Recover a JSON object from free text: whole text, fenced block, then the
/// first balanced `{...}` that parses.
pub fn extract_json_object(text: &str) -> Option<Value> {
    extract_with(text, '{', '}', Value::is_object)
}

/// Every JSON object recoverable from `text`: the whole text, then each
/// fenced block, then each balanced `{...}` in order of appearance. Callers
/// pick the first candidate with the shape they need.
pub fn json_object_candidates(text: &str) -> Vec<Value> {
    let trimmed = text.trim();
    let mut candidates: Vec<Value> = serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(Value::is_object)
        .into_iter()
        .collect();
    candidates.extend(
        code_fences(trimmed)
            .into_iter()
            .filter_map(|body| serde_json::from_str::<Value>(body).ok())
            .filter(Value::is_object),
    );
    candidates.extend(balanced_literals(trimmed, '{', '}'));
    candidates
}

/// Recover a JSON array from free text: whole text, fenced block, then the
/// first balanced `[...]` that parses.
pub fn extract_json_array(text: &str) -> Option<Value> {
    extract_with(text, '[', ']', Value::is_array)
}
