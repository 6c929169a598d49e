//! Streamable HTTP transport for remote MCP servers
//!
//! Each JSON-RPC message is a POST. Replies come back either as a JSON body
//! or as a `text/event-stream` whose `data:` lines carry the response.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

use super::{Transport, TransportConfig, TransportType};

const MCP_SESSION_ID_HEADER: &str = "Mcp-Session-Id";

#[derive(Debug)]
pub struct StreamableHttpTransport {
    endpoint: Url,
    client: reqwest::Client,
    session_id: Option<String>,
    request_id: u64,
}

impl StreamableHttpTransport {
    pub fn new(endpoint: &str, config: TransportConfig) -> Result<Self> {
        let endpoint = Url::parse(endpoint).context("Invalid endpoint URL")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint,
            client,
            session_id: None,
            request_id: 0,
        })
    }

    fn next_id(&mut self) -> RequestId {
        self.request_id += 1;
        RequestId::Number(self.request_id)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn post(&mut self, body: &impl serde::Serialize) -> Result<reqwest::Response> {
        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json");
        if let Some(ref session_id) = self.session_id {
            builder = builder.header(MCP_SESSION_ID_HEADER, session_id);
        }

        let response = builder.json(body).send().await.context("HTTP request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND && self.session_id.is_some() {
            self.session_id = None;
            anyhow::bail!("Session expired (404), re-initialization required");
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP error {}: {}", status, body);
        }

        self.capture_session_id(response.headers());
        Ok(response)
    }

    fn capture_session_id(&mut self, headers: &HeaderMap) {
        if let Some(id) = headers
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if self.session_id.as_deref() != Some(id) {
                tracing::debug!("Established session: {}", id);
                self.session_id = Some(id.to_string());
            }
        }
    }
}

/// Pull the response for `id` out of an SSE body.
pub(crate) fn parse_sse_response(text: &str, id: &RequestId) -> Result<JsonRpcResponse> {
    for line in text.lines() {
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(data) else {
            continue;
        };
        if value.get("method").is_some() {
            continue;
        }
        if let Ok(response) = serde_json::from_value::<JsonRpcResponse>(value) {
            if response.id.as_ref().map_or(true, |got| got == id) {
                return Ok(response);
            }
        }
    }
    anyhow::bail!("No JSON-RPC response found in SSE stream")
}

#[async_trait::async_trait]
impl Transport for StreamableHttpTransport {
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let id = self.next_id();
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let response = self.post(&request).await?;

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let text = response.text().await.context("Failed to read response body")?;

        if is_sse {
            parse_sse_response(&text, &id)
        } else {
            serde_json::from_str(&text).context("Malformed JSON-RPC response")
        }
    }

    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        self.post(&notification).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(session_id) = self.session_id.take() {
            let _ = self
                .client
                .delete(self.endpoint.clone())
                .header(MCP_SESSION_ID_HEADER, session_id)
                .send()
                .await;
        }
        Ok(())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::StreamableHttp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_url() {
        assert!(StreamableHttpTransport::new("not a url", TransportConfig::default()).is_err());
    }

    #[test]
    fn sse_body_skips_notifications() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{\"ok\":true}}\n\n";
        let response = parse_sse_response(body, &RequestId::Number(3)).unwrap();
        assert_eq!(response.result.unwrap()["ok"], true);
    }

    #[test]
    fn sse_body_without_response_is_error() {
        assert!(parse_sse_response("data: \n", &RequestId::Number(1)).is_err());
    }
}
