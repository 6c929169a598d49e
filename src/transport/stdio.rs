//! Stdio transport for local MCP servers

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

use super::{Transport, TransportConfig, TransportType};

/// Talks to a spawned server over its stdin/stdout, one JSON message per line.
pub struct StdioTransport {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    config: TransportConfig,
    request_id: u64,
}

impl StdioTransport {
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        config: TransportConfig,
    ) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn MCP server process '{}'", command))?;

        let stdin = child.stdin.take().context("No stdin available")?;
        let stdout = child.stdout.take().context("No stdout available")?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            config,
            request_id: 0,
        })
    }

    fn next_id(&mut self) -> RequestId {
        self.request_id += 1;
        RequestId::Number(self.request_id)
    }

    async fn write_line(&mut self, payload: String) -> Result<()> {
        self.stdin.write_all(payload.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read lines until the response carrying `id` arrives. Server-initiated
    /// notifications and stray responses are skipped.
    async fn read_response(&mut self, id: &RequestId) -> Result<JsonRpcResponse> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.stdout.read_line(&mut line).await?;
            if read == 0 {
                anyhow::bail!("MCP server closed stdout");
            }
            if line.len() > self.config.max_message_size {
                anyhow::bail!("Message exceeds {} bytes", self.config.max_message_size);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let value: Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!("Skipping non-JSON line from server: {}", e);
                    continue;
                }
            };
            if value.get("method").is_some() {
                tracing::trace!("Skipping server message: {}", value["method"]);
                continue;
            }

            let response: JsonRpcResponse =
                serde_json::from_value(value).context("Malformed JSON-RPC response")?;
            match &response.id {
                Some(got) if got == id => return Ok(response),
                None if response.error.is_some() => return Ok(response),
                _ => tracing::debug!("Skipping response for another request"),
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let id = self.next_id();
        let request = JsonRpcRequest::new(id.clone(), method, params);
        self.write_line(serde_json::to_string(&request)?).await?;

        let secs = self.config.timeout_secs;
        tokio::time::timeout(Duration::from_secs(secs), self.read_response(&id))
            .await
            .with_context(|| format!("Timed out after {}s waiting for '{}'", secs, method))?
    }

    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        self.write_line(serde_json::to_string(&notification)?).await
    }

    async fn close(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }
}
