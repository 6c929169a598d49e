//! Transport layer for MCP server communication
//!
//! - `stdio` - child process speaking line-delimited JSON-RPC
//! - `streamable_http` - remote server over HTTP POST (JSON or SSE replies)
//!
//! `connect` picks the transport from the target: `http://`/`https://`
//! URLs use streamable HTTP, anything else is spawned as a command.

pub mod stdio;
pub mod streamable_http;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::JsonRpcResponse;

pub use stdio::StdioTransport;
pub use streamable_http::StreamableHttpTransport;

/// MCP transport abstraction
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the matching response
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse>;

    /// Send a notification (no response expected)
    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    fn transport_type(&self) -> TransportType;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Upper bound for a single response line/body
    pub max_message_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_message_size: 10 * 1024 * 1024,
        }
    }
}

impl TransportConfig {
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Stdio,
    StreamableHttp,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Stdio => write!(f, "stdio"),
            TransportType::StreamableHttp => write!(f, "streamable_http"),
        }
    }
}

pub fn detect_transport_type(target: &str) -> TransportType {
    let lower = target.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        TransportType::StreamableHttp
    } else {
        TransportType::Stdio
    }
}

/// Connect to an MCP server, choosing the transport from `target`.
///
/// `args` and `env` only apply to stdio targets.
pub async fn connect(
    target: &str,
    args: &[String],
    env: &HashMap<String, String>,
    config: TransportConfig,
) -> Result<Box<dyn Transport>> {
    match detect_transport_type(target) {
        TransportType::Stdio => {
            let transport = StdioTransport::spawn(target, args, env, config).await?;
            Ok(Box::new(transport))
        }
        TransportType::StreamableHttp => {
            let transport = StreamableHttpTransport::new(target, config)?;
            Ok(Box::new(transport))
        }
    }
}
