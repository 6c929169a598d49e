//! MCP Client - the execution side of a scan
//!
//! `McpClient` speaks JSON-RPC over a [`Transport`]; the scanner only sees
//! [`McpClientTrait`], so tests substitute [`mock::MockMcpClient`].

pub mod mock;

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::protocol::mcp::{
    self, CallToolResult, GetPromptResult, InitializeParams, InitializeResult,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    Prompt, ReadResourceResult, Resource, ResourceTemplate, ServerCapabilities, Tool,
};
use crate::transport::{connect, Transport, TransportConfig, TransportType};

pub use mock::MockMcpClient;

/// Operations the scanner performs against a target server.
#[async_trait]
pub trait McpClientTrait: Send + Sync {
    async fn list_tools(&mut self) -> Result<Vec<Tool>>;

    async fn list_prompts(&mut self) -> Result<Vec<Prompt>>;

    async fn list_resources(&mut self) -> Result<Vec<Resource>>;

    async fn list_resource_templates(&mut self) -> Result<Vec<ResourceTemplate>>;

    async fn call_tool(&mut self, name: &str, arguments: Option<Value>) -> Result<CallToolResult>;

    async fn get_prompt(&mut self, name: &str, arguments: Option<Value>)
        -> Result<GetPromptResult>;

    async fn read_resource(&mut self, uri: &str) -> Result<ReadResourceResult>;

    async fn close(&mut self) -> Result<()>;
}

/// Upper bound on pages followed for a single list call.
const MAX_PAGES: usize = 100;

pub struct McpClient {
    transport: Box<dyn Transport>,
    client_name: String,
    client_version: String,
    init: Option<InitializeResult>,
}

impl McpClient {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            init: None,
        }
    }

    /// Spawn or dial `target` and run the initialize handshake.
    pub async fn connect(
        target: &str,
        args: &[String],
        env: &HashMap<String, String>,
        config: TransportConfig,
    ) -> Result<Self> {
        let transport = connect(target, args, env, config).await?;
        let mut client = Self::new(transport);
        client.initialize().await?;
        Ok(client)
    }

    pub async fn initialize(&mut self) -> Result<&InitializeResult> {
        let params = InitializeParams::new(&self.client_name, &self.client_version);
        let result: InitializeResult = self
            .request(mcp::methods::INITIALIZE, Some(params))
            .await
            .context("MCP initialize failed")?;

        tracing::info!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            protocol = %result.protocol_version,
            "Connected to MCP server"
        );

        self.transport
            .notify(mcp::methods::INITIALIZED, None)
            .await
            .context("Failed to send initialized notification")?;

        Ok(&*self.init.insert(result))
    }

    pub fn server_name(&self) -> Option<&str> {
        self.init.as_ref().map(|i| i.server_info.name.as_str())
    }

    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.init.as_ref().map(|i| &i.capabilities)
    }

    pub fn transport_type(&self) -> TransportType {
        self.transport.transport_type()
    }

    fn ensure_ready(&self) -> Result<&ServerCapabilities> {
        self.server_capabilities()
            .context("Client not initialized. Call initialize() first.")
    }

    async fn request<P: Serialize, R: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Option<P>,
    ) -> Result<R> {
        let params_value = params
            .map(|p| serde_json::to_value(p))
            .transpose()
            .context("Failed to serialize request params")?;

        let response = self.transport.request(method, params_value).await?;
        let result = response
            .into_result()
            .with_context(|| format!("RPC error from '{}'", method))?;
        serde_json::from_value(result)
            .with_context(|| format!("Failed to deserialize '{}' response", method))
    }

    /// Follow `nextCursor` until exhausted.
    async fn list_all<R, T>(
        &mut self,
        method: &str,
        split: impl Fn(R) -> (Vec<T>, Option<String>),
    ) -> Result<Vec<T>>
    where
        R: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: R = self.request(method, params).await?;
            let (mut batch, next) = split(page);
            items.append(&mut batch);
            match next {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(items),
            }
        }
        tracing::warn!("{} returned more than {} pages; truncating", method, MAX_PAGES);
        Ok(items)
    }
}

#[async_trait]
impl McpClientTrait for McpClient {
    async fn list_tools(&mut self) -> Result<Vec<Tool>> {
        if !self.ensure_ready()?.has_tools() {
            return Ok(Vec::new());
        }
        self.list_all(mcp::methods::TOOLS_LIST, |r: ListToolsResult| {
            (r.tools, r.next_cursor)
        })
        .await
    }

    async fn list_prompts(&mut self) -> Result<Vec<Prompt>> {
        if !self.ensure_ready()?.has_prompts() {
            return Ok(Vec::new());
        }
        self.list_all(mcp::methods::PROMPTS_LIST, |r: ListPromptsResult| {
            (r.prompts, r.next_cursor)
        })
        .await
    }

    async fn list_resources(&mut self) -> Result<Vec<Resource>> {
        if !self.ensure_ready()?.has_resources() {
            return Ok(Vec::new());
        }
        self.list_all(mcp::methods::RESOURCES_LIST, |r: ListResourcesResult| {
            (r.resources, r.next_cursor)
        })
        .await
    }

    async fn list_resource_templates(&mut self) -> Result<Vec<ResourceTemplate>> {
        if !self.ensure_ready()?.has_resources() {
            return Ok(Vec::new());
        }
        self.list_all(
            mcp::methods::RESOURCES_TEMPLATES_LIST,
            |r: ListResourceTemplatesResult| (r.resource_templates, r.next_cursor),
        )
        .await
    }

    async fn call_tool(&mut self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        self.ensure_ready()?;
        let params = json!({ "name": name, "arguments": arguments.unwrap_or_else(|| json!({})) });
        self.request(mcp::methods::TOOLS_CALL, Some(params)).await
    }

    async fn get_prompt(
        &mut self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<GetPromptResult> {
        self.ensure_ready()?;
        let params = json!({ "name": name, "arguments": arguments.unwrap_or_else(|| json!({})) });
        self.request(mcp::methods::PROMPTS_GET, Some(params)).await
    }

    async fn read_resource(&mut self, uri: &str) -> Result<ReadResourceResult> {
        self.ensure_ready()?;
        self.request(mcp::methods::RESOURCES_READ, Some(json!({ "uri": uri })))
            .await
    }

    async fn close(&mut self) -> Result<()> {
        self.init = None;
        self.transport.close().await
    }
}
