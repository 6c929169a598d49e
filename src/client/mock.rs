//! Mock client for testing
//!
//! Scripted listings and per-component replies, with every invocation
//! recorded so tests can assert on what the scanner actually executed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::protocol::mcp::{
    CallToolResult, Content, GetPromptResult, Prompt, PromptArgument, PromptMessage,
    ReadResourceResult, Resource, ResourceContent, ResourceTemplate, Tool,
};

use super::McpClientTrait;

/// One recorded invocation
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// `tools/call`, `prompts/get` or `resources/read`
    pub method: &'static str,
    /// Tool/prompt name or resource URI
    pub target: String,
    pub arguments: Option<Value>,
}

type CallHook = Arc<dyn Fn(&MockCall) + Send + Sync>;

#[derive(Clone, Default)]
pub struct MockMcpClient {
    tools: Vec<Tool>,
    prompts: Vec<Prompt>,
    resources: Vec<Resource>,
    templates: Vec<ResourceTemplate>,
    tool_responses: HashMap<String, CallToolResult>,
    prompt_responses: HashMap<String, GetPromptResult>,
    resource_responses: HashMap<String, ReadResourceResult>,
    /// Invocation errors keyed by tool/prompt name or URI
    failures: HashMap<String, String>,
    /// Listing errors keyed by method name
    list_failures: HashMap<&'static str, String>,
    /// Simulated latency keyed by tool/prompt name or URI
    delays: HashMap<String, Duration>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    on_call: Option<CallHook>,
    closed: bool,
}

impl MockMcpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompts.push(prompt);
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_template(mut self, template: ResourceTemplate) -> Self {
        self.templates.push(template);
        self
    }

    pub fn with_tool_response(mut self, name: &str, response: CallToolResult) -> Self {
        self.tool_responses.insert(name.to_string(), response);
        self
    }

    pub fn with_prompt_response(mut self, name: &str, response: GetPromptResult) -> Self {
        self.prompt_responses.insert(name.to_string(), response);
        self
    }

    pub fn with_resource_response(mut self, uri: &str, response: ReadResourceResult) -> Self {
        self.resource_responses.insert(uri.to_string(), response);
        self
    }

    /// Make invocations of `target` (name or URI) fail with `message`.
    pub fn with_failure(mut self, target: &str, message: &str) -> Self {
        self.failures.insert(target.to_string(), message.to_string());
        self
    }

    /// Make a listing method (e.g. `prompts/list`) fail.
    pub fn with_list_failure(mut self, method: &'static str, message: &str) -> Self {
        self.list_failures.insert(method, message.to_string());
        self
    }

    /// Answer invocations of `target` only after `delay`.
    pub fn with_delay(mut self, target: &str, delay: Duration) -> Self {
        self.delays.insert(target.to_string(), delay);
        self
    }

    /// Run `hook` synchronously on every invocation, before it is answered.
    pub fn on_call(mut self, hook: impl Fn(&MockCall) + Send + Sync + 'static) -> Self {
        self.on_call = Some(Arc::new(hook));
        self
    }

    pub async fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn record(&self, method: &'static str, target: &str, arguments: Option<Value>) -> Result<()> {
        let call = MockCall {
            method,
            target: target.to_string(),
            arguments,
        };
        if let Some(hook) = &self.on_call {
            hook(&call);
        }
        self.calls.lock().await.push(call);

        if let Some(delay) = self.delays.get(target) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(message) = self.failures.get(target) {
            anyhow::bail!("{}", message);
        }
        Ok(())
    }

    fn check_list(&self, method: &str) -> Result<()> {
        if let Some(message) = self.list_failures.get(method) {
            anyhow::bail!("{}", message);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fixture helpers
    // ------------------------------------------------------------------

    /// Tool with no input parameters
    pub fn simple_tool(name: &str, description: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Tool taking the given required string parameters
    pub fn string_tool(name: &str, description: &str, params: &[&str]) -> Tool {
        let properties: serde_json::Map<String, Value> = params
            .iter()
            .map(|p| (p.to_string(), serde_json::json!({"type": "string"})))
            .collect();
        Tool {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": params,
            }),
        }
    }

    pub fn prompt(name: &str, arguments: &[&str]) -> Prompt {
        Prompt {
            name: name.to_string(),
            description: Some(format!("{} prompt", name)),
            arguments: if arguments.is_empty() {
                None
            } else {
                Some(
                    arguments
                        .iter()
                        .map(|a| PromptArgument {
                            name: a.to_string(),
                            description: None,
                            required: Some(true),
                        })
                        .collect(),
                )
            },
        }
    }

    pub fn resource(uri: &str, name: &str) -> Resource {
        Resource {
            uri: uri.to_string(),
            name: name.to_string(),
            description: None,
            mime_type: Some("text/plain".to_string()),
        }
    }

    pub fn template(uri_template: &str, name: &str) -> ResourceTemplate {
        ResourceTemplate {
            uri_template: uri_template.to_string(),
            name: name.to_string(),
            description: None,
            mime_type: None,
        }
    }

    pub fn success_tool_result(text: &str) -> CallToolResult {
        CallToolResult {
            content: vec![Content::text(text)],
            is_error: None,
        }
    }

    pub fn error_tool_result(text: &str) -> CallToolResult {
        CallToolResult {
            content: vec![Content::text(text)],
            is_error: Some(true),
        }
    }

    pub fn text_resource_result(uri: &str, text: &str) -> ReadResourceResult {
        ReadResourceResult {
            contents: vec![ResourceContent {
                uri: uri.to_string(),
                mime_type: Some("text/plain".to_string()),
                text: Some(text.to_string()),
                blob: None,
            }],
        }
    }

    pub fn prompt_result(text: &str) -> GetPromptResult {
        GetPromptResult {
            description: None,
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: Content::text(text),
            }],
        }
    }
}

#[async_trait]
impl McpClientTrait for MockMcpClient {
    async fn list_tools(&mut self) -> Result<Vec<Tool>> {
        self.check_list("tools/list")?;
        Ok(self.tools.clone())
    }

    async fn list_prompts(&mut self) -> Result<Vec<Prompt>> {
        self.check_list("prompts/list")?;
        Ok(self.prompts.clone())
    }

    async fn list_resources(&mut self) -> Result<Vec<Resource>> {
        self.check_list("resources/list")?;
        Ok(self.resources.clone())
    }

    async fn list_resource_templates(&mut self) -> Result<Vec<ResourceTemplate>> {
        self.check_list("resources/templates/list")?;
        Ok(self.templates.clone())
    }

    async fn call_tool(&mut self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        self.record("tools/call", name, arguments).await?;
        Ok(self
            .tool_responses
            .get(name)
            .cloned()
            .unwrap_or_else(|| Self::success_tool_result(&format!("Mock response for tool: {}", name))))
    }

    async fn get_prompt(
        &mut self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<GetPromptResult> {
        self.record("prompts/get", name, arguments).await?;
        Ok(self
            .prompt_responses
            .get(name)
            .cloned()
            .unwrap_or_else(|| Self::prompt_result(&format!("Mock message for prompt: {}", name))))
    }

    async fn read_resource(&mut self, uri: &str) -> Result<ReadResourceResult> {
        self.record("resources/read", uri, None).await?;
        Ok(self
            .resource_responses
            .get(uri)
            .cloned()
            .unwrap_or_else(|| {
                Self::text_resource_result(uri, &format!("Mock content for resource: {}", uri))
            }))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn records_calls_and_returns_defaults() {
        let mut client = MockMcpClient::new().with_tool(MockMcpClient::simple_tool("ping", "Ping"));

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);

        let result = client.call_tool("ping", None).await.unwrap();
        assert!(result.is_error.is_none());
        assert_eq!(client.call_count().await, 1);
        assert_eq!(client.calls().await[0].method, "tools/call");
    }

    #[tokio::test]
    async fn configured_failures_are_returned() {
        let mut client = MockMcpClient::new()
            .with_failure("file:///etc", "denied")
            .with_list_failure("prompts/list", "Method not found");

        assert!(client.list_prompts().await.is_err());
        let err = client.read_resource("file:///etc").await.unwrap_err();
        assert_eq!(err.to_string(), "denied");
        // failed invocations are still recorded
        assert_eq!(client.call_count().await, 1);
    }

    #[tokio::test]
    async fn hook_sees_every_invocation() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let mut client = MockMcpClient::new().on_call(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.call_tool("a", None).await.unwrap();
        client.get_prompt("b", None).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn scripted_responses_and_close() {
        let mut client = MockMcpClient::new()
            .with_prompt_response("greet", MockMcpClient::prompt_result("Hello, admin"))
            .with_resource_response(
                "file:///env",
                MockMcpClient::text_resource_result("file:///env", "API_KEY=abc"),
            );

        let prompt = client.get_prompt("greet", None).await.unwrap();
        assert_eq!(prompt.messages.len(), 1);
        let resource = client.read_resource("file:///env").await.unwrap();
        assert_eq!(resource.contents[0].text.as_deref(), Some("API_KEY=abc"));

        assert!(!client.is_closed());
        client.close().await.unwrap();
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn delayed_target_answers_late() {
        let mut client = MockMcpClient::new().with_delay("slow", Duration::from_millis(200));
        let result = tokio::time::timeout(Duration::from_millis(20), client.call_tool("slow", None)).await;
        assert!(result.is_err());
        assert!(client.call_tool("fast", None).await.is_ok());
    }
}
