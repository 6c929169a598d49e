//! Protocol layer for MCP communication
//!
//! - JSON-RPC 2.0 envelopes
//! - The MCP listing/invocation types the scanner exercises

pub mod jsonrpc;
pub mod mcp;

pub use jsonrpc::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use mcp::{
    CallToolResult, Content, GetPromptResult, Prompt, PromptArgument, ReadResourceResult,
    Resource, ResourceTemplate, ServerCapabilities, Tool,
};
