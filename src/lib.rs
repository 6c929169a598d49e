//! mcpaudit - risk evaluation for Model Context Protocol servers
//!
//! Walks every tool, prompt and resource a server exposes, asks a language
//! model oracle to assess definitions and judge live responses, and rolls
//! the results up into a single risk report.
//!
//! # Modules
//!
//! - `protocol` - MCP protocol definitions and JSON-RPC handling
//! - `transport` - stdio and streamable HTTP transports
//! - `client` - the execution client the scanner drives
//! - `ai` - oracle providers, profiles and request builders
//! - `scanner` - the scan orchestrator and risk aggregation
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mcpaudit::ai::{OracleClient, OracleProfiles};
//! use mcpaudit::scanner::{ScanConfig, ScanEngine, ScanRequest};
//!
//! let oracle = Arc::new(OracleClient::from_profiles(&profiles));
//! let engine = ScanEngine::new(ScanConfig::default(), oracle);
//! let report = engine
//!     .start_comprehensive_scan(&mut client, ScanRequest::new("my-server"))
//!     .await?;
//! report.print_text();
//! ```

pub mod ai;
pub mod client;
pub mod errors;
pub mod protocol;
pub mod scanner;
pub mod transport;

// Re-export commonly used types
pub use ai::OracleClient;
pub use errors::ScanError;
pub use scanner::{ScanConfig, ScanEngine, ScanReport, ScanRequest};
