//! AI Module - the language-model oracle
//!
//! The scanner consults an oracle to analyze component definitions,
//! generate test cases, judge responses and write the closing narrative.
//! Several provider backends are supported (Anthropic, OpenAI, Ollama) plus
//! a scripted mock.
//!
//! # Example
//!
//! ```rust,ignore
//! use mcpaudit::ai::{OracleClient, OracleProfiles};
//!
//! let profiles = OracleProfiles::from_toml(&table)?;
//! let oracle = OracleClient::from_profiles(&profiles);
//! let response = oracle.call("default", &request, &cancel).await?;
//! println!("{}", response.content);
//! ```

pub mod config;
pub mod engine;
pub mod prompt;
pub mod provider;
pub mod response;

pub use config::{AiConfig, ConfigLoadError, OracleProfiles, ProviderKind, DEFAULT_PROFILE_ID};
pub use engine::{OracleClient, OracleStats};
pub use prompt::{
    build_evaluation_request, build_narrative_request, build_static_analysis_request,
    build_test_case_request, LlmRequest, RequestKind,
};
pub use provider::{create_provider, AiProviderError, LlmProvider, MockProvider};
pub use response::{extract_json_array, extract_json_object, LlmResponse};
