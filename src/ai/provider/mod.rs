//! Oracle providers
//!
//! The [`LlmProvider`] trait and implementations for Anthropic, OpenAI,
//! Ollama, and a scripted mock for tests.

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;

use super::config::{AiConfig, ProviderKind};
use super::prompt::LlmRequest;
use super::response::LlmResponse;

pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// A language model that answers [`LlmRequest`]s
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &'static str;

    /// Model being used
    fn model(&self) -> &str;

    /// Send one request and return the model's text
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check if provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;
}

/// Error types for oracle providers
#[derive(Debug, thiserror::Error)]
pub enum AiProviderError {
    #[error("API key not configured for {provider}")]
    MissingApiKey { provider: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded { message: String },

    #[error("API error from {provider}: {message}")]
    ApiError { provider: String, message: String },

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Provider {provider} is not available: {reason}")]
    Unavailable { provider: String, reason: String },
}

fn require_key(config: &AiConfig, provider: &str) -> Result<String> {
    let from_env = config
        .provider
        .env_key_name()
        .and_then(|var| std::env::var(var).ok());
    config
        .api_key
        .clone()
        .or(from_env)
        .ok_or_else(|| {
            AiProviderError::MissingApiKey {
                provider: provider.to_string(),
            }
            .into()
        })
}

/// Create a provider based on configuration
pub fn create_provider(config: &AiConfig) -> Result<Box<dyn LlmProvider>> {
    match config.provider {
        ProviderKind::Anthropic => {
            let api_key = require_key(config, "Anthropic")?;
            Ok(Box::new(AnthropicProvider::new(
                api_key,
                config.model.clone(),
                config.max_tokens,
                config.temperature,
                config.timeout(),
            )?))
        }
        ProviderKind::OpenAI => {
            let api_key = require_key(config, "OpenAI")?;
            Ok(Box::new(OpenAiProvider::new(
                api_key,
                config.model.clone(),
                config.max_tokens,
                config.temperature,
                config.timeout(),
            )?))
        }
        ProviderKind::Ollama => Ok(Box::new(OllamaProvider::new(
            config.ollama_url.clone(),
            config.model.clone(),
            config.max_tokens,
            config.temperature,
            config.timeout(),
        )?)),
        ProviderKind::Mock => Ok(Box::new(MockProvider::new().with_model(config.model.clone()))),
    }
}

/// Wrap a transport-level failure, mapping timeouts to
/// [`AiProviderError::Timeout`].
pub(crate) fn map_send_error(err: reqwest::Error, provider: &str, timeout_secs: u64) -> anyhow::Error {
    if err.is_timeout() {
        AiProviderError::Timeout {
            seconds: timeout_secs,
        }
        .into()
    } else {
        anyhow::Error::new(err).context(format!("Failed to send request to {} API", provider))
    }
}
