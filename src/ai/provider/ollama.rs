//! Ollama Provider - Local model integration
//!
//! Implements the LlmProvider trait for locally-running Ollama models.
//! Supports air-gapped environments and offline use.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::super::prompt::LlmRequest;
use super::super::response::LlmResponse;
use super::{map_send_error, AiProviderError, LlmProvider};

/// Ollama local model provider
pub struct OllamaProvider {
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new(
        base_url: String,
        model: String,
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url,
            model,
            max_tokens,
            temperature,
            timeout,
            client,
        })
    }

    /// Get the API endpoint URL
    fn api_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, request: &LlmRequest) -> GenerateRequest {
        // No `format: "json"`: constrained decoding is far slower on small
        // hosts, and every caller parses JSON out of free text anyway.
        GenerateRequest {
            model: self.model.clone(),
            prompt: request.prompt.clone(),
            system: Some(request.system.clone()),
            stream: Some(false),
            options: Some(GenerateOptions {
                temperature: Some(request.temperature.unwrap_or(self.temperature)),
                num_predict: Some(request.max_tokens.unwrap_or(self.max_tokens)),
            }),
        }
    }

    /// Make a request to the Ollama API
    async fn make_request(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let response = self
            .client
            .post(self.api_url())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AiProviderError::Unavailable {
                        provider: "Ollama".to_string(),
                        reason: format!("cannot reach {}", self.base_url),
                    }
                    .into()
                } else {
                    map_send_error(e, "Ollama", self.timeout.as_secs())
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiProviderError::ApiError {
                provider: "Ollama".to_string(),
                message: format!("HTTP {}: {}", status, error_text),
            }
            .into());
        }

        let api_response: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Ollama API response")?;

        Ok(api_response)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let start = Instant::now();
        let response = self.make_request(&self.build_request(request)).await?;

        let tokens = response.prompt_eval_count.unwrap_or(0) + response.eval_count.unwrap_or(0);
        Ok(LlmResponse::new(response.response)
            .with_tokens(tokens)
            .with_response_time(start.elapsed().as_millis() as u64))
    }

    async fn health_check(&self) -> Result<bool> {
        // Check if Ollama is running by hitting the version endpoint
        let url = format!("{}/api/version", self.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

// API Request/Response types

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::prompt::RequestKind;

    fn provider(url: &str) -> OllamaProvider {
        OllamaProvider::new(
            url.to_string(),
            "llama3.2".to_string(),
            2048,
            0.3,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn api_url_trims_trailing_slash() {
        assert_eq!(
            provider("http://localhost:11434/").api_url(),
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn request_is_non_streaming_without_json_format() {
        let request = provider("http://localhost:11434")
            .build_request(&LlmRequest::new(RequestKind::StaticAnalysis, "analyze"));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], false);
        assert!(value.get("format").is_none());
        assert_eq!(value["options"]["num_predict"], 2048);
    }

    #[test]
    fn response_counts_are_optional() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"response": "ok"}"#).unwrap();
        assert_eq!(parsed.response, "ok");
        assert!(parsed.eval_count.is_none());
    }

    #[tokio::test]
    async fn health_check_reports_unreachable_host() {
        let provider = provider("http://127.0.0.1:9");
        assert!(!provider.health_check().await.unwrap());
    }
}
