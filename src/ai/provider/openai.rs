//! OpenAI Provider - GPT API integration
//!
//! Implements the LlmProvider trait for OpenAI's chat completion models.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::super::prompt::{LlmRequest, RequestKind};
use super::super::response::LlmResponse;
use super::{map_send_error, AiProviderError, LlmProvider};

/// OpenAI GPT API provider
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiProvider {
    const API_URL: &'static str = "https://api.openai.com/v1/chat/completions";

    /// Create a new OpenAI provider
    pub fn new(
        api_key: String,
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
            api_key,
            model,
            max_tokens,
            temperature,
            timeout,
            client,
        })
    }

    fn build_request(&self, request: &LlmRequest) -> ChatRequest {
        // JSON mode only admits a top-level object, so it is limited to
        // verdicts; analysis and generation answer with arrays.
        let response_format = (request.kind == RequestKind::Evaluation).then(|| ResponseFormat {
            type_field: "json_object".to_string(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
            max_tokens: Some(request.max_tokens.unwrap_or(self.max_tokens)),
            temperature: Some(request.temperature.unwrap_or(self.temperature)),
            response_format,
        }
    }

    /// Make a request to the OpenAI API
    async fn make_request(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .client
            .post(Self::API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| map_send_error(e, "OpenAI", self.timeout.as_secs()))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AiProviderError::RateLimitExceeded {
                message: "OpenAI API rate limit exceeded".to_string(),
            }
            .into());
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiProviderError::ApiError {
                provider: "OpenAI".to_string(),
                message: format!("HTTP {}: {}", status, error_text),
            }
            .into());
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI API response")?;

        Ok(api_response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let start = Instant::now();
        let response = self.make_request(&self.build_request(request)).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiProviderError::InvalidResponse {
                provider: "OpenAI".to_string(),
                message: "response contained no choices".to_string(),
            })?;

        Ok(LlmResponse::new(text)
            .with_tokens(response.usage.map(|u| u.total_tokens).unwrap_or(0))
            .with_response_time(start.elapsed().as_millis() as u64))
    }

    async fn health_check(&self) -> Result<bool> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "Respond with just the word 'ok'".to_string(),
            }],
            max_tokens: Some(10),
            temperature: Some(0.0),
            response_format: None,
        };

        let response = self
            .client
            .post(Self::API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        Ok(response.status().is_success())
    }
}

// API Request/Response types

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    type_field: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TokenUsage {
    total_tokens: u32,
}
