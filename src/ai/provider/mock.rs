//! Mock Provider - Testing implementation
//!
//! Answers from per-request-kind queues, falling back to a default text
//! for each kind, without any network calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::super::prompt::{LlmRequest, RequestKind};
use super::super::response::LlmResponse;
use super::LlmProvider;

const DEFAULT_STATIC: &str = "[]";
const DEFAULT_GENERATION: &str = r#"[{"riskType": "baseline", "purpose": "Mock baseline check", "parameters": {}, "expectedBehavior": "Handled without side effects", "judgmentCriteria": "No sensitive output", "riskLevel": "low"}]"#;
const DEFAULT_EVALUATION: &str =
    r#"{"riskLevel": "low", "description": "Mock evaluation: no issue observed", "evidence": "", "recommendation": ""}"#;
const DEFAULT_NARRATIVE: &str = "Mock narrative: no further analysis available.";

/// Mock oracle for testing
pub struct MockProvider {
    /// Model name to report
    model: String,
    /// Simulated response delay in milliseconds
    delay_ms: u64,
    /// Track number of calls
    call_count: AtomicU32,
    /// Scripted responses, consumed in order per kind
    queues: Mutex<HashMap<RequestKind, VecDeque<String>>>,
    /// Used when a kind's queue is empty
    defaults: HashMap<RequestKind, String>,
    /// Every request received
    requests: Mutex<Vec<LlmRequest>>,
    /// Whether to simulate errors
    should_fail: Arc<Mutex<bool>>,
    /// Error message to return when failing
    error_message: Arc<Mutex<String>>,
}

impl MockProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        let defaults = HashMap::from([
            (RequestKind::StaticAnalysis, DEFAULT_STATIC.to_string()),
            (RequestKind::TestGeneration, DEFAULT_GENERATION.to_string()),
            (RequestKind::Evaluation, DEFAULT_EVALUATION.to_string()),
            (RequestKind::Narrative, DEFAULT_NARRATIVE.to_string()),
        ]);
        Self {
            model: "mock-model".to_string(),
            delay_ms: 0,
            call_count: AtomicU32::new(0),
            queues: Mutex::new(HashMap::new()),
            defaults,
            requests: Mutex::new(Vec::new()),
            should_fail: Arc::new(Mutex::new(false)),
            error_message: Arc::new(Mutex::new("Mock error".to_string())),
        }
    }

    /// Set the model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set simulated delay
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Queue a response for the next request of `kind`
    pub fn with_response(mut self, kind: RequestKind, text: impl Into<String>) -> Self {
        self.queues
            .get_mut()
            .entry(kind)
            .or_default()
            .push_back(text.into());
        self
    }

    /// Replace the answer used once `kind`'s queue is empty
    pub fn with_default(mut self, kind: RequestKind, text: impl Into<String>) -> Self {
        self.defaults.insert(kind, text.into());
        self
    }

    /// Queue a response after construction
    pub async fn push_response(&self, kind: RequestKind, text: impl Into<String>) {
        self.queues
            .lock()
            .await
            .entry(kind)
            .or_default()
            .push_back(text.into());
    }

    /// Set the provider to fail on subsequent calls
    pub async fn set_should_fail(&self, should_fail: bool, message: &str) {
        *self.should_fail.lock().await = should_fail;
        *self.error_message.lock().await = message.to_string();
    }

    /// Get the number of calls made
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Number of requests received of `kind`
    pub async fn calls_for(&self, kind: RequestKind) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    pub async fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());

        if *self.should_fail.lock().await {
            let message = self.error_message.lock().await.clone();
            anyhow::bail!("{}", message);
        }

        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }

        let scripted = self
            .queues
            .lock()
            .await
            .get_mut(&request.kind)
            .and_then(VecDeque::pop_front);
        let content = scripted
            .or_else(|| self.defaults.get(&request.kind).cloned())
            .unwrap_or_default();

        let tokens = (request.prompt.len() + content.len()) as u32 / 4;
        Ok(LlmResponse::new(content)
            .with_tokens(tokens)
            .with_response_time(self.delay_ms))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!*self.should_fail.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: RequestKind) -> LlmRequest {
        LlmRequest::new(kind, "prompt")
    }

    #[tokio::test]
    async fn queued_responses_then_default() {
        let provider = MockProvider::new()
            .with_response(RequestKind::Evaluation, "first")
            .with_response(RequestKind::Evaluation, "second");

        let a = provider.complete(&request(RequestKind::Evaluation)).await.unwrap();
        let b = provider.complete(&request(RequestKind::Evaluation)).await.unwrap();
        let c = provider.complete(&request(RequestKind::Evaluation)).await.unwrap();

        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
        assert_eq!(c.content, DEFAULT_EVALUATION);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn queues_are_per_kind() {
        let provider = MockProvider::new().with_response(RequestKind::TestGeneration, "[]");
        let stat = provider
            .complete(&request(RequestKind::StaticAnalysis))
            .await
            .unwrap();
        assert_eq!(stat.content, "[]");
        provider.push_response(RequestKind::Narrative, "story").await;
        let narrative = provider.complete(&request(RequestKind::Narrative)).await.unwrap();
        assert_eq!(narrative.content, "story");
        assert_eq!(provider.calls_for(RequestKind::StaticAnalysis).await, 1);
        assert_eq!(provider.calls_for(RequestKind::TestGeneration).await, 0);
    }

    #[tokio::test]
    async fn failure_switch() {
        let provider = MockProvider::new();
        provider.set_should_fail(true, "quota exhausted").await;
        let err = provider
            .complete(&request(RequestKind::Evaluation))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "quota exhausted");
        assert!(!provider.health_check().await.unwrap());

        provider.set_should_fail(false, "").await;
        assert!(provider.complete(&request(RequestKind::Evaluation)).await.is_ok());
    }

    #[tokio::test]
    async fn default_generation_parses_as_cases() {
        let provider = MockProvider::new();
        let response = provider
            .complete(&request(RequestKind::TestGeneration))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&response.content).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(1));
    }
}
