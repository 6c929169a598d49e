//! Oracle client - routes requests to the provider behind a profile id
//!
//! Provides the single entry point the scanner uses to consult a language
//! model, with:
//! - Named profiles, each backed by its own provider
//! - Cancellation-aware calls
//! - Usage statistics

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::RwLock;

use crate::errors::is_cancellation;
use crate::scanner::cancel::CancellationSignal;

use super::config::{OracleProfiles, DEFAULT_PROFILE_ID};
use super::prompt::LlmRequest;
use super::provider::{create_provider, LlmProvider};
use super::response::LlmResponse;

/// Usage statistics across all profiles
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OracleStats {
    /// Calls that returned a response
    pub api_calls: u64,
    /// Calls that failed for a reason other than cancellation
    pub failures: u64,
    /// Total tokens used
    pub tokens_used: u64,
    /// Total response time in milliseconds
    pub total_response_time_ms: u64,
}

impl OracleStats {
    /// Calculate average response time
    pub fn avg_response_time_ms(&self) -> u64 {
        if self.api_calls == 0 {
            0
        } else {
            self.total_response_time_ms / self.api_calls
        }
    }
}

/// Profile registry for oracle requests
#[derive(Default)]
pub struct OracleClient {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
    /// Profiles whose provider could not be built, with the reason
    unavailable: BTreeMap<String, String>,
    stats: Arc<RwLock<OracleStats>>,
}

impl std::fmt::Debug for OracleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleClient")
            .field("profiles", &self.providers.keys().collect::<Vec<_>>())
            .field("unavailable", &self.unavailable)
            .finish()
    }
}

impl OracleClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a provider for every profile. A profile that cannot be built
    /// (for example a missing API key) is kept as unavailable and reported
    /// when a scan asks for it.
    pub fn from_profiles(profiles: &OracleProfiles) -> Self {
        let mut client = Self::new();
        for (id, config) in profiles.iter() {
            match create_provider(config) {
                Ok(provider) => {
                    tracing::debug!(
                        profile = id,
                        provider = provider.name(),
                        model = provider.model(),
                        "oracle profile ready"
                    );
                    client.providers.insert(id.to_string(), Arc::from(provider));
                }
                Err(e) => {
                    tracing::warn!("Oracle profile '{}' unavailable: {}", id, e);
                    client.unavailable.insert(id.to_string(), e.to_string());
                }
            }
        }
        client
    }

    /// Register `provider` as the `default` profile only
    pub fn single(provider: Arc<dyn LlmProvider>) -> Self {
        Self::new().with_provider(DEFAULT_PROFILE_ID, provider)
    }

    pub fn with_provider(mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        let id = id.into();
        self.unavailable.remove(&id);
        self.providers.insert(id, provider);
        self
    }

    pub fn has_profile(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    pub fn profile_ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Provider and model behind `id`
    pub fn describe(&self, id: &str) -> Option<(&'static str, &str)> {
        self.providers.get(id).map(|p| (p.name(), p.model()))
    }

    /// Why `id` cannot be used, if it is known but failed to build
    pub fn unavailable_reason(&self, id: &str) -> Option<&str> {
        self.unavailable.get(id).map(String::as_str)
    }

    fn provider(&self, id: &str) -> Result<&Arc<dyn LlmProvider>> {
        if let Some(provider) = self.providers.get(id) {
            return Ok(provider);
        }
        match self.unavailable.get(id) {
            Some(reason) => Err(anyhow!("Oracle profile '{}' is unavailable: {}", id, reason)),
            None => Err(anyhow!("Unknown oracle profile '{}'", id)),
        }
    }

    /// Send `request` to the provider behind `profile_id`, racing it
    /// against `cancel`.
    pub async fn call(
        &self,
        profile_id: &str,
        request: &LlmRequest,
        cancel: &CancellationSignal,
    ) -> Result<LlmResponse> {
        let provider = self.provider(profile_id)?;
        tracing::debug!(
            profile = profile_id,
            kind = %request.kind,
            "Sending {} bytes to {}",
            request.prompt.len(),
            provider.name()
        );

        let result = cancel.guard(provider.complete(request)).await;

        match result {
            Ok(response) => {
                let mut stats = self.stats.write().await;
                stats.api_calls += 1;
                stats.tokens_used += u64::from(response.tokens_used);
                stats.total_response_time_ms += response.response_time_ms;
                Ok(response)
            }
            Err(e) if is_cancellation(&e) => Err(e),
            Err(e) => {
                self.stats.write().await.failures += 1;
                Err(e).with_context(|| {
                    format!("Oracle request ({}) via {} failed", request.kind, provider.name())
                })
            }
        }
    }

    /// Check if the provider behind `profile_id` is reachable
    pub async fn health_check(&self, profile_id: &str) -> Result<bool> {
        self.provider(profile_id)?.health_check().await
    }

    /// Get current statistics
    pub async fn stats(&self) -> OracleStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::config::{AiConfig, ProviderKind};
    use crate::ai::prompt::RequestKind;
    use crate::ai::provider::MockProvider;
    use std::time::Duration;

    fn request() -> LlmRequest {
        LlmRequest::new(RequestKind::Narrative, "summarize")
    }

    #[test]
    fn stats_average() {
        let mut stats = OracleStats::default();
        assert_eq!(stats.avg_response_time_ms(), 0);
        stats.api_calls = 5;
        stats.total_response_time_ms = 1000;
        assert_eq!(stats.avg_response_time_ms(), 200);
    }

    #[tokio::test]
    async fn call_routes_by_profile_and_counts() {
        let fast = Arc::new(MockProvider::new().with_response(RequestKind::Narrative, "fast"));
        let client = OracleClient::single(Arc::new(MockProvider::new()))
            .with_provider("fast", fast.clone());

        let response = client
            .call("fast", &request(), &CancellationSignal::new())
            .await
            .unwrap();
        assert_eq!(response.content, "fast");
        assert_eq!(fast.call_count(), 1);
        assert_eq!(client.stats().await.api_calls, 1);
    }

    #[tokio::test]
    async fn unknown_profile_is_an_error() {
        let client = OracleClient::single(Arc::new(MockProvider::new()));
        let err = client
            .call("missing", &request(), &CancellationSignal::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown oracle profile"));
    }

    #[tokio::test]
    async fn failures_are_counted_but_cancellation_is_not() {
        let provider = Arc::new(MockProvider::new().with_delay(5_000));
        let client = OracleClient::single(provider.clone());

        let cancel = CancellationSignal::new();
        let trip = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trip.cancel();
        });
        let err = client
            .call(DEFAULT_PROFILE_ID, &request(), &cancel)
            .await
            .unwrap_err();
        assert!(is_cancellation(&err));
        assert_eq!(client.stats().await.failures, 0);

        provider.set_should_fail(true, "boom").await;
        let err = client
            .call(DEFAULT_PROFILE_ID, &request(), &CancellationSignal::new())
            .await
            .unwrap_err();
        assert!(!is_cancellation(&err));
        assert!(format!("{:#}", err).contains("boom"));
        assert_eq!(client.stats().await.failures, 1);
    }

    #[test]
    fn from_profiles_records_unavailable() {
        std::env::remove_var("OPENAI_API_KEY");
        let mut profiles = OracleProfiles::single(AiConfig::mock());
        profiles.insert(
            "hosted",
            AiConfig::default().with_provider(ProviderKind::OpenAI),
        );

        let client = OracleClient::from_profiles(&profiles);
        assert!(client.has_profile(DEFAULT_PROFILE_ID));
        assert!(!client.has_profile("hosted"));
        assert!(client.unavailable_reason("hosted").is_some());
        assert_eq!(client.describe(DEFAULT_PROFILE_ID), Some(("Mock", "mock-model")));
    }
}
