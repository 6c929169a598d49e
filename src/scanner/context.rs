//! Scan configuration and the context handed to each analysis step

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::ai::config::DEFAULT_PROFILE_ID;
use crate::ai::{LlmRequest, LlmResponse, OracleClient};
use crate::errors::ScanError;

use super::cancel::CancellationSignal;
use super::log::ScanLog;
use super::session::ScanPhase;

/// Options for one comprehensive scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Use the oracle for static analysis, verdicts and the narrative
    pub enable_llm_analysis: bool,
    /// Generate and run test cases (the dynamic phase)
    pub auto_generate: bool,
    /// Upper bound on generated test cases per parameterized component
    pub max_test_cases: usize,
    /// Oracle profile used for every request in this scan
    pub llm_config_id: String,
    /// Timeout for each call to the target server, in seconds
    pub timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enable_llm_analysis: true,
            auto_generate: true,
            max_test_cases: 5,
            llm_config_id: DEFAULT_PROFILE_ID.to_string(),
            timeout_secs: 30,
        }
    }
}

impl ScanConfig {
    pub fn with_llm_analysis(mut self, enabled: bool) -> Self {
        self.enable_llm_analysis = enabled;
        self
    }

    pub fn with_auto_generate(mut self, enabled: bool) -> Self {
        self.auto_generate = enabled;
        self
    }

    pub fn with_max_test_cases(mut self, max: usize) -> Self {
        self.max_test_cases = max;
        self
    }

    pub fn with_llm_config_id(mut self, id: impl Into<String>) -> Self {
        self.llm_config_id = id.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.llm_config_id.trim().is_empty() {
            return Err(ScanError::InvalidConfig {
                message: "llm_config_id is empty".to_string(),
                suggestion: format!("Use '{}' or a profile from [ai.profiles]", DEFAULT_PROFILE_ID),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ScanError::InvalidConfig {
                message: "timeout_secs must be greater than zero".to_string(),
                suggestion: "Set --timeout to at least 1 second".to_string(),
            });
        }
        Ok(())
    }
}

/// What a per-component step needs from the running session
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub oracle: &'a OracleClient,
    pub config: &'a ScanConfig,
    pub signal: &'a CancellationSignal,
    pub log: &'a ScanLog,
    pub phase: ScanPhase,
}

impl<'a> StepContext<'a> {
    /// Send `request` to the scan's oracle profile, racing cancellation.
    pub async fn consult(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.oracle
            .call(&self.config.llm_config_id, request, self.signal)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ScanConfig::default();
        assert!(config.enable_llm_analysis);
        assert!(config.auto_generate);
        assert_eq!(config.max_test_cases, 5);
        assert_eq!(config.llm_config_id, "default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_chain() {
        let config = ScanConfig::default()
            .with_llm_analysis(false)
            .with_auto_generate(false)
            .with_max_test_cases(0)
            .with_llm_config_id("fast")
            .with_timeout(5);
        assert!(!config.enable_llm_analysis);
        assert!(!config.auto_generate);
        assert_eq!(config.max_test_cases, 0);
        assert_eq!(config.llm_config_id, "fast");
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn rejects_blank_profile() {
        let err = ScanConfig::default()
            .with_llm_config_id("  ")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig { .. }));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ScanConfig = toml::from_str("max_test_cases = 2").unwrap();
        assert_eq!(config.max_test_cases, 2);
        assert!(config.auto_generate);
    }
}
