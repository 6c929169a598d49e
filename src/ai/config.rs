//! Oracle configuration - provider, model and profile settings
//!
//! A scan names the oracle profile it uses (`llm_config_id`). Profiles are
//! read from the `[ai]` section of the config file: `[ai]` itself is the
//! `default` profile and each `[ai.profiles.<id>]` table adds another,
//! inheriting unspecified keys from `[ai]`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PROFILE_ID: &str = "default";

/// LLM backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    OpenAI,
    Ollama,
    /// Scripted responses, no network
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Mock => "mock",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude-sonnet-4-20250514",
            ProviderKind::OpenAI => "gpt-4o",
            ProviderKind::Ollama => "llama3.2",
            ProviderKind::Mock => "mock-model",
        }
    }

    pub fn env_key_name(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::OpenAI => Some("OPENAI_API_KEY"),
            ProviderKind::Ollama | ProviderKind::Mock => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "openai" | "gpt" => Ok(ProviderKind::OpenAI),
            "ollama" | "local" => Ok(ProviderKind::Ollama),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(format!(
                "unknown provider '{}' (expected anthropic, openai, ollama or mock)",
                other
            )),
        }
    }
}

/// Settings for one oracle profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub provider: ProviderKind,
    pub model: String,
    /// Never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub ollama_url: String,
    pub max_tokens: u32,
    /// 0.0 - 1.0
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: ProviderKind::default().default_model().to_string(),
            api_key: None,
            ollama_url: "http://localhost:11434".to_string(),
            max_tokens: 4096,
            temperature: 0.2,
            timeout_secs: 120,
        }
    }
}

impl AiConfig {
    pub fn mock() -> Self {
        Self::default().with_provider(ProviderKind::Mock)
    }

    /// Switch provider, resetting the model to that provider's default.
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self.model = provider.default_model().to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_ollama_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_url = url.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp.clamp(0.0, 1.0);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn load_api_key_from_env(&mut self) {
        if self.api_key.is_none() {
            if let Some(var) = self.provider.env_key_name() {
                self.api_key = std::env::var(var).ok();
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(var) = self.provider.env_key_name() {
            if self.api_key.is_none() {
                return Err(format!("Missing API key. Set {} environment variable", var));
            }
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be greater than 0".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Overlay the keys present in `table` onto `self`.
    fn apply_table(mut self, table: &toml::Table) -> Result<Self, ConfigLoadError> {
        if let Some(provider) = table.get("provider").and_then(|v| v.as_str()) {
            let provider: ProviderKind = provider.parse().map_err(ConfigLoadError::ParseError)?;
            self = self.with_provider(provider);
        }
        if let Some(model) = table.get("model").and_then(|v| v.as_str()) {
            self.model = model.to_string();
        }
        if let Some(key) = table.get("api_key").and_then(|v| v.as_str()) {
            self.api_key = Some(key.to_string());
        }
        if let Some(url) = table.get("ollama_url").and_then(|v| v.as_str()) {
            self.ollama_url = url.to_string();
        }
        if let Some(tokens) = table.get("max_tokens").and_then(|v| v.as_integer()) {
            self.max_tokens = tokens.max(0) as u32;
        }
        if let Some(temp) = table.get("temperature").and_then(|v| v.as_float()) {
            self.temperature = (temp as f32).clamp(0.0, 1.0);
        }
        if let Some(secs) = table.get("timeout_secs").and_then(|v| v.as_integer()) {
            self.timeout_secs = secs.max(0) as u64;
        }
        Ok(self)
    }
}

/// Named oracle profiles keyed by id
#[derive(Debug, Clone)]
pub struct OracleProfiles {
    profiles: BTreeMap<String, AiConfig>,
}

impl Default for OracleProfiles {
    fn default() -> Self {
        Self::single(AiConfig::default())
    }
}

impl OracleProfiles {
    /// Only a `default` profile
    pub fn single(config: AiConfig) -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(DEFAULT_PROFILE_ID.to_string(), config);
        Self { profiles }
    }

    pub fn insert(&mut self, id: impl Into<String>, config: AiConfig) {
        self.profiles.insert(id.into(), config);
    }

    pub fn get(&self, id: &str) -> Option<&AiConfig> {
        self.profiles.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut AiConfig> {
        self.profiles.get_mut(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AiConfig)> {
        self.profiles.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parse the `[ai]` section of a config document. A missing section
    /// yields only the default profile.
    pub fn from_toml(table: &toml::Table) -> Result<Self, ConfigLoadError> {
        let Some(ai) = table.get("ai") else {
            let mut config = AiConfig::default();
            config.load_api_key_from_env();
            return Ok(Self::single(config));
        };
        let ai = ai
            .as_table()
            .ok_or_else(|| ConfigLoadError::ParseError("[ai] must be a table".to_string()))?;

        let base = AiConfig::default().apply_table(ai)?;
        let mut profiles = Self::single(base.clone());

        if let Some(extra) = ai.get("profiles").and_then(|v| v.as_table()) {
            for (id, value) in extra {
                let table = value.as_table().ok_or_else(|| {
                    ConfigLoadError::ParseError(format!("[ai.profiles.{}] must be a table", id))
                })?;
                profiles.insert(id.clone(), base.clone().apply_table(table)?);
            }
        }

        for config in profiles.profiles.values_mut() {
            config.load_api_key_from_env();
        }
        Ok(profiles)
    }
}

/// Candidate config file locations, most specific first
pub fn config_search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(p) = explicit {
        return vec![p.to_path_buf()];
    }
    let mut paths = vec![
        PathBuf::from(".mcpaudit.toml"),
        PathBuf::from("mcpaudit.toml"),
    ];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("mcpaudit").join("config.toml"));
    }
    paths
}

/// Read and parse the first config file that exists.
pub fn load_config_table(explicit: Option<&Path>) -> Result<toml::Table, ConfigLoadError> {
    for path in config_search_paths(explicit) {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .map_err(|e| ConfigLoadError::ReadError(e.to_string()))?;
            return content
                .parse::<toml::Table>()
                .map_err(|e| ConfigLoadError::ParseError(e.to_string()));
        }
    }
    if let Some(p) = explicit {
        return Err(ConfigLoadError::ReadError(format!(
            "{} does not exist",
            p.display()
        )));
    }
    Err(ConfigLoadError::NotFound)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found")]
    NotFound,

    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(s: &str) -> toml::Table {
        s.parse().unwrap()
    }

    #[test]
    fn provider_parsing() {
        assert_eq!("claude".parse::<ProviderKind>(), Ok(ProviderKind::Anthropic));
        assert_eq!("GPT".parse::<ProviderKind>(), Ok(ProviderKind::OpenAI));
        assert_eq!("local".parse::<ProviderKind>(), Ok(ProviderKind::Ollama));
        assert!("gemini".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn with_provider_resets_model() {
        let config = AiConfig::default().with_provider(ProviderKind::Ollama);
        assert_eq!(config.model, "llama3.2");
    }

    #[test]
    fn missing_ai_section_yields_default_profile() {
        let profiles = OracleProfiles::from_toml(&table("[scan]\nmax_test_cases = 2")).unwrap();
        assert_eq!(profiles.ids().collect::<Vec<_>>(), vec![DEFAULT_PROFILE_ID]);
    }

    #[test]
    fn named_profiles_inherit_from_base() {
        let profiles = OracleProfiles::from_toml(&table(
            r#"
            [ai]
            provider = "ollama"
            temperature = 3.5

            [ai.profiles.fast]
            model = "qwen2.5"
            "#,
        ))
        .unwrap();

        let base = profiles.get(DEFAULT_PROFILE_ID).unwrap();
        assert_eq!(base.provider, ProviderKind::Ollama);
        assert_eq!(base.temperature, 1.0);

        let fast = profiles.get("fast").unwrap();
        assert_eq!(fast.provider, ProviderKind::Ollama);
        assert_eq!(fast.model, "qwen2.5");
    }

    #[test]
    fn invalid_provider_is_parse_error() {
        let err = OracleProfiles::from_toml(&table("[ai]\nprovider = \"bard\"")).unwrap_err();
        assert!(matches!(err, ConfigLoadError::ParseError(_)));
    }

    #[test]
    fn validation_requires_key_for_hosted_providers() {
        let config = AiConfig::default().with_provider(ProviderKind::OpenAI);
        let config = AiConfig {
            api_key: None,
            ..config
        };
        assert!(config.validate().is_err());
        assert!(AiConfig::mock().validate().is_ok());
    }

    #[test]
    fn explicit_missing_path_is_read_error() {
        let err = load_config_table(Some(Path::new("/nonexistent/mcpaudit.toml"))).unwrap_err();
        assert!(matches!(err, ConfigLoadError::ReadError(_)));
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.toml");
        std::fs::write(&path, "[ai]\nprovider = \"mock\"\n").unwrap();

        let table = load_config_table(Some(&path)).unwrap();
        let profiles = OracleProfiles::from_toml(&table).unwrap();
        assert_eq!(
            profiles.get(DEFAULT_PROFILE_ID).unwrap().provider,
            ProviderKind::Mock
        );
    }
}
