//! CLI configuration
//!
//! Settings come from the config file (`[scan]` and `[ai]` sections) and
//! are then overridden by command-line flags.

use std::path::Path;

use mcpaudit::ai::config::load_config_table;
use mcpaudit::ai::{ConfigLoadError, OracleProfiles, ProviderKind, DEFAULT_PROFILE_ID};
use mcpaudit::ScanConfig;

/// Everything read from the config file
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    pub scan: ScanConfig,
    pub profiles: OracleProfiles,
}

impl FileConfig {
    /// Load from `explicit`, or the first default location that exists.
    /// No file at a default location means built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigLoadError> {
        match load_config_table(explicit) {
            Ok(table) => Self::from_table(&table),
            Err(ConfigLoadError::NotFound) => {
                tracing::debug!("No config file found, using defaults");
                Self::from_table(&toml::Table::new())
            }
            Err(e) => Err(e),
        }
    }

    pub fn from_table(table: &toml::Table) -> Result<Self, ConfigLoadError> {
        let scan = match table.get("scan") {
            Some(value) => value
                .clone()
                .try_into::<ScanConfig>()
                .map_err(|e| ConfigLoadError::ParseError(format!("[scan]: {}", e)))?,
            None => ScanConfig::default(),
        };
        Ok(Self {
            scan,
            profiles: OracleProfiles::from_toml(table)?,
        })
    }
}

/// Flags that override file values
#[derive(Debug, Clone, Default)]
pub struct ScanOverrides {
    pub profile_id: Option<String>,
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub max_test_cases: Option<usize>,
    pub no_llm: bool,
    pub no_generate: bool,
    pub timeout: Option<u64>,
}

impl ScanOverrides {
    /// Apply onto `config`. Provider and model flags rewrite the selected
    /// profile, creating it from defaults if the file did not define it.
    pub fn apply(&self, config: &mut FileConfig) {
        if let Some(id) = &self.profile_id {
            config.scan.llm_config_id = id.clone();
        }
        if let Some(max) = self.max_test_cases {
            config.scan.max_test_cases = max;
        }
        if self.no_llm {
            config.scan.enable_llm_analysis = false;
        }
        if self.no_generate {
            config.scan.auto_generate = false;
        }
        if let Some(timeout) = self.timeout {
            config.scan.timeout_secs = timeout;
        }

        if self.provider.is_none() && self.model.is_none() {
            return;
        }
        let id = config.scan.llm_config_id.clone();
        let mut profile = config
            .profiles
            .get(&id)
            .or_else(|| config.profiles.get(DEFAULT_PROFILE_ID))
            .cloned()
            .unwrap_or_default();
        if let Some(provider) = self.provider {
            profile = profile.with_provider(provider);
            profile.api_key = None;
            profile.load_api_key_from_env();
        }
        if let Some(model) = &self.model {
            profile = profile.with_model(model.clone());
        }
        config.profiles.insert(id, profile);
    }
}
