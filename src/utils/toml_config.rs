//! TOML-based configuration for the research orchestrator
//!
//! Configuration is read from an optional TOML file (`quest.toml` by default)
//! and then overridden by `QUEST_*` environment variables, so every limit and
//! timeout can be changed without a code change.
//!
//! Every field carries a serde default: an empty file (or no file at all)
//! yields a working configuration.

use crate::provider::ResearchModel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default configuration file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "quest.toml";

/// Root configuration structure loaded from quest.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuestConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    /// Phase → model identifier table
    #[serde(default)]
    pub models: ModelTable,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub validation: ValidationConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible search/reasoning API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Transport-level timeout for a single HTTP request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://api.perplexity.ai".to_string()
}

fn default_api_key_env() -> String {
    "PERPLEXITY_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ============= Model Configuration =============

/// Fixed mapping from pipeline phase to upstream model identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelTable {
    #[serde(default = "default_planning_model")]
    pub planning: String,

    #[serde(default = "default_deep_model")]
    pub deep: String,

    #[serde(default = "default_validation_model")]
    pub validation: String,

    #[serde(default = "default_summarization_model")]
    pub summarization: String,
}

fn default_planning_model() -> String {
    "sonar-reasoning-pro".to_string()
}

fn default_deep_model() -> String {
    "sonar-deep-research".to_string()
}

fn default_validation_model() -> String {
    "sonar-reasoning".to_string()
}

fn default_summarization_model() -> String {
    "sonar-pro".to_string()
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            planning: default_planning_model(),
            deep: default_deep_model(),
            validation: default_validation_model(),
            summarization: default_summarization_model(),
        }
    }
}

impl ModelTable {
    pub fn model_for(&self, model: ResearchModel) -> &str {
        match model {
            ResearchModel::Planning => &self.planning,
            ResearchModel::Deep => &self.deep,
            ResearchModel::Validation => &self.validation,
            ResearchModel::Summarization => &self.summarization,
        }
    }
}

// ============= Research Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchConfig {
    /// Upper bound on sub-queries per plan
    #[serde(default = "default_max_sub_queries")]
    pub max_sub_queries: usize,

    /// Simultaneous provider calls per session
    #[serde(default = "default_session_concurrency")]
    pub session_concurrency: usize,

    /// Simultaneous provider calls across all sessions
    #[serde(default = "default_global_concurrency")]
    pub global_concurrency: usize,

    /// Live sessions admitted before new ones are rejected
    #[serde(default = "default_max_active_sessions")]
    pub max_active_sessions: usize,

    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Whole-session wall-clock budget
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Retries for transient provider errors
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

fn default_max_sub_queries() -> usize {
    8
}

fn default_session_concurrency() -> usize {
    5
}

fn default_global_concurrency() -> usize {
    16
}

fn default_max_active_sessions() -> usize {
    64
}

fn default_call_timeout() -> u64 {
    30
}

fn default_session_timeout() -> u64 {
    600
}

fn default_retry_count() -> u32 {
    2
}

fn default_retry_base_delay() -> u64 {
    500
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_sub_queries: default_max_sub_queries(),
            session_concurrency: default_session_concurrency(),
            global_concurrency: default_global_concurrency(),
            max_active_sessions: default_max_active_sessions(),
            call_timeout_secs: default_call_timeout(),
            session_timeout_secs: default_session_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay(),
        }
    }
}

impl ResearchConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

// ============= Validation Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationConfig {
    /// Minimum similarity for two claims to share a group
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Multiplicative boost per corroborating finding
    #[serde(default = "default_corroboration_boost")]
    pub corroboration_boost: f32,

    /// Confidence multiplier for findings whose comparisons failed
    #[serde(default = "default_degraded_penalty")]
    pub degraded_penalty: f32,
}

fn default_similarity_threshold() -> f32 {
    0.75
}

fn default_corroboration_boost() -> f32 {
    0.1
}

fn default_degraded_penalty() -> f32 {
    0.8
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            corroboration_boost: default_corroboration_boost(),
            degraded_penalty: default_degraded_penalty(),
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{name}' has invalid value '{value}'")]
    InvalidEnv { name: String, value: String },

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),
}

impl From<ConfigError> for crate::types::AppError {
    fn from(err: ConfigError) -> Self {
        crate::types::AppError::Configuration(err.to_string())
    }
}

impl QuestConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let mut config: QuestConfig = toml::from_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load `path` if given, else `quest.toml` when present, else defaults.
    /// Environment overrides are applied in every case.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::load(default_path);
        }

        debug!("No configuration file found, using defaults");
        Self::from_env()
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = QuestConfig::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `QUEST_*` overrides read through `lookup`.
    ///
    /// Taking the lookup as a function keeps tests off the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("QUEST_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("QUEST_PORT") {
            self.server.port = parse_env("QUEST_PORT", &v)?;
        }
        if let Some(v) = lookup("QUEST_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Some(v) = lookup("QUEST_PROVIDER_ENDPOINT") {
            self.provider.endpoint = v;
        }
        if let Some(v) = lookup("QUEST_PROVIDER_API_KEY_ENV") {
            self.provider.api_key_env = v;
        }

        let research = &mut self.research;
        if let Some(v) = lookup("QUEST_MAX_SUB_QUERIES") {
            research.max_sub_queries = parse_env("QUEST_MAX_SUB_QUERIES", &v)?;
        }
        if let Some(v) = lookup("QUEST_SESSION_CONCURRENCY") {
            research.session_concurrency = parse_env("QUEST_SESSION_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("QUEST_GLOBAL_CONCURRENCY") {
            research.global_concurrency = parse_env("QUEST_GLOBAL_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("QUEST_MAX_ACTIVE_SESSIONS") {
            research.max_active_sessions = parse_env("QUEST_MAX_ACTIVE_SESSIONS", &v)?;
        }
        if let Some(v) = lookup("QUEST_CALL_TIMEOUT_SECS") {
            research.call_timeout_secs = parse_env("QUEST_CALL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("QUEST_SESSION_TIMEOUT_SECS") {
            research.session_timeout_secs = parse_env("QUEST_SESSION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("QUEST_RETRY_COUNT") {
            research.retry_count = parse_env("QUEST_RETRY_COUNT", &v)?;
        }
        if let Some(v) = lookup("QUEST_RETRY_BASE_DELAY_MS") {
            research.retry_base_delay_ms = parse_env("QUEST_RETRY_BASE_DELAY_MS", &v)?;
        }

        Ok(())
    }

    /// Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let research = &self.research;

        let positive = [
            ("research.max_sub_queries", research.max_sub_queries as u64),
            ("research.session_concurrency", research.session_concurrency as u64),
            ("research.global_concurrency", research.global_concurrency as u64),
            ("research.max_active_sessions", research.max_active_sessions as u64),
            ("research.call_timeout_secs", research.call_timeout_secs),
            ("research.session_timeout_secs", research.session_timeout_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        let unit = [
            ("validation.similarity_threshold", self.validation.similarity_threshold),
            ("validation.degraded_penalty", self.validation.degraded_penalty),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.validation.corroboration_boost < 0.0 {
            return Err(ConfigError::ValidationError(
                "validation.corroboration_boost must not be negative".to_string(),
            ));
        }

        if self.provider.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "provider.endpoint must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the provider API key from the environment
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.provider.api_key_env)
            .map_err(|_| ConfigError::MissingEnvVar(self.provider.api_key_env.clone()))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}
