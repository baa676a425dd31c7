//! Configuration loading, validation, and management for datalyst.
//!
//! Loads configuration from `~/.datalyst/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.datalyst/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reasoning backend settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Control loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Gateway (serving variant) settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Benchmark harness settings
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Settings for the OpenAI-compatible reasoning backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name used in logs (e.g. "lmstudio", "openai")
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Base URL of the `/v1` API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. Local servers accept any value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens per response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Upper bound on one backend call, in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "lmstudio".into()
}
fn default_base_url() -> String {
    "http://127.0.0.1:1234/v1".into()
}
fn default_model() -> String {
    "lmstudio-community/Qwen2.5-7B-Instruct-1M-GGUF".into()
}
fn default_provider_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: default_provider_timeout(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Control loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of decision steps per run
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: u32,

    /// Run independent tool calls of one turn concurrently
    #[serde(default)]
    pub parallel_tool_calls: bool,

    /// Abort the run on unknown tools or invalid arguments instead of
    /// reporting them back to the model
    #[serde(default)]
    pub strict_dispatch: bool,

    /// Refuse a final answer until at least one tool has run, when files are known
    #[serde(default)]
    pub require_tool_use: bool,

    /// Identical failing calls allowed before further retries are blocked
    #[serde(default = "default_max_identical_failures")]
    pub max_identical_failures: u32,

    /// Replace the built-in directive text (the file list is still appended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive_override: Option<String>,
}

fn default_recursion_limit() -> u32 {
    25
}
fn default_max_identical_failures() -> u32 {
    2
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            recursion_limit: default_recursion_limit(),
            parallel_tool_calls: false,
            strict_dispatch: false,
            require_tool_use: false,
            max_identical_failures: default_max_identical_failures(),
            directive_override: None,
        }
    }
}

/// Tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory holding the files offered to the agent
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Chunk size (characters) for document search
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap (characters) between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Number of fragments returned by document search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Rows rendered in a query result before truncation
    #[serde(default = "default_max_rendered_rows")]
    pub max_rendered_rows: usize,

    /// Upper bound on one tool invocation, in seconds
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_top_k() -> usize {
    4
}
fn default_max_rendered_rows() -> usize {
    100
}
fn default_tool_timeout() -> u64 {
    60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            max_rendered_rows: default_max_rendered_rows(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// When set, `/v1` routes require `Authorization: Bearer <token>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            bearer_token: None,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("bearer_token", &redact(&self.bearer_token))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Base URL of the benchmark question service
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Recursion limit used for benchmark runs
    #[serde(default = "default_evaluation_recursion_limit")]
    pub recursion_limit: u32,
}

fn default_api_base() -> String {
    "https://agents-course-unit4-scoring.hf.space".into()
}
fn default_evaluation_recursion_limit() -> u32 {
    50
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            recursion_limit: default_evaluation_recursion_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.datalyst/config.toml),
    /// then apply environment overrides:
    /// - `DATALYST_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `DATALYST_BASE_URL`
    /// - `DATALYST_MODEL`
    /// - `DATALYST_DATA_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("DATALYST_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("DATALYST_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(model) = lookup("DATALYST_MODEL") {
            self.provider.model = model;
        }
        if let Some(dir) = lookup("DATALYST_DATA_DIR") {
            self.tools.data_dir = PathBuf::from(dir);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".datalyst")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.timeout_secs must be > 0".into(),
            ));
        }

        if self.agent.recursion_limit == 0 {
            return Err(ConfigError::ValidationError(
                "agent.recursion_limit must be > 0".into(),
            ));
        }

        if self.tools.chunk_size == 0 || self.tools.chunk_overlap >= self.tools.chunk_size {
            return Err(ConfigError::ValidationError(
                "tools.chunk_overlap must be smaller than a non-zero tools.chunk_size".into(),
            ));
        }

        if self.tools.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "tools.top_k must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.base_url, "http://127.0.0.1:1234/v1");
        assert_eq!(config.agent.recursion_limit, 25);
        assert_eq!(config.tools.chunk_size, 1000);
        assert_eq!(config.tools.chunk_overlap, 200);
        assert_eq!(config.tools.top_k, 4);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.model, config.provider.model);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.tools.data_dir, config.tools.data_dir);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[provider]
model = "gpt-4o-mini"
base_url = "https://api.openai.com/v1"

[agent]
recursion_limit = 8
parallel_tool_calls = true
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.agent.recursion_limit, 8);
        assert!(config.agent.parallel_tool_calls);
        assert_eq!(config.agent.max_identical_failures, 2);
        assert_eq!(config.provider.timeout_secs, 120);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.provider.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_recursion_limit_rejected() {
        let mut config = AppConfig::default();
        config.agent.recursion_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlap_not_smaller_than_chunk_rejected() {
        let mut config = AppConfig::default();
        config.tools.chunk_overlap = config.tools.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_file_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tools]\ntop_k = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn unparseable_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider.name, "lmstudio");
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("DATALYST_MODEL", "qwen2.5-14b"),
            ("DATALYST_DATA_DIR", "/srv/data"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.provider.model, "qwen2.5-14b");
        assert_eq!(config.tools.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(config.provider.base_url, "http://127.0.0.1:1234/v1");
    }

    #[test]
    fn configured_api_key_wins_over_env() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("from-file".into());
        config.apply_env_overrides(|key| (key == "DATALYST_API_KEY").then(|| "from-env".to_string()));
        assert_eq!(config.provider.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-very-secret".into());
        config.gateway.bearer_token = Some("token-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(!debug.contains("token-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("recursion_limit"));
        assert!(toml_str.contains("127.0.0.1:1234"));
    }
}
