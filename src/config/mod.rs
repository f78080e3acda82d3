//! Typed configuration records.
//!
//! Configuration is loaded once at startup by the embedding application
//! (file, env, or hardcoded defaults) and handed to the constructors as
//! plain data; this crate does no I/O to obtain it beyond credential
//! environment variables.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Supported LLM vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    DeepSeek,
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
    Azure,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
            Self::Azure => "azure",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::Ollama => "http://localhost:11434",
            Self::Azure => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek-chat",
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-haiku-20240307",
            Self::Gemini => "gemini-pro",
            Self::Ollama => "llama3",
            Self::Azure => "gpt-4o-mini",
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Ollama => "",
            Self::Azure => "AZURE_OPENAI_API_KEY",
        }
    }

    /// Local runtimes do not require a credential.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

/// Per-1K-token pricing. A missing side is treated as zero (free) and a
/// warning is emitted when usage tracking is active.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostRates {
    #[serde(default)]
    pub input: f64,
    #[serde(default)]
    pub output: f64,
}

/// One LLM vendor description. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    /// Literal credential; takes precedence over `api_key_env`
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the credential
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_base")]
    pub retry_delay_base: f64,
    /// Minimum inter-request interval, seconds
    #[serde(default = "default_request_interval")]
    pub request_interval: f64,
    #[serde(default)]
    pub cost_per_1k: CostRates,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ProviderSettings {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            api_key_env: None,
            model: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            max_retries: default_max_retries(),
            retry_delay_base: default_retry_delay_base(),
            request_interval: default_request_interval(),
            cost_per_1k: CostRates::default(),
            enabled: default_enabled(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Resolve the credential: literal first, then the named environment
    /// variable, then the vendor's conventional variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        let env_name = self
            .api_key_env
            .clone()
            .unwrap_or_else(|| self.kind.default_api_key_env().to_string());
        if env_name.is_empty() {
            return None;
        }
        match std::env::var(&env_name) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => {
                warn!(provider = self.kind.as_str(), env = %env_name, "no API key found");
                None
            }
        }
    }

    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.kind.default_model().to_string())
    }

    pub fn resolved_base_url(&self) -> String {
        let url = self
            .base_url
            .clone()
            .unwrap_or_else(|| self.kind.default_base_url().to_string());
        url.trim_end_matches('/').to_string()
    }
}

/// Feature flags controlling optional subsystems.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// When false, only the default provider is initialized
    #[serde(default)]
    pub enable_multi_llm_support: bool,
}

/// Router-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// `"auto"` or a provider name
    #[serde(default = "default_primary_provider")]
    pub primary_provider: String,
    /// Order consulted when `primary_provider` is `"auto"`
    #[serde(default = "default_preferred_providers")]
    pub preferred_providers: Vec<String>,
    /// Operator-configured head of the fallback chain
    #[serde(default = "default_fallback_providers")]
    pub fallback_providers: Vec<String>,
    #[serde(default = "default_auto_fallback")]
    pub auto_fallback: bool,
    /// Seconds between non-forced health checks
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,
    /// Provider used by single-provider fallback mode
    #[serde(default = "default_single_provider")]
    pub default_provider: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            primary_provider: default_primary_provider(),
            preferred_providers: default_preferred_providers(),
            fallback_providers: default_fallback_providers(),
            auto_fallback: default_auto_fallback(),
            health_check_interval: default_health_check_interval(),
            default_provider: default_single_provider(),
        }
    }
}

/// Cost-control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    #[serde(default = "default_enabled")]
    pub token_usage_tracking: bool,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            token_usage_tracking: true,
        }
    }
}

/// RAG and search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// When false, the deterministic mock backend serves all searches
    #[serde(default)]
    pub enable_real_web_search: bool,
    #[serde(default = "default_enabled")]
    pub enable_parallel_search: bool,
    #[serde(default = "default_max_search_workers")]
    pub max_search_workers: usize,
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
    /// Minimum seconds between outbound search requests, process-wide
    #[serde(default = "default_search_rate_limit_interval")]
    pub search_rate_limit_interval: f64,
    #[serde(default = "default_search_max_retries")]
    pub search_max_retries: u32,
    #[serde(default = "default_search_retry_base_delay")]
    pub search_retry_base_delay: f64,
    /// Environment variable holding the search backend credential
    #[serde(default = "default_search_api_key_env")]
    pub search_api_key_env: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enable_real_web_search: false,
            enable_parallel_search: default_enabled(),
            max_search_workers: default_max_search_workers(),
            max_search_results: default_max_search_results(),
            search_rate_limit_interval: default_search_rate_limit_interval(),
            search_max_retries: default_search_max_retries(),
            search_retry_base_delay: default_search_retry_base_delay(),
            search_api_key_env: default_search_api_key_env(),
        }
    }
}

/// Top-level configuration handed to the constructors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedforgeConfig {
    #[serde(default)]
    pub feature_flags: FeatureFlags,
    /// Provider name -> settings
    #[serde(default)]
    pub providers: std::collections::HashMap<String, ProviderSettings>,
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub rag: RagConfig,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_read_timeout() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_base() -> f64 {
    2.0
}
fn default_request_interval() -> f64 {
    1.0
}
fn default_enabled() -> bool {
    true
}
fn default_primary_provider() -> String {
    "auto".to_string()
}
fn default_preferred_providers() -> Vec<String> {
    vec![
        "deepseek".to_string(),
        "openai".to_string(),
        "anthropic".to_string(),
    ]
}
fn default_fallback_providers() -> Vec<String> {
    vec![
        "openai".to_string(),
        "anthropic".to_string(),
        "gemini".to_string(),
    ]
}
fn default_auto_fallback() -> bool {
    true
}
fn default_health_check_interval() -> u64 {
    300
}
fn default_single_provider() -> String {
    "deepseek".to_string()
}
fn default_max_search_workers() -> usize {
    3
}
fn default_max_search_results() -> usize {
    8
}
fn default_search_rate_limit_interval() -> f64 {
    1.5
}
fn default_search_max_retries() -> u32 {
    2
}
fn default_search_retry_base_delay() -> f64 {
    2.0
}
fn default_search_api_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let rag = RagConfig::default();
        assert!(!rag.enable_real_web_search);
        assert!(rag.enable_parallel_search);
        assert_eq!(rag.max_search_workers, 3);
        assert_eq!(rag.max_search_results, 8);
        assert_eq!(rag.search_max_retries, 2);
        assert!((rag.search_rate_limit_interval - 1.5).abs() < f64::EPSILON);

        let manager = ManagerConfig::default();
        assert_eq!(manager.primary_provider, "auto");
        assert!(manager.auto_fallback);
        assert_eq!(manager.health_check_interval, 300);
    }

    #[test]
    fn literal_api_key_wins_over_env() {
        let settings = ProviderSettings::new(ProviderKind::DeepSeek).with_api_key("sk-literal");
        assert_eq!(settings.resolve_api_key().as_deref(), Some("sk-literal"));
    }

    #[test]
    fn missing_credential_resolves_to_none() {
        let mut settings = ProviderSettings::new(ProviderKind::OpenAi);
        settings.api_key_env = Some("SEEDFORGE_TEST_NO_SUCH_VAR".to_string());
        assert!(settings.resolve_api_key().is_none());
    }

    #[test]
    fn deserializes_minimal_provider_entry() {
        let settings: ProviderSettings =
            serde_json::from_str(r#"{"kind": "deepseek", "enabled": true}"#).unwrap();
        assert_eq!(settings.kind, ProviderKind::DeepSeek);
        assert_eq!(settings.resolved_model(), "deepseek-chat");
        assert_eq!(settings.resolved_base_url(), "https://api.deepseek.com/v1");
        assert_eq!(settings.max_tokens, 2000);
    }
}
