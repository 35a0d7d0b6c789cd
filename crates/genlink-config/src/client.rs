use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Configuration for a single generation client
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Provider protocol type
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Model identifier sent to the provider
    #[serde(default)]
    pub model: String,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Static headers added to every request
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Sampling defaults merged under caller options
    #[serde(default)]
    pub defaults: GenerationDefaults,
    /// Upper bound applied to the output token limit after merging
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    /// Allow a one-shot non-streaming retry when streaming is rejected
    #[serde(default = "default_true")]
    pub stream_fallback: bool,
    /// Server-side conversation continuation
    #[serde(default)]
    pub continuation: ContinuationConfig,
    /// Capability names reported as unsupported regardless of model
    #[serde(default)]
    pub disabled_features: Vec<String>,
    /// Per-request timeout (e.g. "30s", "2m")
    #[serde(default)]
    pub timeout: Option<String>,
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but provider and model
    pub fn new(provider_type: ProviderType, model: impl Into<String>) -> Self {
        Self {
            provider_type,
            model: model.into(),
            api_key: None,
            base_url: None,
            headers: IndexMap::new(),
            defaults: GenerationDefaults::default(),
            max_output_tokens: None,
            stream_fallback: true,
            continuation: ContinuationConfig::default(),
            disabled_features: Vec::new(),
            timeout: None,
        }
    }

    /// Parsed request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout string is not a valid duration
    pub fn timeout(&self) -> anyhow::Result<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|raw| duration_str::parse(raw).map_err(|e| anyhow::anyhow!("invalid timeout '{raw}': {e}")))
            .transpose()
    }
}

/// Supported provider protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// OpenAI-compatible Chat Completions API
    Openai,
    /// `OpenAI` Responses API
    OpenaiResponses,
    /// Anthropic Messages API
    Anthropic,
    /// Google Generative Language API
    Google,
}

impl ProviderType {
    /// Stable lowercase name used in logs and lifecycle info
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::OpenaiResponses => "openai_responses",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }
}

/// Sampling defaults applied when the caller leaves a value unset
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationDefaults {
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Continuation token handling
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContinuationConfig {
    /// Send continuation tokens to providers that support them
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How long a conversation's last response id is remembered
    #[serde(default = "default_session_ttl")]
    pub session_ttl: String,
    /// Maximum number of remembered conversations
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            session_ttl: default_session_ttl(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl ContinuationConfig {
    /// Parsed session TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the TTL string is not a valid duration
    pub fn session_ttl(&self) -> anyhow::Result<Duration> {
        duration_str::parse(&self.session_ttl)
            .map_err(|e| anyhow::anyhow!("invalid session_ttl '{}': {e}", self.session_ttl))
    }
}

const fn default_true() -> bool {
    true
}

fn default_session_ttl() -> String {
    "30m".to_owned()
}

const fn default_max_sessions() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn deserialize_minimal_client() {
        let toml = r#"
            type = "anthropic"
            model = "claude-sonnet-4-5"
        "#;

        let config: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.provider_type, ProviderType::Anthropic);
        assert_eq!(config.model, "claude-sonnet-4-5");
        assert!(config.stream_fallback);
        assert!(config.continuation.enabled);
        assert_eq!(config.continuation.session_ttl().unwrap(), Duration::from_secs(1800));
        assert!(config.timeout().unwrap().is_none());
    }

    #[test]
    fn deserialize_full_client() {
        let toml = r#"
            type = "openai_responses"
            model = "gpt-4.1"
            api_key = "sk-test"
            base_url = "http://localhost:9000/v1"
            max_output_tokens = 2048
            stream_fallback = false
            disabled_features = ["is-multimodal"]
            timeout = "45s"

            [headers]
            "x-team" = "search"

            [defaults]
            temperature = 0.2
            max_tokens = 512

            [continuation]
            enabled = false
            session_ttl = "5m"
            max_sessions = 10
        "#;

        let config: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.provider_type, ProviderType::OpenaiResponses);
        assert_eq!(config.api_key.as_ref().unwrap().expose_secret(), "sk-test");
        assert_eq!(config.base_url.as_ref().unwrap().as_str(), "http://localhost:9000/v1");
        assert_eq!(config.max_output_tokens, Some(2048));
        assert!(!config.stream_fallback);
        assert_eq!(config.headers["x-team"], "search");
        assert_eq!(config.defaults.max_tokens, Some(512));
        assert!(!config.continuation.enabled);
        assert_eq!(config.continuation.session_ttl().unwrap(), Duration::from_secs(300));
        assert_eq!(config.timeout().unwrap(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn rejects_unknown_fields() {
        let toml = r#"
            type = "google"
            model = "gemini-2.5-flash"
            region = "us-east-1"
        "#;

        assert!(toml::from_str::<ClientConfig>(toml).is_err());
    }

    #[test]
    fn invalid_timeout_is_reported() {
        let mut config = ClientConfig::new(ProviderType::Openai, "gpt-4o");
        config.timeout = Some("soon".to_owned());
        assert!(config.timeout().is_err());
    }
}
