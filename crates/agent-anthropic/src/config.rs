//! Anthropic provider configuration

use agent_core::error::{AgentError, Result};

/// Configuration for the Anthropic Messages API client
#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    /// API key (`x-api-key` header)
    pub api_key: String,

    /// API base URL
    pub base_url: String,

    /// `anthropic-version` header value
    pub api_version: String,

    /// Request timeout in seconds. Expiry surfaces as a model-call
    /// error; there is no other cancellation mechanism.
    pub timeout_secs: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com".into(),
            api_version: "2023-06-01".into(),
            timeout_secs: 120,
        }
    }
}

impl AnthropicConfig {
    /// Build a config from `ANTHROPIC_API_KEY` (required) and
    /// `ANTHROPIC_BASE_URL` (optional).
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| AgentError::Config("ANTHROPIC_API_KEY is not set".into()))?;
        let mut config = Self {
            api_key,
            ..Default::default()
        };
        if let Ok(base_url) = std::env::var("ANTHROPIC_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(config)
    }
}
