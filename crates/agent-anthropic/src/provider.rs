//! Anthropic `ModelProvider` implementation

use std::time::Duration;

use agent_core::error::{AgentError, Result};
use agent_core::provider::{CompletionStream, ModelProvider, ModelRequest, ModelResponse};
use async_trait::async_trait;

use crate::config::AnthropicConfig;
use crate::{convert, stream};

/// Anthropic Messages API provider.
///
/// Implements both the single-shot and streaming halves of
/// [`ModelProvider`]. Network and API failures surface as
/// [`AgentError::ModelCall`]; the session engine does not retry.
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider from configuration
    pub fn new(config: AnthropicConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(AnthropicConfig::from_env()?))
    }

    fn messages_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/v1/messages")
    }

    async fn send_request(
        &self,
        request: &ModelRequest,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let body = convert::build_request(request, stream);

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::ModelCall(format!(
                        "request timed out after {}s",
                        self.config.timeout_secs
                    ))
                } else {
                    AgentError::ModelCall(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<crate::types::ErrorResponse>(&body)
                .map_or(body, |parsed| parsed.error.message);
            return Err(AgentError::ModelCall(format!("{status}: {detail}")));
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let response = self.send_request(request, false).await?;
        let api_response: crate::types::Response = response
            .json()
            .await
            .map_err(|e| AgentError::ModelCall(format!("failed to parse response: {e}")))?;
        tracing::debug!(model = %request.model, "completed model call");
        Ok(convert::convert_response(api_response))
    }

    async fn complete_stream(&self, request: &ModelRequest) -> Result<CompletionStream> {
        let response = self.send_request(request, true).await?;
        Ok(stream::into_stream(response))
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("base_url", &self.config.base_url)
            .field("api_version", &self.config.api_version)
            .finish_non_exhaustive()
    }
}
