//! Provider Client
//!
//! [`ModelClient`] wraps a [`ModelProvider`] with the per-session state
//! the single-call protocol needs: the cumulative usage ledger, the last
//! stop metadata, and the cache policy. Prefill text is sent as a
//! trailing assistant message on the wire and prepended to the stored
//! response, so the model continues it without having generated it.

use std::sync::Arc;

use futures::StreamExt;

use crate::error::{AgentError, Result};
use crate::message::{ContentBlock, Message};
use crate::provider::{
    CompletionStream, ModelProvider, ModelRequest, ModelResponse, StopReason, ToolChoice,
    ToolSchema,
};
use crate::usage::Usage;

/// Default generation cap per call
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Resolved parameters for one provider call
#[derive(Clone, Debug)]
pub struct CallParams {
    /// System prompt
    pub system: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Text the model's response must start with
    pub prefill: String,

    /// Stop sequences
    pub stop_sequences: Vec<String>,

    /// Tool schemas to offer
    pub tools: Vec<ToolSchema>,

    /// Tool-use constraint
    pub tool_choice: Option<ToolChoice>,
}

impl Default for CallParams {
    fn default() -> Self {
        Self {
            system: String::new(),
            temperature: 0.0,
            max_tokens: DEFAULT_MAX_TOKENS,
            prefill: String::new(),
            stop_sequences: Vec::new(),
            tools: Vec::new(),
            tool_choice: None,
        }
    }
}

/// Stateful client for one logical dialog.
///
/// Accrues usage across calls; usage from a failed call is never merged.
pub struct ModelClient {
    provider: Arc<dyn ModelProvider>,
    model: String,
    cache: bool,
    usage: Usage,
    stop_reason: Option<StopReason>,
    stop_sequence: Option<String>,
    last_response: Option<ModelResponse>,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            cache: false,
            usage: Usage::default(),
            stop_reason: None,
            stop_sequence: None,
            last_response: None,
        }
    }

    /// Enable cache checkpoints on outgoing requests
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Model identifier this client targets
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Cumulative usage across all successful calls
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Stop reason of the most recent call
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Stop sequence that fired on the most recent call, if any
    pub fn stop_sequence(&self) -> Option<&str> {
        self.stop_sequence.as_deref()
    }

    /// The most recent stored response
    pub fn last_response(&self) -> Option<&ModelResponse> {
        self.last_response.as_ref()
    }

    fn build_request(&self, mut messages: Vec<Message>, params: &CallParams) -> ModelRequest {
        let prefill = params.prefill.trim();
        if !prefill.is_empty() {
            messages.push(Message::assistant(prefill));
        }
        ModelRequest {
            model: self.model.clone(),
            messages,
            system: params.system.clone(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop_sequences: params.stop_sequences.clone(),
            tools: params.tools.clone(),
            tool_choice: params.tool_choice.clone(),
            cache: self.cache,
        }
    }

    /// Store a finished response: apply the prefill, accrue usage,
    /// record stop metadata.
    fn absorb(&mut self, mut response: ModelResponse, prefill: &str) -> ModelResponse {
        apply_prefill(&mut response, prefill);
        self.usage += response.usage;
        self.stop_reason = Some(response.stop_reason);
        self.stop_sequence = response.stop_sequence.clone();
        self.last_response = Some(response.clone());
        response
    }

    /// Make one non-streaming call to the provider
    pub async fn call(
        &mut self,
        messages: Vec<Message>,
        params: &CallParams,
    ) -> Result<ModelResponse> {
        let request = self.build_request(messages, params);
        let response = self.provider.complete(&request).await?;
        Ok(self.absorb(response, &params.prefill))
    }

    /// Open a streaming call. Nothing is merged into the ledger until
    /// the returned stream has been drained and settled.
    pub async fn open_stream(
        &mut self,
        messages: Vec<Message>,
        params: &CallParams,
    ) -> Result<StreamingCall> {
        let request = self.build_request(messages, params);
        let inner = self.provider.complete_stream(&request).await?;
        Ok(StreamingCall {
            inner,
            pending_prefill: if params.prefill.is_empty() {
                None
            } else {
                Some(params.prefill.clone())
            },
            response: None,
        })
    }

    /// Settle a drained streaming call into the ledger.
    ///
    /// Fails with [`AgentError::StreamAbandoned`] when the stream was
    /// dropped before its final chunk.
    pub fn settle_stream(&mut self, call: StreamingCall, prefill: &str) -> Result<ModelResponse> {
        let response = call.response.ok_or(AgentError::StreamAbandoned)?;
        Ok(self.absorb(response, prefill))
    }
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("model", &self.model)
            .field("cache", &self.cache)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

/// Prepend the prefill to the first text block of the response.
///
/// Applied exactly once, before the response is stored.
fn apply_prefill(response: &mut ModelResponse, prefill: &str) {
    if prefill.is_empty() {
        return;
    }
    for block in &mut response.content {
        if let ContentBlock::Text { text } = block {
            *text = format!("{prefill}{text}");
            return;
        }
    }
    // Tool-only responses still carry the prefill as their text
    response.content.insert(
        0,
        ContentBlock::Text {
            text: prefill.to_string(),
        },
    );
}

/// A lazy, finite, single-pass sequence of partial text fragments.
///
/// Pull fragments with [`next_fragment`](Self::next_fragment) until it
/// returns `None`, then hand the call back to
/// [`ModelClient::settle_stream`]. Abandoning the stream midway leaves
/// the call unsettled and the turn must be treated as failed.
pub struct StreamingCall {
    inner: CompletionStream,
    pending_prefill: Option<String>,
    response: Option<ModelResponse>,
}

impl StreamingCall {
    /// Next text fragment, or `None` when the stream is exhausted
    pub async fn next_fragment(&mut self) -> Option<Result<String>> {
        if let Some(prefill) = self.pending_prefill.take() {
            return Some(Ok(prefill));
        }
        loop {
            match self.inner.next().await? {
                Ok(chunk) => {
                    if chunk.done {
                        self.response = chunk.response;
                        if chunk.delta.is_empty() {
                            return None;
                        }
                        return Some(Ok(chunk.delta));
                    }
                    if !chunk.delta.is_empty() {
                        return Some(Ok(chunk.delta));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Whether the final chunk has been consumed
    pub fn is_settled(&self) -> bool {
        self.response.is_some()
    }
}
