//! Provider Boundary
//!
//! Defines the request/response contract every model backend implements,
//! allowing the session engine to work with any provider without code
//! changes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::{ContentBlock, Message, Role};
use crate::usage::Usage;

/// Tool schema sent to the provider, derived from a registered
/// [`ToolSpec`](crate::tool::ToolSpec)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// How the model may use the offered tools
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides whether to call a tool
    Auto,
    /// The model must call some tool
    Any,
    /// The model must call this specific tool
    Tool(String),
}

/// Why the model stopped generating
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
}

/// One request to the model provider
#[derive(Clone, Debug)]
pub struct ModelRequest {
    /// Model identifier
    pub model: String,

    /// Full conversation history, including any trailing prefill
    /// assistant message
    pub messages: Vec<Message>,

    /// System prompt
    pub system: String,

    /// Sampling temperature (>= 0)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Stop sequences
    pub stop_sequences: Vec<String>,

    /// Schemas of the tools available to the model
    pub tools: Vec<ToolSchema>,

    /// Tool-use constraint
    pub tool_choice: Option<ToolChoice>,

    /// When set, the backend attaches a cache checkpoint to the last
    /// eligible message (and only that one)
    pub cache: bool,
}

/// One response from the model provider
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Ordered content blocks
    pub content: Vec<ContentBlock>,

    /// Token usage reported for this call
    pub usage: Usage,

    /// Why generation stopped
    pub stop_reason: StopReason,

    /// Which stop sequence fired, if any
    pub stop_sequence: Option<String>,
}

impl ModelResponse {
    /// A plain-text response (test and backend helper)
    pub fn from_text(text: impl Into<String>, usage: Usage) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            usage,
            stop_reason: StopReason::EndTurn,
            stop_sequence: None,
        }
    }

    /// The first text block, if any
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Whether the response requests any tool invocation
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    /// View the response as an assistant message
    pub fn to_message(&self) -> Message {
        Message::new(Role::Assistant, self.content.clone())
    }
}

/// A chunk of a streaming completion.
///
/// `response` is populated on the final chunk only, carrying the fully
/// assembled response.
#[derive(Debug)]
pub struct StreamChunk {
    /// Text delta (may be empty on bookkeeping chunks)
    pub delta: String,

    /// Whether this is the final chunk
    pub done: bool,

    /// The assembled response, present when `done`
    pub response: Option<ModelResponse>,
}

/// Stream type for completion streaming
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Strategy trait for model providers.
///
/// Implement this trait to add support for a new backend. The session
/// engine works exclusively through this interface.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Issue one request/response cycle
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse>;

    /// Issue one streaming request. The returned stream is finite and
    /// single-pass; the final chunk carries the assembled response.
    async fn complete_stream(&self, request: &ModelRequest) -> Result<CompletionStream>;
}
