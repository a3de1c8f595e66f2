//! Mock provider for testing.
//!
//! [`MockProvider`] is a queue-based fake that lets tests control
//! exactly what responses and errors the provider returns, without
//! touching the network. Every call records its [`ModelRequest`] for
//! later assertion.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};
use crate::message::ContentBlock;
use crate::provider::{
    CompletionStream, ModelProvider, ModelRequest, ModelResponse, StopReason, StreamChunk,
};
use crate::usage::Usage;

/// A queue-based mock provider for unit and integration tests.
///
/// Push responses with [`queue_response`](Self::queue_response) and
/// errors with [`queue_error`](Self::queue_error). Each call pops from
/// the front of the queue.
///
/// # Panics
///
/// `complete` and `complete_stream` panic if the queue is empty — an
/// empty queue means the test script is out of sync with the code
/// under test.
#[derive(Default)]
pub struct MockProvider {
    queue: Mutex<VecDeque<std::result::Result<ModelResponse, String>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a successful response
    pub fn queue_response(&self, response: ModelResponse) {
        self.queue.lock().unwrap().push_back(Ok(response));
    }

    /// Enqueue a plain-text response with zero usage
    pub fn queue_text(&self, text: impl Into<String>) {
        self.queue_response(ModelResponse::from_text(text, Usage::default()));
    }

    /// Enqueue a response requesting one tool call
    pub fn queue_tool_use(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        input: Map<String, Value>,
    ) {
        self.queue_response(tool_use_response(vec![(id.into(), name.into(), input)]));
    }

    /// Enqueue a provider failure (surfaced as a model-call error)
    pub fn queue_error(&self, message: impl Into<String>) {
        self.queue.lock().unwrap().push_back(Err(message.into()));
    }

    /// All requests recorded so far, in call order
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of responses still queued
    pub fn remaining(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    fn pop(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockProvider queue is empty");
        next.map_err(AgentError::ModelCall)
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.pop(request)
    }

    async fn complete_stream(&self, request: &ModelRequest) -> Result<CompletionStream> {
        let response = self.pop(request)?;
        let delta = response.text().unwrap_or_default().to_string();
        let chunks = vec![
            Ok(StreamChunk {
                delta,
                done: false,
                response: None,
            }),
            Ok(StreamChunk {
                delta: String::new(),
                done: true,
                response: Some(response),
            }),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Build a response carrying the given `(id, name, input)` tool uses
pub fn tool_use_response(uses: Vec<(String, String, Map<String, Value>)>) -> ModelResponse {
    ModelResponse {
        content: uses
            .into_iter()
            .map(|(id, name, input)| ContentBlock::ToolUse { id, name, input })
            .collect(),
        usage: Usage::default(),
        stop_reason: StopReason::ToolUse,
        stop_sequence: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn request() -> ModelRequest {
        ModelRequest {
            model: "test-model".into(),
            messages: vec![Message::user("hi")],
            system: String::new(),
            temperature: 0.0,
            max_tokens: 64,
            stop_sequences: Vec::new(),
            tools: Vec::new(),
            tool_choice: None,
            cache: false,
        }
    }

    #[tokio::test]
    async fn test_queue_order_and_recording() {
        let mock = MockProvider::new();
        mock.queue_text("first");
        mock.queue_text("second");

        let req = request();
        assert_eq!(mock.complete(&req).await.unwrap().text(), Some("first"));
        assert_eq!(mock.complete(&req).await.unwrap().text(), Some("second"));
        assert_eq!(mock.requests().len(), 2);
        assert_eq!(mock.remaining(), 0);
    }

    #[tokio::test]
    async fn test_queued_error() {
        let mock = MockProvider::new();
        mock.queue_error("boom");
        let err = mock.complete(&request()).await.unwrap_err();
        assert!(matches!(err, AgentError::ModelCall(m) if m == "boom"));
    }
}
