//! SSE parser for the Anthropic streaming Messages API.
//!
//! Converts the raw byte stream into a [`CompletionStream`] of text
//! deltas. Tool-call input JSON arriving as `input_json_delta` pieces
//! is accumulated per block index; the assembled [`ModelResponse`] is
//! attached to the final chunk once the wire stream ends.

use std::collections::{HashMap, VecDeque};

use agent_core::error::{AgentError, Result};
use agent_core::message::ContentBlock;
use agent_core::provider::{CompletionStream, ModelResponse, StopReason, StreamChunk};
use agent_core::usage::Usage;
use futures::StreamExt;
use serde_json::Value;

use crate::convert::{convert_stop_reason, convert_usage};
use crate::types::{ResponseUsage, StreamEvent};

/// Convert a streaming HTTP response into a [`CompletionStream`].
///
/// The request must have been sent with `stream: true`. Bytes are
/// processed as they arrive; nothing is buffered beyond the current
/// SSE event.
pub(crate) fn into_stream(response: reqwest::Response) -> CompletionStream {
    let bytes = Box::pin(response.bytes_stream());
    let state = SseState::new();

    Box::pin(futures::stream::unfold(
        (bytes, state),
        |(mut bytes, mut state)| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, (bytes, state)));
                }
                if state.done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => state.feed(&chunk),
                    Some(Err(e)) => {
                        state.done = true;
                        state.pending.push_back(Err(AgentError::ModelCall(format!(
                            "stream read error: {e}"
                        ))));
                    }
                    None => {
                        state.done = true;
                        let response = state.finish();
                        state.pending.push_back(Ok(StreamChunk {
                            delta: String::new(),
                            done: true,
                            response: Some(response),
                        }));
                    }
                }
            }
        },
    ))
}

/// In-flight tool-use block being assembled from JSON deltas
struct ToolUseState {
    id: String,
    name: String,
    json_buffer: String,
}

/// Incremental SSE parse state
struct SseState {
    /// Raw bytes not yet forming a complete event. Event boundaries are
    /// ASCII (`\n\n`), so partial UTF-8 sequences never straddle a cut.
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamChunk>>,
    done: bool,
    text: String,
    tool_states: HashMap<u32, ToolUseState>,
    tool_blocks: Vec<ContentBlock>,
    usage: Usage,
    stop_reason: StopReason,
    stop_sequence: Option<String>,
}

impl SseState {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
            text: String::new(),
            tool_states: HashMap::new(),
            tool_blocks: Vec::new(),
            usage: Usage::default(),
            stop_reason: StopReason::EndTurn,
            stop_sequence: None,
        }
    }

    /// Consume a network chunk, emitting chunks for each complete event
    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&event).into_owned();
            self.handle_event(&text);
        }
    }

    fn handle_event(&mut self, event_text: &str) {
        let Some(data) = extract_data_line(event_text) else {
            return;
        };
        let Ok(event) = serde_json::from_str::<StreamEvent>(data) else {
            // Pings and unknown payloads are skipped
            return;
        };

        match event.event_type.as_str() {
            "message_start" => {
                if let Some(usage) = event.message.and_then(|m| m.usage) {
                    self.merge_usage(&usage);
                }
            }
            "content_block_start" => {
                if let (Some(index), Some(block)) = (event.index, event.content_block) {
                    if block.block_type == "tool_use" {
                        self.tool_states.insert(
                            index,
                            ToolUseState {
                                id: block.id.unwrap_or_default(),
                                name: block.name.unwrap_or_default(),
                                json_buffer: String::new(),
                            },
                        );
                    }
                }
            }
            "content_block_delta" => {
                let (Some(index), Some(delta)) = (event.index, event.delta) else {
                    return;
                };
                match delta.delta_type.as_deref() {
                    Some("text_delta") => {
                        if let Some(text) = delta.text {
                            self.text.push_str(&text);
                            self.pending.push_back(Ok(StreamChunk {
                                delta: text,
                                done: false,
                                response: None,
                            }));
                        }
                    }
                    Some("input_json_delta") => {
                        if let (Some(state), Some(partial)) =
                            (self.tool_states.get_mut(&index), delta.partial_json)
                        {
                            state.json_buffer.push_str(&partial);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(state) = event.index.and_then(|i| self.tool_states.remove(&i)) {
                    let input = match serde_json::from_str::<Value>(&state.json_buffer) {
                        Ok(Value::Object(map)) => map,
                        _ => serde_json::Map::new(),
                    };
                    self.tool_blocks.push(ContentBlock::ToolUse {
                        id: state.id,
                        name: state.name,
                        input,
                    });
                }
            }
            "message_delta" => {
                if let Some(delta) = event.delta {
                    if let Some(reason) = delta.stop_reason {
                        self.stop_reason = convert_stop_reason(Some(&reason));
                    }
                    if delta.stop_sequence.is_some() {
                        self.stop_sequence = delta.stop_sequence;
                    }
                }
                if let Some(usage) = event.usage {
                    self.merge_usage(&usage);
                }
            }
            // message_stop and pings carry nothing we need
            _ => {}
        }
    }

    /// Usage fields arrive cumulatively across `message_start` and
    /// `message_delta`; the latest non-zero value wins.
    fn merge_usage(&mut self, usage: &ResponseUsage) {
        let converted = convert_usage(usage);
        if converted.input_tokens > 0 {
            self.usage.input_tokens = converted.input_tokens;
        }
        if converted.output_tokens > 0 {
            self.usage.output_tokens = converted.output_tokens;
        }
        if converted.cache_write_tokens > 0 {
            self.usage.cache_write_tokens = converted.cache_write_tokens;
        }
        if converted.cache_read_tokens > 0 {
            self.usage.cache_read_tokens = converted.cache_read_tokens;
        }
    }

    /// Assemble the final response from everything accumulated
    fn finish(&mut self) -> ModelResponse {
        let mut content = Vec::new();
        if !self.text.is_empty() {
            content.push(ContentBlock::Text {
                text: std::mem::take(&mut self.text),
            });
        }
        content.append(&mut self.tool_blocks);

        ModelResponse {
            content,
            usage: self.usage,
            stop_reason: self.stop_reason,
            stop_sequence: self.stop_sequence.take(),
        }
    }
}

/// Extract the `data: ` payload from one SSE event block
fn extract_data_line(event_text: &str) -> Option<&str> {
    event_text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .find_map(|line| line.strip_prefix("data: "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_events(state: &mut SseState, events: &[&str]) {
        for event in events {
            state.feed(event.as_bytes());
        }
    }

    #[test]
    fn test_extract_data_line() {
        let event = "event: content_block_delta\ndata: {\"type\":\"x\"}\n\n";
        assert_eq!(extract_data_line(event), Some("{\"type\":\"x\"}"));
        assert_eq!(extract_data_line("event: ping\n\n"), None);
    }

    #[test]
    fn test_text_deltas_become_chunks() {
        let mut state = SseState::new();
        feed_events(
            &mut state,
            &[
                "event: content_block_delta\ndata: {\"type\": \"content_block_delta\", \"index\": 0, \"delta\": {\"type\": \"text_delta\", \"text\": \"Hel\"}}\n\n",
                "event: content_block_delta\ndata: {\"type\": \"content_block_delta\", \"index\": 0, \"delta\": {\"type\": \"text_delta\", \"text\": \"lo\"}}\n\n",
            ],
        );

        assert_eq!(state.pending.len(), 2);
        let response = state.finish();
        assert_eq!(response.text(), Some("Hello"));
    }

    #[test]
    fn test_partial_network_chunks_reassemble() {
        let mut state = SseState::new();
        let event = "data: {\"type\": \"content_block_delta\", \"index\": 0, \"delta\": {\"type\": \"text_delta\", \"text\": \"ok\"}}\n\n";
        let (a, b) = event.as_bytes().split_at(40);
        state.feed(a);
        assert!(state.pending.is_empty());
        state.feed(b);
        assert_eq!(state.pending.len(), 1);
    }

    #[test]
    fn test_tool_use_lifecycle() {
        let mut state = SseState::new();
        feed_events(
            &mut state,
            &[
                "data: {\"type\": \"content_block_start\", \"index\": 1, \"content_block\": {\"type\": \"tool_use\", \"id\": \"toolu_01\", \"name\": \"add\"}}\n\n",
                "data: {\"type\": \"content_block_delta\", \"index\": 1, \"delta\": {\"type\": \"input_json_delta\", \"partial_json\": \"{\\\"a\\\":\"}}\n\n",
                "data: {\"type\": \"content_block_delta\", \"index\": 1, \"delta\": {\"type\": \"input_json_delta\", \"partial_json\": \"2}\"}}\n\n",
                "data: {\"type\": \"content_block_stop\", \"index\": 1}\n\n",
            ],
        );

        let response = state.finish();
        assert!(response.has_tool_use());
        match &response.content[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "toolu_01");
                assert_eq!(name, "add");
                assert_eq!(input.get("a"), Some(&Value::from(2)));
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn test_usage_and_stop_reason_accumulate() {
        let mut state = SseState::new();
        feed_events(
            &mut state,
            &[
                "data: {\"type\": \"message_start\", \"message\": {\"usage\": {\"input_tokens\": 42, \"output_tokens\": 1, \"cache_read_input_tokens\": 10}}}\n\n",
                "data: {\"type\": \"message_delta\", \"delta\": {\"stop_reason\": \"tool_use\"}, \"usage\": {\"input_tokens\": 0, \"output_tokens\": 30}}\n\n",
            ],
        );

        let response = state.finish();
        assert_eq!(response.usage.input_tokens, 42);
        assert_eq!(response.usage.output_tokens, 30);
        assert_eq!(response.usage.cache_read_tokens, 10);
        assert_eq!(response.stop_reason, StopReason::ToolUse);
    }

    #[test]
    fn test_ping_events_ignored() {
        let mut state = SseState::new();
        feed_events(&mut state, &["event: ping\ndata: {\"type\": \"ping\"}\n\n"]);
        assert!(state.pending.is_empty());
    }
}
