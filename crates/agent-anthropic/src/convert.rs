//! Mapping between `agent-core` types and the Anthropic wire format.

use agent_core::message::{ContentBlock, Message, Role};
use agent_core::provider::{ModelRequest, ModelResponse, StopReason, ToolChoice};
use agent_core::usage::Usage;
use serde_json::Value;

use crate::types::{
    CacheControl, ImageSource, Request, Response, ResponseUsage, WireBlock, WireMessage, WireTool,
    WireToolChoice,
};

/// Build the wire request body.
///
/// When `request.cache` is set, a cache checkpoint is attached to the
/// last block of the last message — and only there, so checkpoints from
/// earlier turns are superseded rather than accumulated.
pub(crate) fn build_request(request: &ModelRequest, stream: bool) -> Request {
    let mut messages: Vec<WireMessage> = request.messages.iter().map(convert_message).collect();

    if request.cache {
        if let Some(block) = messages
            .last_mut()
            .and_then(|message| message.content.last_mut())
        {
            block.set_cache_control(CacheControl::ephemeral());
        }
    }

    Request {
        model: request.model.clone(),
        messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        system: request.system.clone(),
        stream: stream.then_some(true),
        stop_sequences: request.stop_sequences.clone(),
        tools: if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|schema| WireTool {
                        name: schema.name.clone(),
                        description: schema.description.clone(),
                        input_schema: schema.input_schema.clone(),
                    })
                    .collect(),
            )
        },
        tool_choice: request.tool_choice.as_ref().map(convert_tool_choice),
    }
}

fn convert_message(message: &Message) -> WireMessage {
    WireMessage {
        role: match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        content: message.content.iter().map(convert_block).collect(),
    }
}

fn convert_block(block: &ContentBlock) -> WireBlock {
    match block {
        ContentBlock::Text { text } => WireBlock::Text {
            text: text.clone(),
            cache_control: None,
        },
        ContentBlock::ToolUse { id, name, input } => WireBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: Value::Object(input.clone()),
            cache_control: None,
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
        } => WireBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone(),
            cache_control: None,
        },
        ContentBlock::Media { kind, reference } => WireBlock::Image {
            source: ImageSource {
                source_type: "base64",
                media_type: kind.clone(),
                data: reference.clone(),
            },
            cache_control: None,
        },
    }
}

fn convert_tool_choice(choice: &ToolChoice) -> WireToolChoice {
    match choice {
        ToolChoice::Auto => WireToolChoice {
            choice_type: "auto",
            name: None,
        },
        ToolChoice::Any => WireToolChoice {
            choice_type: "any",
            name: None,
        },
        ToolChoice::Tool(name) => WireToolChoice {
            choice_type: "tool",
            name: Some(name.clone()),
        },
    }
}

/// Map a wire response into the core model
pub(crate) fn convert_response(response: Response) -> ModelResponse {
    let content = response
        .content
        .into_iter()
        .filter_map(|block| match block.content_type.as_str() {
            "text" => Some(ContentBlock::Text {
                text: block.text.unwrap_or_default(),
            }),
            "tool_use" => Some(ContentBlock::ToolUse {
                id: block.id.unwrap_or_default(),
                name: block.name.unwrap_or_default(),
                input: match block.input {
                    Some(Value::Object(map)) => map,
                    _ => serde_json::Map::new(),
                },
            }),
            // Unknown block kinds (e.g. thinking) are dropped
            _ => None,
        })
        .collect();

    ModelResponse {
        content,
        usage: convert_usage(&response.usage),
        stop_reason: convert_stop_reason(response.stop_reason.as_deref()),
        stop_sequence: response.stop_sequence,
    }
}

pub(crate) fn convert_usage(usage: &ResponseUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cache_write_tokens: usage.cache_creation_input_tokens.unwrap_or(0),
        cache_read_tokens: usage.cache_read_input_tokens.unwrap_or(0),
    }
}

pub(crate) fn convert_stop_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}
