//! Conversation Messages
//!
//! Message and content-block model shared by the conversation, the
//! provider boundary, and the turn log.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

/// Role of a message sender.
///
/// Only `user` and `assistant` appear in history; the system prompt and
/// tool results travel separately (tool results are embedded in user
/// messages as [`ContentBlock::ToolResult`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User input (including tool results fed back to the model)
    User,
    /// Assistant (LLM) response
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single block of message content.
///
/// Closed union: history-processing code matches exhaustively.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text { text: String },
    /// A model-initiated tool invocation. `id` is unique within its
    /// message and correlates the matching tool result.
    ToolUse {
        id: String,
        name: String,
        input: Map<String, Value>,
    },
    /// The result of executing a tool, keyed back to its request
    ToolResult { tool_use_id: String, content: String },
    /// Out-of-band media carried by reference (e.g. a base64 image)
    Media { kind: String, reference: String },
}

/// A single message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Ordered content blocks
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a message from raw blocks
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    /// Create a plain-text user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::Text { text: text.into() }])
    }

    /// Create a plain-text assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(
            Role::Assistant,
            vec![ContentBlock::Text { text: text.into() }],
        )
    }

    /// Create a user message carrying tool results
    pub fn tool_results(blocks: Vec<ContentBlock>) -> Self {
        Self::new(Role::User, blocks)
    }

    /// The first text block, if any
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Iterate over tool-use blocks as `(id, name, input)` triples
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &Map<String, Value>)> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }

    /// Whether the message contains at least one tool-use block
    pub fn has_tool_use(&self) -> bool {
        self.tool_uses().next().is_some()
    }
}

/// Check that roles strictly alternate and the history starts with a
/// user message. Used as a debug assertion by conversation tests.
pub fn validate_alternation(history: &[Message]) -> Result<()> {
    let mut expected = Role::User;
    for (i, msg) in history.iter().enumerate() {
        if msg.role != expected {
            return Err(AgentError::HistoryInvariantViolation(format!(
                "message {i} has role '{}', expected '{expected}'",
                msg.role
            )));
        }
        expected = match expected {
            Role::User => Role::Assistant,
            Role::Assistant => Role::User,
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), Some("Hello"));
    }

    #[test]
    fn test_tool_uses_accessor() {
        let mut input = Map::new();
        input.insert("a".into(), Value::from(2));
        let msg = Message::new(
            Role::Assistant,
            vec![
                ContentBlock::Text {
                    text: "Let me compute that.".into(),
                },
                ContentBlock::ToolUse {
                    id: "toolu_01".into(),
                    name: "add".into(),
                    input,
                },
            ],
        );
        let uses: Vec<_> = msg.tool_uses().collect();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].0, "toolu_01");
        assert_eq!(uses[0].1, "add");
        assert!(msg.has_tool_use());
    }

    #[test]
    fn test_content_block_serde_tags() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "toolu_01".into(),
            content: "4".into(),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "toolu_01");
    }

    #[test]
    fn test_validate_alternation() {
        let ok = vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("again"),
        ];
        assert!(validate_alternation(&ok).is_ok());

        let bad = vec![Message::user("hi"), Message::user("hi again")];
        assert!(validate_alternation(&bad).is_err());
    }
}
