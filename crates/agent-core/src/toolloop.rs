//! Tool Loop
//!
//! The multi-step orchestrator: alternate provider calls and tool
//! executions until the model stops requesting tools or the step budget
//! is exhausted. Implemented as an explicit state machine so each
//! transition is observable and deterministic under test.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::{CallOverrides, Conversation};
use crate::error::AgentError;
use crate::message::{ContentBlock, Message};

/// Default step budget per loop invocation
pub const DEFAULT_MAX_STEPS: u32 = 10;

/// Observable loop state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// No call issued yet
    Start,
    /// A provider call is in flight
    Calling,
    /// The response requested tools that have not run yet
    ToolPending,
    /// Tool invocations for the current round are executing
    Executing,
    /// The model produced a final answer
    Done,
    /// The step budget ran out before convergence
    BudgetExceeded,
    /// A provider or tool failure aborted the loop
    Failed,
}

/// Hook invoked once per completed tool round-trip with the triggering
/// assistant message and the resulting tool-result message. This is the
/// sole channel for tool-call audit detail outside the loop.
pub type TraceHook = Arc<dyn Fn(&Message, &Message) + Send + Sync>;

/// One executed tool call, correlated to its tool-use block
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub args: Value,
    pub result: String,
    pub correlation_id: String,
}

/// Result of a completed (non-aborted) loop invocation
#[derive(Clone, Debug)]
pub struct LoopOutcome {
    /// Final answer, or the best partial text when the budget ran out
    pub text: String,

    /// Number of provider calls made
    pub steps: u32,

    /// True when the loop stopped on the step budget rather than a
    /// final answer
    pub budget_exhausted: bool,

    /// Every tool call executed during the loop, in order
    pub tool_calls: Vec<ToolCallRecord>,
}

/// A loop that aborted on a provider or tool failure.
///
/// History appended before the failure point remains intact, and the
/// partial trace collected so far is preserved.
#[derive(Debug, thiserror::Error)]
#[error("tool loop aborted after {steps} step(s): {source}")]
pub struct LoopAborted {
    #[source]
    pub source: AgentError,
    pub steps: u32,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Multi-step tool-loop driver over a conversation
pub struct ToolLoop<'a> {
    conversation: &'a mut Conversation,
    max_steps: u32,
    trace: Option<TraceHook>,
    state: LoopState,
}

impl<'a> ToolLoop<'a> {
    pub fn new(conversation: &'a mut Conversation) -> Self {
        Self {
            conversation,
            max_steps: DEFAULT_MAX_STEPS,
            trace: None,
            state: LoopState::Start,
        }
    }

    /// Bound the number of provider calls
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Attach a per-tool-round trace hook
    pub fn with_trace(mut self, hook: TraceHook) -> Self {
        self.trace = Some(hook);
        self
    }

    /// Current machine state
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Drive the loop to completion.
    ///
    /// The prefill in `overrides` is applied only to the first call;
    /// continuation after a tool round happens implicitly through the
    /// appended tool-result message.
    pub async fn run(
        &mut self,
        prompt: Option<&str>,
        overrides: &CallOverrides,
    ) -> std::result::Result<LoopOutcome, LoopAborted> {
        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();
        let mut partial_text = String::new();
        let mut steps = 0u32;
        let mut prompt = prompt;

        loop {
            if steps >= self.max_steps {
                self.state = LoopState::BudgetExceeded;
                return Ok(LoopOutcome {
                    text: partial_text,
                    steps,
                    budget_exhausted: true,
                    tool_calls,
                });
            }

            self.state = LoopState::Calling;
            steps += 1;

            let mut round_overrides = overrides.clone();
            if steps > 1 {
                round_overrides.prefill = String::new();
            }

            let response = match self.conversation.call(prompt.take(), &round_overrides).await {
                Ok(response) => response,
                Err(source) => {
                    self.state = LoopState::Failed;
                    return Err(LoopAborted {
                        source,
                        steps,
                        tool_calls,
                    });
                }
            };

            if let Some(text) = response.text() {
                if !text.is_empty() {
                    partial_text = text.to_string();
                }
            }

            if !response.has_tool_use() {
                self.state = LoopState::Done;
                return Ok(LoopOutcome {
                    text: partial_text,
                    steps,
                    budget_exhausted: false,
                    tool_calls,
                });
            }

            // The conversation has already run the requested tools and
            // appended their results, so the pending/executing phases
            // reduce to bookkeeping over the last two history entries.
            self.state = LoopState::ToolPending;
            let history = self.conversation.history();
            let round = &history[history.len() - 2..];
            self.state = LoopState::Executing;
            if let Some(hook) = &self.trace {
                hook(&round[0], &round[1]);
            }
            tool_calls.extend(extract_tool_calls(&round[0], &round[1]));
        }
    }
}

impl std::fmt::Debug for ToolLoop<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolLoop")
            .field("max_steps", &self.max_steps)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Extract `(name, args, result, id)` records from one tool round,
/// pairing results to uses by id.
pub fn extract_tool_calls(assistant: &Message, results: &Message) -> Vec<ToolCallRecord> {
    assistant
        .tool_uses()
        .map(|(id, name, input)| {
            let result = results
                .content
                .iter()
                .find_map(|block| match block {
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } if tool_use_id == id => Some(content.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| "[no result recorded]".to_string());
            ToolCallRecord {
                name: name.to_string(),
                args: Value::Object(input.clone()),
                result,
                correlation_id: id.to_string(),
            }
        })
        .collect()
}
