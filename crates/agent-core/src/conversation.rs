//! Conversation
//!
//! Owns the append-only message history, the system prompt, the
//! registered tool set and the per-dialog provider client. Enforces the
//! role-alternation invariant and the single-call protocol: one provider
//! round plus the synchronous execution of any requested tools.

use std::sync::Arc;

use crate::client::{CallParams, DEFAULT_MAX_TOKENS, ModelClient, StreamingCall};
use crate::error::{AgentError, Result};
use crate::message::{ContentBlock, Message, Role};
use crate::provider::{ModelProvider, ModelResponse, ToolChoice};
use crate::tool::ToolRegistry;
use crate::usage::{ModelClass, Usage, pricing_for};

/// Per-call parameter overrides layered over the conversation defaults
#[derive(Clone, Debug, Default)]
pub struct CallOverrides {
    /// Sampling temperature (defaults to the conversation's)
    pub temperature: Option<f32>,

    /// Maximum tokens to generate (defaults to 4096)
    pub max_tokens: Option<u32>,

    /// Text the model's response must start with
    pub prefill: String,

    /// Stop sequences
    pub stop_sequences: Vec<String>,

    /// Tool-use constraint
    pub tool_choice: Option<ToolChoice>,
}

/// A single logical dialog with the model.
///
/// History is mutated only by appends. A turn must run to completion
/// (or failure) before another is started against the same
/// conversation.
pub struct Conversation {
    client: ModelClient,
    system_prompt: String,
    tools: Arc<ToolRegistry>,
    temperature: f32,
    continuation_prompt: Option<String>,
    history: Vec<Message>,
}

impl Conversation {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            client: ModelClient::new(provider, model),
            system_prompt: String::new(),
            tools: Arc::new(ToolRegistry::new()),
            temperature: 0.0,
            continuation_prompt: None,
            history: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// User prompt used to continue after an assistant completion when
    /// no new prompt is supplied
    pub fn with_continuation_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.continuation_prompt = Some(prompt.into());
        self
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.client = self.client.with_cache(cache);
        self
    }

    /// Full message history
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Cumulative usage across every provider call of this dialog
    pub fn usage(&self) -> Usage {
        self.client.usage()
    }

    /// Cumulative cost of the dialog in USD, when the model belongs to
    /// a known pricing class
    pub fn cost(&self) -> Option<f64> {
        ModelClass::of(self.model()).map(|class| {
            let usage = self.usage();
            usage.cost(&pricing_for(class, usage.input_tokens))
        })
    }

    /// Model identifier this conversation targets
    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// System prompt text
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// The registered tool set
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Text of the most recent assistant message, if any
    pub fn last_text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(Message::text)
    }

    fn last_role(&self) -> Option<Role> {
        self.history.last().map(|m| m.role)
    }

    /// Append the pending user prompt, applying the role-alternation
    /// guard: with no prompt after an assistant turn, the continuation
    /// prompt is used instead.
    fn append_prompt(&mut self, prompt: Option<&str>) -> Result<()> {
        // The first message must come from the user, so an empty
        // history behaves like one ending in an assistant turn.
        let last = self.last_role().unwrap_or(Role::Assistant);
        match prompt {
            Some(p) => self.history.push(Message::user(p)),
            None if last == Role::Assistant => match &self.continuation_prompt {
                Some(cont) => self.history.push(Message::user(cont.clone())),
                None => {
                    return Err(AgentError::HistoryInvariantViolation(
                        "prompt must be given after an assistant completion, \
                         or configure a continuation prompt"
                            .into(),
                    ));
                }
            },
            // Last message is an unanswered user turn; nothing to append.
            None => {}
        }
        Ok(())
    }

    fn params(&self, overrides: &CallOverrides) -> CallParams {
        CallParams {
            system: self.system_prompt.clone(),
            temperature: overrides.temperature.unwrap_or(self.temperature),
            max_tokens: overrides.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            prefill: overrides.prefill.clone(),
            stop_sequences: overrides.stop_sequences.clone(),
            tools: self.tools.schemas(),
            tool_choice: overrides.tool_choice.clone(),
        }
    }

    /// One provider round: send history, append the assistant message,
    /// execute any requested tools and append their results.
    async fn round(&mut self, overrides: &CallOverrides) -> Result<ModelResponse> {
        let params = self.params(overrides);
        let response = self.client.call(self.history.clone(), &params).await?;
        self.absorb_response(&response).await?;
        Ok(response)
    }

    /// Make a single call against the conversation.
    ///
    /// A prompt supplied while an unanswered user message is pending
    /// first resolves the pending turn with an implicit call, so it is
    /// never silently dropped.
    pub async fn call(
        &mut self,
        prompt: Option<&str>,
        overrides: &CallOverrides,
    ) -> Result<ModelResponse> {
        if prompt.is_some() && self.last_role() == Some(Role::User) {
            self.round(&CallOverrides::default()).await?;
        }
        self.append_prompt(prompt)?;
        self.round(overrides).await
    }

    /// Open a streaming call against the conversation.
    ///
    /// History is updated and usage merged only when the returned turn
    /// is drained and finished.
    pub async fn call_stream(
        &mut self,
        prompt: Option<&str>,
        overrides: &CallOverrides,
    ) -> Result<StreamingTurn<'_>> {
        if prompt.is_some() && self.last_role() == Some(Role::User) {
            self.round(&CallOverrides::default()).await?;
        }
        self.append_prompt(prompt)?;
        let params = self.params(overrides);
        let call = self.client.open_stream(self.history.clone(), &params).await?;
        Ok(StreamingTurn {
            prefill: overrides.prefill.clone(),
            conversation: self,
            call,
        })
    }

    /// Append the assistant message; then execute each requested tool
    /// in block order and append one user message holding the results,
    /// matched by id.
    async fn absorb_response(&mut self, response: &ModelResponse) -> Result<()> {
        self.history.push(response.to_message());

        let mut results: Vec<(String, String)> = Vec::new();
        for block in &response.content {
            if let ContentBlock::ToolUse { id, name, input } = block {
                let result = self.tools.invoke(name, input).await?;
                results.push((id.clone(), result));
            }
        }

        if !results.is_empty() {
            let blocks = pair_tool_results(&response.to_message(), &results);
            self.history.push(Message::tool_results(blocks));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("model", &self.model())
            .field("messages", &self.history.len())
            .field("tools", &self.tools.names())
            .finish_non_exhaustive()
    }
}

/// Build one tool-result block per tool-use block of the triggering
/// assistant message, pairing by id rather than position — providers
/// are not guaranteed to echo results in request order.
pub fn pair_tool_results(assistant: &Message, results: &[(String, String)]) -> Vec<ContentBlock> {
    assistant
        .tool_uses()
        .map(|(id, _, _)| {
            let content = results
                .iter()
                .find(|(result_id, _)| result_id == id)
                .map_or_else(|| "[no result recorded]".to_string(), |(_, c)| c.clone());
            ContentBlock::ToolResult {
                tool_use_id: id.to_string(),
                content,
            }
        })
        .collect()
}

/// An in-flight streaming turn.
///
/// Yields the prefill first, then partial text fragments. Call
/// [`finish`](Self::finish) after the fragments are exhausted to settle
/// usage and append the assistant message plus any tool results.
pub struct StreamingTurn<'a> {
    conversation: &'a mut Conversation,
    call: StreamingCall,
    prefill: String,
}

impl StreamingTurn<'_> {
    /// Next text fragment, or `None` when the stream is exhausted
    pub async fn next_fragment(&mut self) -> Option<Result<String>> {
        self.call.next_fragment().await
    }

    /// Whether the underlying stream has been fully consumed
    pub fn is_settled(&self) -> bool {
        self.call.is_settled()
    }

    /// Settle the turn: merge usage, append the assistant message and
    /// any tool results. Fails with [`AgentError::StreamAbandoned`] if
    /// the stream was not drained.
    pub async fn finish(self) -> Result<ModelResponse> {
        let Self {
            conversation,
            call,
            prefill,
        } = self;
        let response = conversation.client.settle_stream(call, &prefill)?;
        conversation.absorb_response(&response).await?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::validate_alternation;
    use crate::mock::MockProvider;
    use crate::tool::{JsonMap, ParamKind, ParamSpec, ToolSpec};
    use serde_json::Value;

    fn add_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec::new(
                "add",
                "Adds two numbers",
                vec![
                    ParamSpec::new("a", ParamKind::Number),
                    ParamSpec::new("b", ParamKind::Number),
                ],
                |args: JsonMap| async move {
                    let a = args.get("a").and_then(Value::as_i64).unwrap_or(0);
                    let b = args.get("b").and_then(Value::as_i64).unwrap_or(0);
                    Ok(Value::from(a + b))
                },
            ))
            .unwrap();
        Arc::new(registry)
    }

    fn add_args() -> JsonMap {
        let mut args = JsonMap::new();
        args.insert("a".into(), Value::from(2));
        args.insert("b".into(), Value::from(2));
        args
    }

    #[tokio::test]
    async fn test_simple_round() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_text("Hello!");

        let mut conv = Conversation::new(mock, "claude-3-5-haiku-20241022")
            .with_system_prompt("You are helpful.");
        let response = conv
            .call(Some("Hi"), &CallOverrides::default())
            .await
            .unwrap();

        assert_eq!(response.text(), Some("Hello!"));
        assert_eq!(conv.history().len(), 2);
        assert_eq!(conv.last_text(), Some("Hello!"));
        validate_alternation(conv.history()).unwrap();
    }

    #[tokio::test]
    async fn test_tool_round_appends_results() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_tool_use("toolu_01", "add", add_args());

        let mut conv = Conversation::new(mock, "claude-3-5-haiku-20241022")
            .with_tools(add_registry());
        conv.call(Some("What is 2+2?"), &CallOverrides::default())
            .await
            .unwrap();

        // user, assistant(tool_use), user(tool_result)
        assert_eq!(conv.history().len(), 3);
        let results = &conv.history()[2];
        assert_eq!(results.role, Role::User);
        assert_eq!(
            results.content[0],
            ContentBlock::ToolResult {
                tool_use_id: "toolu_01".into(),
                content: "4".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_continuation_prompt_used_when_prompt_omitted() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_text("first");
        mock.queue_text("second");

        let mut conv = Conversation::new(mock.clone(), "claude-3-5-haiku-20241022")
            .with_continuation_prompt("continue");
        conv.call(Some("go"), &CallOverrides::default())
            .await
            .unwrap();
        conv.call(None, &CallOverrides::default()).await.unwrap();

        assert_eq!(conv.history()[2].text(), Some("continue"));
        assert_eq!(conv.history().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_prompt_without_continuation_is_an_error() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_text("first");

        let mut conv = Conversation::new(mock, "claude-3-5-haiku-20241022");
        conv.call(Some("go"), &CallOverrides::default())
            .await
            .unwrap();
        let err = conv
            .call(None, &CallOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::HistoryInvariantViolation(_)));
    }

    #[tokio::test]
    async fn test_pending_user_turn_resolved_before_new_prompt() {
        let mock = Arc::new(MockProvider::new());
        // First call fails, leaving an unanswered user message behind.
        mock.queue_error("transient outage");
        mock.queue_text("answers pending turn");
        mock.queue_text("answers new turn");

        let mut conv = Conversation::new(mock.clone(), "claude-3-5-haiku-20241022");
        assert!(
            conv.call(Some("first question"), &CallOverrides::default())
                .await
                .is_err()
        );
        assert_eq!(conv.history().len(), 1);

        conv.call(Some("second question"), &CallOverrides::default())
            .await
            .unwrap();

        let texts: Vec<_> = conv.history().iter().filter_map(Message::text).collect();
        assert_eq!(
            texts,
            vec![
                "first question",
                "answers pending turn",
                "second question",
                "answers new turn",
            ]
        );
        validate_alternation(conv.history()).unwrap();
    }

    #[tokio::test]
    async fn test_tool_failure_keeps_assistant_message() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec::new("boom", "Always fails", vec![], |_| async {
                Err(crate::tool::ToolError::new("exploded"))
            }))
            .unwrap();

        let mock = Arc::new(MockProvider::new());
        mock.queue_tool_use("toolu_09", "boom", JsonMap::new());

        let mut conv = Conversation::new(mock, "claude-3-5-haiku-20241022")
            .with_tools(Arc::new(registry));
        let err = conv
            .call(Some("go"), &CallOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution { .. }));

        // No rollback: the assistant message stays for later turns.
        assert_eq!(conv.history().len(), 2);
        assert!(conv.history()[1].has_tool_use());
    }

    #[test]
    fn test_pairing_by_id_not_position() {
        let mut input = JsonMap::new();
        input.insert("q".into(), Value::from("x"));
        let assistant = Message::new(
            Role::Assistant,
            vec![
                ContentBlock::ToolUse {
                    id: "toolu_a".into(),
                    name: "first".into(),
                    input: input.clone(),
                },
                ContentBlock::ToolUse {
                    id: "toolu_b".into(),
                    name: "second".into(),
                    input,
                },
            ],
        );
        // Results echoed in reverse order
        let results = vec![
            ("toolu_b".to_string(), "result B".to_string()),
            ("toolu_a".to_string(), "result A".to_string()),
        ];

        let blocks = pair_tool_results(&assistant, &results);
        assert_eq!(
            blocks,
            vec![
                ContentBlock::ToolResult {
                    tool_use_id: "toolu_a".into(),
                    content: "result A".into(),
                },
                ContentBlock::ToolResult {
                    tool_use_id: "toolu_b".into(),
                    content: "result B".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_streaming_turn_settles_history() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_text("streamed answer");

        let mut conv = Conversation::new(mock, "claude-3-5-haiku-20241022");
        let mut turn = conv
            .call_stream(Some("q"), &CallOverrides::default())
            .await
            .unwrap();

        let mut collected = String::new();
        while let Some(fragment) = turn.next_fragment().await {
            collected.push_str(&fragment.unwrap());
        }
        assert!(turn.is_settled());
        turn.finish().await.unwrap();

        assert_eq!(collected, "streamed answer");
        assert_eq!(conv.history().len(), 2);
        assert_eq!(conv.last_text(), Some("streamed answer"));
    }

    #[tokio::test]
    async fn test_cumulative_cost() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_response(crate::provider::ModelResponse::from_text(
            "ok",
            crate::usage::Usage {
                input_tokens: 1_000_000,
                ..Default::default()
            },
        ));

        let mut conv = Conversation::new(mock, "claude-3-7-sonnet-20250219");
        conv.call(Some("q"), &CallOverrides::default())
            .await
            .unwrap();
        let cost = conv.cost().unwrap();
        assert!((cost - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_cache_flag_reaches_request() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_text("ok");

        let mut conv =
            Conversation::new(mock.clone(), "claude-3-5-haiku-20241022").with_cache(true);
        conv.call(Some("q"), &CallOverrides::default())
            .await
            .unwrap();

        assert!(mock.requests()[0].cache);
    }
}
