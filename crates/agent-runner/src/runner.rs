//! Agent Runner
//!
//! Persistent-mode turn manager: one conversation per caller-supplied
//! chat id, kept across turns. Each turn runs one tool loop to
//! completion, computes the turn's usage and cost deltas, and hands a
//! [`TurnRecord`] to the logging collaborator.
//!
//! Turns are serialized per chat id (history mutation is single-writer)
//! while distinct chats run concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use agent_core::conversation::Conversation;
use agent_core::provider::ModelProvider;
use agent_core::toolloop::{ToolCallRecord, ToolLoop, TraceHook};
use agent_core::usage::{ModelClass, Usage, pricing_for};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::logging::{LOG_SCHEMA_VERSION, TurnLogger, TurnRecord};
use crate::profile::AgentProfile;

/// Runs interactive sessions with an agent defined by an
/// [`AgentProfile`], multiplexing conversations by chat id and logging
/// each turn comprehensively.
pub struct AgentRunner {
    profile: AgentProfile,
    provider: Arc<dyn ModelProvider>,
    logger: Arc<dyn TurnLogger>,
    trace: Option<TraceHook>,
    run_name_prefix: String,
    session_id: String,
    run_name: String,
    turn_count: AtomicU32,
    chats: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Conversation>>>>,
}

impl AgentRunner {
    pub fn new(
        profile: AgentProfile,
        provider: Arc<dyn ModelProvider>,
        logger: Arc<dyn TurnLogger>,
    ) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let run_name = run_name("interactive", &profile.profile_id, &session_id);
        tracing::info!(%session_id, %run_name, "agent runner initialized");
        Self {
            profile,
            provider,
            logger,
            trace: None,
            run_name_prefix: "interactive".into(),
            session_id,
            run_name,
            turn_count: AtomicU32::new(0),
            chats: Mutex::new(HashMap::new()),
        }
    }

    /// Override the run-name prefix used for grouping log records
    pub fn with_run_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.run_name_prefix = prefix.into();
        self.run_name = run_name(&self.run_name_prefix, &self.profile.profile_id, &self.session_id);
        self
    }

    /// Forward each tool round-trip to an external audit hook
    pub fn with_trace(mut self, hook: TraceHook) -> Self {
        self.trace = Some(hook);
        self
    }

    /// Current session identifier
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run name used on emitted records
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Turns completed in this session
    pub fn turn_count(&self) -> u32 {
        self.turn_count.load(Ordering::SeqCst)
    }

    /// Get or create the conversation behind a chat id
    fn chat(&self, chat_id: &str) -> Arc<tokio::sync::Mutex<Conversation>> {
        let mut chats = self.chats.lock().unwrap();
        chats
            .entry(chat_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(%chat_id, "creating chat");
                Arc::new(tokio::sync::Mutex::new(
                    self.profile.create_conversation(self.provider.clone()),
                ))
            })
            .clone()
    }

    /// Inspect a chat's state (history length, usage) without running a
    /// turn. Returns `None` for unknown ids.
    pub async fn chat_usage(&self, chat_id: &str) -> Option<Usage> {
        let chat = {
            let chats = self.chats.lock().unwrap();
            chats.get(chat_id).cloned()
        }?;
        let conversation = chat.lock().await;
        Some(conversation.usage())
    }

    /// Process a single turn of user input against the given chat.
    ///
    /// Always returns displayable text: failures are converted to a
    /// readable message and recorded verbatim on the turn record.
    pub async fn run_turn(&self, chat_id: &str, user_input: &str) -> String {
        let chat = self.chat(chat_id);
        // One in-flight turn per chat id; other chats proceed freely.
        let mut conversation = chat.lock().await;

        let turn = self.turn_count.fetch_add(1, Ordering::SeqCst) + 1;
        let turn_id = format!("{}_turn_{turn}", self.session_id);
        let usage_before = conversation.usage();

        let mut tool_loop =
            ToolLoop::new(&mut conversation).with_max_steps(self.profile.max_steps);
        if let Some(hook) = &self.trace {
            tool_loop = tool_loop.with_trace(hook.clone());
        }
        let result = tool_loop
            .run(Some(user_input), &self.profile.call_overrides())
            .await;

        let (final_output, tool_calls, error) = match result {
            Ok(outcome) if outcome.budget_exhausted => {
                let text = if outcome.text.is_empty() {
                    format!("[no final answer after {} steps]", outcome.steps)
                } else {
                    outcome.text
                };
                (
                    text,
                    outcome.tool_calls,
                    Some(format!(
                        "max steps ({}) exceeded after {} calls",
                        self.profile.max_steps, outcome.steps
                    )),
                )
            }
            Ok(outcome) => (outcome.text, outcome.tool_calls, None),
            Err(aborted) => {
                tracing::warn!(error = %aborted.source, %turn_id, "turn failed");
                (
                    format!("[Error during generation: {}]", aborted.source),
                    aborted.tool_calls,
                    Some(aborted.source.to_string()),
                )
            }
        };

        let usage_delta = conversation.usage().delta_since(&usage_before);
        let record = self.build_record(
            &turn_id,
            json!({ "user_input": user_input }),
            "interactive",
            &conversation,
            tool_calls,
            Some(final_output.clone()),
            usage_delta,
            error,
        );
        drop(conversation);

        self.log(&record);
        final_output
    }

    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &self,
        turn_id: &str,
        input: serde_json::Value,
        run_type: &str,
        conversation: &Conversation,
        tool_calls: Vec<ToolCallRecord>,
        final_output: Option<String>,
        usage_delta: Usage,
        error: Option<String>,
    ) -> TurnRecord {
        TurnRecord {
            log_schema_version: LOG_SCHEMA_VERSION.into(),
            run_name: self.run_name.clone(),
            profile_id: self.profile.profile_id.clone(),
            turn_id: turn_id.to_string(),
            session_id: self.session_id.clone(),
            run_type: run_type.to_string(),
            timestamp: Utc::now(),
            input,
            history_snapshot: conversation.history().to_vec(),
            tool_calls,
            final_output,
            usage_delta,
            cost_delta: turn_cost(conversation.model(), &usage_delta),
            error,
        }
    }

    fn log(&self, record: &TurnRecord) {
        if let Err(e) = self.logger.log(record) {
            tracing::error!(error = %e, turn_id = %record.turn_id, "failed to persist turn record");
        }
    }

    /// Discard every conversation and start a new logical session with
    /// a fresh identifier and a zeroed turn counter.
    pub fn reset_session(&mut self) {
        self.chats.lock().unwrap().clear();
        self.session_id = Uuid::new_v4().to_string();
        self.run_name = run_name(&self.run_name_prefix, &self.profile.profile_id, &self.session_id);
        self.turn_count.store(0, Ordering::SeqCst);
        tracing::info!(session_id = %self.session_id, "session reset");
    }
}

impl std::fmt::Debug for AgentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRunner")
            .field("profile_id", &self.profile.profile_id)
            .field("session_id", &self.session_id)
            .field("turns", &self.turn_count())
            .finish_non_exhaustive()
    }
}

/// `<prefix>_<profile>_<first 8 chars of the session id>`
fn run_name(prefix: &str, profile_id: &str, session_id: &str) -> String {
    format!("{prefix}_{profile_id}_{}", &session_id[..8])
}

/// Cost of a turn's usage, priced at the tier selected by the model
/// class and the turn's prompt size. `None` for unrecognized models.
pub fn turn_cost(model: &str, usage: &Usage) -> Option<f64> {
    ModelClass::of(model).map(|class| usage.cost(&pricing_for(class, usage.input_tokens)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::MockProvider;
    use agent_core::tool::{JsonMap, ParamKind, ParamSpec, ToolRegistry, ToolSpec};
    use agent_core::usage::Usage;
    use serde_json::Value;

    use crate::logging::MemoryLogger;

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

    fn profile() -> AgentProfile {
        AgentProfile::new("test_v1", "claude-3-5-haiku-20241022").with_tools(add_registry())
    }

    #[tokio::test]
    async fn test_tool_round_trip_turn() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_tool_use("toolu_01", "add", add_args());
        mock.queue_text("4");

        let logger = Arc::new(MemoryLogger::new());
        let runner = AgentRunner::new(profile(), mock, logger.clone());

        let output = runner.run_turn("chat-1", "What is 2+2?").await;
        assert_eq!(output, "4");

        let records = logger.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.final_output.as_deref(), Some("4"));
        assert_eq!(record.run_type, "interactive");
        assert_eq!(record.tool_calls.len(), 1);
        assert_eq!(record.tool_calls[0].name, "add");
        assert_eq!(record.tool_calls[0].args, Value::Object(add_args()));
        assert_eq!(record.tool_calls[0].result, "4");
        // user, assistant(tool_use), user(result), assistant("4")
        assert_eq!(record.history_snapshot.len(), 4);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_history_persists_across_turns() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_text("first answer");
        mock.queue_text("second answer");

        let logger = Arc::new(MemoryLogger::new());
        let runner = AgentRunner::new(profile(), mock, logger.clone());

        runner.run_turn("chat-1", "one").await;
        runner.run_turn("chat-1", "two").await;

        let records = logger.records();
        assert_eq!(records[0].history_snapshot.len(), 2);
        assert_eq!(records[1].history_snapshot.len(), 4);
        assert_eq!(records[0].turn_id, format!("{}_turn_1", runner.session_id()));
        assert_eq!(records[1].turn_id, format!("{}_turn_2", runner.session_id()));
    }

    #[tokio::test]
    async fn test_chats_are_independent() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_text("for a");
        mock.queue_text("for b");

        let runner = AgentRunner::new(profile(), mock, Arc::new(MemoryLogger::new()));
        runner.run_turn("a", "hello a").await;
        runner.run_turn("b", "hello b").await;

        let usage_a = runner.chat_usage("a").await;
        assert!(usage_a.is_some());
        assert!(runner.chat_usage("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_usage_delta_is_per_turn() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_response(agent_core::provider::ModelResponse::from_text(
            "one",
            Usage {
                input_tokens: 100,
                output_tokens: 10,
                ..Default::default()
            },
        ));
        mock.queue_response(agent_core::provider::ModelResponse::from_text(
            "two",
            Usage {
                input_tokens: 150,
                output_tokens: 20,
                ..Default::default()
            },
        ));

        let logger = Arc::new(MemoryLogger::new());
        let runner = AgentRunner::new(profile(), mock, logger.clone());
        runner.run_turn("c", "one").await;
        runner.run_turn("c", "two").await;

        let records = logger.records();
        assert_eq!(records[0].usage_delta.input_tokens, 100);
        assert_eq!(records[1].usage_delta.input_tokens, 150);
        assert_eq!(records[1].usage_delta.output_tokens, 20);
    }

    #[tokio::test]
    async fn test_failed_turn_returns_readable_text_and_records_error() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_error("connection reset");

        let logger = Arc::new(MemoryLogger::new());
        let runner = AgentRunner::new(profile(), mock, logger.clone());

        let output = runner.run_turn("chat-1", "hi").await;
        assert!(output.starts_with("[Error during generation:"));

        let records = logger.records();
        assert_eq!(records.len(), 1);
        let error = records[0].error.as_deref().unwrap();
        assert!(error.contains("connection reset"));
        // The appended user message survives the failure.
        assert_eq!(records[0].history_snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_reported_not_fatal() {
        let mock = Arc::new(MockProvider::new());
        for i in 0..5 {
            mock.queue_tool_use(format!("toolu_{i}"), "add", add_args());
        }

        let logger = Arc::new(MemoryLogger::new());
        let runner = AgentRunner::new(profile().with_max_steps(2), mock, logger.clone());

        let output = runner.run_turn("chat-1", "loop").await;
        assert_eq!(output, "[no final answer after 2 steps]");

        let records = logger.records();
        assert!(records[0].error.as_deref().unwrap().contains("max steps"));
        assert_eq!(records[0].tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_session() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_text("hello");

        let mut runner = AgentRunner::new(profile(), mock, Arc::new(MemoryLogger::new()));
        runner.run_turn("chat-1", "hi").await;
        let old_session = runner.session_id().to_string();
        assert_eq!(runner.turn_count(), 1);

        runner.reset_session();
        assert_ne!(runner.session_id(), old_session);
        assert_eq!(runner.turn_count(), 0);
        assert!(runner.chat_usage("chat-1").await.is_none());
    }

    #[tokio::test]
    async fn test_cost_delta_on_record() {
        let mock = Arc::new(MockProvider::new());
        mock.queue_response(agent_core::provider::ModelResponse::from_text(
            "ok",
            Usage {
                input_tokens: 1_000_000,
                output_tokens: 0,
                ..Default::default()
            },
        ));

        let logger = Arc::new(MemoryLogger::new());
        let runner = AgentRunner::new(
            AgentProfile::new("t", "claude-3-7-sonnet-20250219"),
            mock,
            logger.clone(),
        );
        runner.run_turn("c", "q").await;

        let cost = logger.records()[0].cost_delta.unwrap();
        assert!((cost - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_turn_cost_unknown_model() {
        assert!(turn_cost("gpt-4o", &Usage::default()).is_none());
    }
}
