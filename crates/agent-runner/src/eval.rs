//! Evaluation Loop
//!
//! Batch runs of an agent profile over a dataset. Unlike the
//! persistent [`AgentRunner`](crate::runner::AgentRunner), every item
//! gets a fresh conversation, so neither history nor usage leaks
//! between items.

use std::sync::Arc;

use agent_core::provider::ModelProvider;
use agent_core::toolloop::ToolLoop;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::logging::{LOG_SCHEMA_VERSION, TurnLogger, TurnRecord};
use crate::profile::AgentProfile;
use crate::runner::turn_cost;

/// One dataset item to evaluate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetItem {
    /// Stable item identifier; generated from the index when absent
    #[serde(default)]
    pub id: Option<String>,

    /// The prompt to run
    pub prompt: String,

    /// Expected output, carried through to the log for later scoring
    #[serde(default)]
    pub ground_truth: Option<Value>,
}

/// Key per-item results returned for quick inspection; the full detail
/// lives in the emitted turn records.
#[derive(Clone, Debug)]
pub struct EvalSummary {
    pub item_id: String,
    pub final_output: Option<String>,
    pub error: bool,
}

/// Batch evaluator with per-item isolation
pub struct EvalLoop {
    profile: AgentProfile,
    provider: Arc<dyn ModelProvider>,
    logger: Arc<dyn TurnLogger>,
    run_name: String,
}

impl EvalLoop {
    pub fn new(
        profile: AgentProfile,
        provider: Arc<dyn ModelProvider>,
        logger: Arc<dyn TurnLogger>,
    ) -> Self {
        let run_name = format!("eval_{}", profile.profile_id);
        Self {
            profile,
            provider,
            logger,
            run_name,
        }
    }

    /// Override the run name used on emitted records
    pub fn with_run_name(mut self, run_name: impl Into<String>) -> Self {
        self.run_name = run_name.into();
        self
    }

    /// Execute the loop over the dataset, one fresh conversation per
    /// item, logging one record each.
    pub async fn run(&self, dataset: &[DatasetItem]) -> Vec<EvalSummary> {
        let mut summaries = Vec::with_capacity(dataset.len());

        for (index, item) in dataset.iter().enumerate() {
            let item_id = item
                .id
                .clone()
                .unwrap_or_else(|| format!("item_{index}"));
            tracing::debug!(%item_id, "processing item");

            // Fresh conversation per item: no cross-item leakage of
            // history or usage.
            let mut conversation = self.profile.create_conversation(self.provider.clone());
            let session_id = Uuid::new_v4().to_string();

            let result = ToolLoop::new(&mut conversation)
                .with_max_steps(self.profile.max_steps)
                .run(Some(&item.prompt), &self.profile.call_overrides())
                .await;

            let (final_output, tool_calls, error) = match result {
                Ok(outcome) if outcome.budget_exhausted => (
                    Some(outcome.text),
                    outcome.tool_calls,
                    Some(format!(
                        "max steps ({}) exceeded",
                        self.profile.max_steps
                    )),
                ),
                Ok(outcome) => (Some(outcome.text), outcome.tool_calls, None),
                Err(aborted) => (None, aborted.tool_calls, Some(aborted.source.to_string())),
            };

            let usage_delta = conversation.usage();
            let record = TurnRecord {
                log_schema_version: LOG_SCHEMA_VERSION.into(),
                run_name: self.run_name.clone(),
                profile_id: self.profile.profile_id.clone(),
                turn_id: format!("{}_{item_id}", self.run_name),
                session_id,
                run_type: "eval".into(),
                timestamp: Utc::now(),
                input: serde_json::to_value(item).unwrap_or(Value::Null),
                history_snapshot: conversation.history().to_vec(),
                tool_calls,
                final_output: final_output.clone(),
                usage_delta,
                cost_delta: turn_cost(conversation.model(), &usage_delta),
                error: error.clone(),
            };
            if let Err(e) = self.logger.log(&record) {
                tracing::error!(error = %e, %item_id, "failed to persist eval record");
            }

            summaries.push(EvalSummary {
                item_id,
                final_output,
                error: error.is_some(),
            });
        }

        tracing::info!(
            run_name = %self.run_name,
            items = summaries.len(),
            "evaluation run finished"
        );
        summaries
    }
}
