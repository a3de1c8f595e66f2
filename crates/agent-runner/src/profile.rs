//! Agent Profiles
//!
//! A profile is the static recipe for an agent: model, prompts, tool
//! set and default call parameters. It carries no runtime state; live
//! conversations are spun up from it per session or per dataset item.

use std::sync::Arc;

use agent_core::client::DEFAULT_MAX_TOKENS;
use agent_core::conversation::{CallOverrides, Conversation};
use agent_core::provider::ModelProvider;
use agent_core::tool::ToolRegistry;
use agent_core::toolloop::DEFAULT_MAX_STEPS;

/// Static configuration and identity of an agent.
///
/// `profile_id` versions the configuration for experiment tracking;
/// bump it whenever the prompt or tool set changes.
#[derive(Clone)]
pub struct AgentProfile {
    /// Unique identifier, e.g. `"pdf_rag_v2"`
    pub profile_id: String,

    /// Provider model identifier
    pub model: String,

    /// Core instructions defining the agent
    pub system_prompt: String,

    /// Prefill applied to the first call of each turn
    pub prefill: String,

    /// Default sampling temperature
    pub temperature: f32,

    /// Default generation cap per call
    pub max_tokens: u32,

    /// Step budget per tool loop invocation
    pub max_steps: u32,

    /// Whether to request provider-side prompt caching
    pub cache_enabled: bool,

    /// User prompt used to continue an assistant response when no new
    /// prompt is supplied
    pub continuation_prompt: Option<String>,

    /// Tools available to this agent
    pub tools: Arc<ToolRegistry>,
}

impl AgentProfile {
    pub fn new(profile_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            model: model.into(),
            system_prompt: String::new(),
            prefill: String::new(),
            temperature: 0.0,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_steps: DEFAULT_MAX_STEPS,
            cache_enabled: false,
            continuation_prompt: None,
            tools: Arc::new(ToolRegistry::new()),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_prefill(mut self, prefill: impl Into<String>) -> Self {
        self.prefill = prefill.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_cache(mut self, cache_enabled: bool) -> Self {
        self.cache_enabled = cache_enabled;
        self
    }

    pub fn with_continuation_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.continuation_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Instantiate a live conversation from this profile.
    ///
    /// This is the factory both run modes use: the persistent runner
    /// keeps one per session, the eval loop builds a fresh one per
    /// dataset item.
    pub fn create_conversation(&self, provider: Arc<dyn ModelProvider>) -> Conversation {
        let mut conversation = Conversation::new(provider, self.model.clone())
            .with_system_prompt(self.system_prompt.clone())
            .with_tools(self.tools.clone())
            .with_temperature(self.temperature)
            .with_cache(self.cache_enabled);
        if let Some(cont) = &self.continuation_prompt {
            conversation = conversation.with_continuation_prompt(cont.clone());
        }
        conversation
    }

    /// Per-call parameters derived from the profile defaults
    pub fn call_overrides(&self) -> CallOverrides {
        CallOverrides {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            prefill: self.prefill.clone(),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for AgentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentProfile")
            .field("profile_id", &self.profile_id)
            .field("model", &self.model)
            .field("tools", &self.tools.len())
            .finish_non_exhaustive()
    }
}
