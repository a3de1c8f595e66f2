//! # agent-anthropic
//!
//! Anthropic Messages API backend for the agent session engine.
//! Implements [`agent_core::ModelProvider`] over HTTP with JSON and SSE
//! streaming, including cache-checkpoint placement on outgoing
//! requests.

mod config;
mod convert;
mod provider;
mod stream;
mod types;

pub use config::AnthropicConfig;
pub use provider::AnthropicProvider;
