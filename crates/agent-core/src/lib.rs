//! # agent-core
//!
//! Tool-calling session engine: conversations with an LLM provider that
//! may invoke registered tools mid-dialog, with strict history
//! invariants, per-session usage accounting, and a bounded multi-step
//! tool loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ToolLoop                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────┐  │
//! │  │ Conversation │──│ ToolRegistry │──│   ModelClient     │  │
//! │  │  (history)   │  │  (coercion)  │  │  (usage ledger)   │  │
//! │  └──────────────┘  └──────────────┘  └───────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `ModelProvider` trait enables swapping backends without changing
//! session logic; `agent-anthropic` supplies the Messages API
//! implementation.

pub mod client;
pub mod conversation;
pub mod error;
pub mod message;
pub mod mock;
pub mod provider;
pub mod tool;
pub mod toolloop;
pub mod usage;

pub use client::{CallParams, ModelClient};
pub use conversation::{CallOverrides, Conversation};
pub use error::{AgentError, Result};
pub use message::{ContentBlock, Message, Role};
pub use provider::{ModelProvider, ModelRequest, ModelResponse, StopReason, ToolChoice};
pub use tool::{ParamKind, ParamSpec, ToolRegistry, ToolSpec};
pub use toolloop::{LoopOutcome, LoopState, ToolCallRecord, ToolLoop, TraceHook};
pub use usage::{ModelClass, PricingTier, Usage, pricing_for};
