//! # agent-runner
//!
//! Run/turn management over the session engine: agent profiles,
//! persistent interactive sessions multiplexed by chat id, isolated
//! batch evaluation, and append-only JSONL turn logging.

pub mod eval;
pub mod logging;
pub mod profile;
pub mod runner;

pub use eval::{DatasetItem, EvalLoop, EvalSummary};
pub use logging::{JsonlLogger, LoggingError, MemoryLogger, TurnLogger, TurnRecord};
pub use profile::AgentProfile;
pub use runner::AgentRunner;
