//! Error Types

use thiserror::Error;

/// Result type alias for session-engine operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Session-engine error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Provider/network failure during a model call
    #[error("Model call failed: {0}")]
    ModelCall(String),

    /// A tool body returned an error
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// A structured tool argument could not be constructed from its mapping
    #[error("Cannot coerce argument '{param}' of tool '{tool}': {message}")]
    ArgumentCoercion {
        tool: String,
        param: String,
        message: String,
    },

    /// The model requested a tool that is not registered
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A tool with the same name is already registered
    #[error("Duplicate tool registration: {0}")]
    DuplicateTool(String),

    /// Caller protocol misuse, e.g. no prompt and no continuation prompt configured
    #[error("History invariant violated: {0}")]
    HistoryInvariantViolation(String),

    /// A streaming response was dropped before being drained
    #[error("Streaming response abandoned before completion")]
    StreamAbandoned,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::ModelCall(msg) => {
                format!("The model service encountered an error: {msg}")
            }
            AgentError::ToolExecution { tool, .. } => format!("The tool '{tool}' failed."),
            AgentError::ArgumentCoercion { tool, .. } => {
                format!("The tool '{tool}' received invalid arguments.")
            }
            AgentError::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            AgentError::HistoryInvariantViolation(_) => {
                "The conversation is in an unexpected state. Please start a new session.".into()
            }
            AgentError::StreamAbandoned => {
                "The response stream was interrupted. Please retry.".into()
            }
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}
