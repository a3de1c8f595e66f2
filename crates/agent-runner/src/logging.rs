//! Turn Logging
//!
//! One structured record per completed (or failed) turn, appended as a
//! JSON line to an append-only log. A logging failure is reported but
//! never propagated — losing an audit record must not break the
//! conversation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use agent_core::message::Message;
use agent_core::toolloop::ToolCallRecord;
use agent_core::usage::Usage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bump when the record layout changes
pub const LOG_SCHEMA_VERSION: &str = "0.2";

/// Structured record of one user-input-to-final-output cycle.
///
/// Immutable once handed to the logger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnRecord {
    pub log_schema_version: String,
    pub run_name: String,
    pub profile_id: String,
    /// Unique id of this turn within the run
    pub turn_id: String,
    pub session_id: String,
    /// `"interactive"` or `"eval"`
    pub run_type: String,
    pub timestamp: DateTime<Utc>,
    /// Free-form input payload (user input, or the full dataset item)
    pub input: Value,
    /// The entire history up to and including this turn
    pub history_snapshot: Vec<Message>,
    /// Tool calls executed during this turn, in order
    pub tool_calls: Vec<ToolCallRecord>,
    pub final_output: Option<String>,
    /// Usage attributable to this turn alone
    pub usage_delta: Usage,
    /// Cost of this turn in USD, when the model has a known pricing class
    pub cost_delta: Option<f64>,
    /// Failure detail, verbatim, when the turn did not complete cleanly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The logging collaborator failed to persist a record
#[derive(Debug, thiserror::Error)]
#[error("failed to persist turn record: {0}")]
pub struct LoggingError(pub String);

/// Logging collaborator boundary: receives one record per turn and is
/// expected to persist it append-only, one record per line.
pub trait TurnLogger: Send + Sync {
    fn log(&self, record: &TurnRecord) -> Result<(), LoggingError>;
}

/// Build the log file path for a run
pub fn log_path(log_dir: impl AsRef<Path>, run_name: &str) -> PathBuf {
    log_dir.as_ref().join(format!("{run_name}.jsonl"))
}

/// Appends records as JSON lines to `<log_dir>/<run_name>.jsonl`
pub struct JsonlLogger {
    path: PathBuf,
}

impl JsonlLogger {
    /// Create the log directory if needed and bind to the run's file
    pub fn new(log_dir: impl AsRef<Path>, run_name: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(&log_dir)?;
        Ok(Self {
            path: log_path(log_dir, run_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TurnLogger for JsonlLogger {
    fn log(&self, record: &TurnRecord) -> Result<(), LoggingError> {
        let line =
            serde_json::to_string(record).map_err(|e| LoggingError(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LoggingError(format!("{}: {e}", self.path.display())))?;
        writeln!(file, "{line}").map_err(|e| LoggingError(e.to_string()))
    }
}

/// In-memory logger for development and testing
#[derive(Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<TurnRecord>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TurnRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl TurnLogger for MemoryLogger {
    fn log(&self, record: &TurnRecord) -> Result<(), LoggingError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(turn_id: &str) -> TurnRecord {
        TurnRecord {
            log_schema_version: LOG_SCHEMA_VERSION.into(),
            run_name: "interactive_test_v1_abcd1234".into(),
            profile_id: "test_v1".into(),
            turn_id: turn_id.into(),
            session_id: "abcd1234".into(),
            run_type: "interactive".into(),
            timestamp: Utc::now(),
            input: serde_json::json!({ "user_input": "hi" }),
            history_snapshot: vec![Message::user("hi"), Message::assistant("hello")],
            tool_calls: Vec::new(),
            final_output: Some("hello".into()),
            usage_delta: Usage {
                input_tokens: 10,
                output_tokens: 3,
                ..Default::default()
            },
            cost_delta: Some(0.0001),
            error: None,
        }
    }

    #[test]
    fn test_jsonl_logger_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let logger = JsonlLogger::new(dir.path(), "run_test").unwrap();

        logger.log(&record("t1")).unwrap();
        logger.log(&record("t2")).unwrap();

        let contents = std::fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        // Records must round-trip losslessly: tests fail loudly even
        // though the production path swallows logger errors.
        let parsed: TurnRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.turn_id, "t1");
        assert_eq!(parsed.usage_delta.input_tokens, 10);
        assert_eq!(parsed.history_snapshot.len(), 2);
    }

    #[test]
    fn test_error_field_omitted_when_clean() {
        let json = serde_json::to_value(record("t1")).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["log_schema_version"], LOG_SCHEMA_VERSION);
    }

    #[test]
    fn test_memory_logger_records_in_order() {
        let logger = MemoryLogger::new();
        logger.log(&record("t1")).unwrap();
        logger.log(&record("t2")).unwrap();
        let records = logger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].turn_id, "t2");
    }
}
