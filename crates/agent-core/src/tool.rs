//! Tool System
//!
//! Tools are plain async closures registered under a unique name with a
//! declared parameter-type map. The registry coerces inbound arguments
//! against the declared types before dispatch: primitives and generic
//! containers pass through unchanged, while `Record` parameters are
//! constructed from their JSON mapping via an explicit converter — no
//! runtime reflection.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};
use crate::provider::ToolSchema;

/// JSON object used for tool arguments
pub type JsonMap = Map<String, Value>;

/// Error returned by a tool body
#[derive(Clone, Debug)]
pub struct ToolError {
    pub message: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolError {}

impl From<String> for ToolError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ToolError {
    fn from(message: &str) -> Self {
        Self {
            message: message.into(),
        }
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, ToolError>> + Send>>;
type Handler = Arc<dyn Fn(JsonMap) -> HandlerFuture + Send + Sync>;

/// Converter that constructs a structured value from a JSON mapping
pub type RecordConverter =
    Arc<dyn Fn(&JsonMap) -> std::result::Result<Value, String> + Send + Sync>;

/// Declared type of a tool parameter.
///
/// Everything except `Record` passes through coercion untouched.
#[derive(Clone)]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// A structured (record) type, constructed from an inbound mapping
    /// by the attached converter
    Record(RecordConverter),
}

impl ParamKind {
    /// JSON Schema type name used in the wire schema
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object | Self::Record(_) => "object",
        }
    }

    /// The type → converter table: only `Record` kinds convert.
    fn converter(&self) -> Option<&RecordConverter> {
        match self {
            Self::Record(conv) => Some(conv),
            _ => None,
        }
    }
}

impl fmt::Debug for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record(_) => write!(f, "Record(..)"),
            other => write!(f, "{}", other.json_type()),
        }
    }
}

/// Build a `Record` kind whose converter constructs `T` from the
/// inbound mapping and re-serializes it to the canonical JSON form.
///
/// Missing or ill-typed fields surface as an
/// [`AgentError::ArgumentCoercion`] at invoke time.
pub fn record_of<T>() -> ParamKind
where
    T: DeserializeOwned + Serialize,
{
    ParamKind::Record(Arc::new(|raw: &JsonMap| {
        let typed: T =
            serde_json::from_value(Value::Object(raw.clone())).map_err(|e| e.to_string())?;
        serde_json::to_value(typed).map_err(|e| e.to_string())
    }))
}

/// One declared tool parameter
#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

impl ParamSpec {
    /// A required parameter with no description
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            required: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// A registered tool: name, parameter-type map, description, and the
/// owned implementation closure.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    handler: Handler,
}

impl ToolSpec {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        params: Vec<ParamSpec>,
        f: F,
    ) -> Self
    where
        F: Fn(JsonMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            params,
            handler: Arc::new(move |args| -> HandlerFuture { Box::pin(f(args)) }),
        }
    }

    /// Wire schema derived from the declared parameters
    pub fn schema(&self) -> ToolSchema {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            let mut prop = Map::new();
            prop.insert("type".into(), Value::from(param.kind.json_type()));
            if !param.description.is_empty() {
                prop.insert("description".into(), Value::from(param.description.clone()));
            }
            properties.insert(param.name.clone(), Value::Object(prop));
            if param.required {
                required.push(Value::from(param.name.clone()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".into(), Value::from("object"));
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }

        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: Value::Object(schema),
        }
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Registry for available tools, immutable after conversation creation
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Duplicate names are rejected.
    pub fn register(&mut self, spec: ToolSpec) -> Result<()> {
        if self.tools.contains_key(&spec.name) {
            return Err(AgentError::DuplicateTool(spec.name));
        }
        self.tools.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// Wire schemas for all registered tools, in name order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(ToolSpec::schema).collect()
    }

    /// Registered tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Coerce arguments and execute the named tool.
    ///
    /// The return value is stringified for embedding in a tool-result
    /// block: strings verbatim, other JSON values in compact form.
    pub async fn invoke(&self, name: &str, raw_args: &JsonMap) -> Result<String> {
        let spec = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        let args = coerce_args(spec, raw_args)?;
        tracing::debug!(tool = %name, "executing tool");

        let output = (spec.handler)(args)
            .await
            .map_err(|e| AgentError::ToolExecution {
                tool: name.to_string(),
                message: e.message,
            })?;

        Ok(render_value(output))
    }
}

/// Apply declared-type coercion to a raw argument mapping.
///
/// Unknown parameter names pass through unconverted.
fn coerce_args(spec: &ToolSpec, raw: &JsonMap) -> Result<JsonMap> {
    let mut coerced = JsonMap::new();
    for (key, value) in raw {
        let converted = match spec.params.iter().find(|p| p.name == *key) {
            Some(param) => match (param.kind.converter(), value) {
                (Some(convert), Value::Object(map)) => {
                    convert(map).map_err(|message| AgentError::ArgumentCoercion {
                        tool: spec.name.clone(),
                        param: key.clone(),
                        message,
                    })?
                }
                _ => value.clone(),
            },
            None => value.clone(),
        };
        coerced.insert(key.clone(), converted);
    }
    Ok(coerced)
}

fn render_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
