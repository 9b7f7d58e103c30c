//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act: look up the weather,
//! do arithmetic, or hand back the final answer. Each tool exposes a name,
//! a JSON Schema for its parameters, and an async `execute`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use crate::error::ToolError;
use crate::message::ConversationId;
use crate::provider::ToolDefinition;

/// Per-conversation context handed to every tool invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    /// The conversation this call belongs to
    pub id: ConversationId,

    /// Free-form values tools may read
    #[serde(default)]
    pub values: serde_json::Map<String, Value>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Whether a dispatched call produced a value or an error description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Result(Value),
    Error(String),
}

/// Execution record for one tool call, joined to its request by `call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub call_id: String,
    pub name: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    pub execution_time_ms: u64,
    pub done: bool,
}

impl ToolCallOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self.status, OutcomeStatus::Error(_))
    }

    /// The successful result, if any.
    pub fn result(&self) -> Option<&Value> {
        match &self.status {
            OutcomeStatus::Result(v) => Some(v),
            OutcomeStatus::Error(_) => None,
        }
    }
}

/// The core Tool trait.
///
/// Tools are registered in the [`ToolRegistry`] and made available to the
/// conversation loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_weather").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool. A string result is sent back verbatim, anything
    /// else is serialized as JSON.
    async fn execute(&self, arguments: Value, session: &SessionContext) -> std::result::Result<Value, ToolError>;

    /// Whether arguments are checked against `parameters_schema` before `execute`.
    fn strict_arguments(&self) -> bool {
        false
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Check `arguments` against the `required` list and the primitive
/// `type` of each declared property.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> std::result::Result<(), ToolError> {
    let Some(args) = arguments.as_object() else {
        return Err(ToolError::InvalidArguments("arguments must be an object".into()));
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(key) {
                return Err(ToolError::InvalidArguments(format!("missing required field '{key}'")));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in args {
        let Some(expected) = properties.get(key).and_then(|p| p.get("type")).and_then(Value::as_str) else {
            continue;
        };
        let ok = match expected {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            "null" => value.is_null(),
            _ => true,
        };
        if !ok {
            return Err(ToolError::InvalidArguments(format!("field '{key}' must be of type {expected}")));
        }
    }
    Ok(())
}

/// A registry of available tools, kept in registration order.
///
/// The engine uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Look up tools when the LLM requests them
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name in place.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let tool: Arc<dyn Tool> = Arc::from(tool);
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    /// Remove a tool by name. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.tools.len();
        self.tools.retain(|t| t.name() != name);
        self.tools.len() != before
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}
