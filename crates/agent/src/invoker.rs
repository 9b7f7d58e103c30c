//! Executes a single tool call with timing and error isolation.
//!
//! Every failure mode (unparseable arguments, unknown tool, rejected
//! arguments, handler error) becomes the content of the tool message, so a
//! bad call never aborts the step it belongs to.

use crate::json_repair::JsonRepairer;
use ferroagent_core::error::ToolError;
use ferroagent_core::message::{Message, ToolCallRequest};
use ferroagent_core::tool::{
    OutcomeStatus, SessionContext, ToolCallOutcome, ToolRegistry, validate_arguments,
};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, warn};

pub struct ToolInvoker<'a> {
    registry: &'a ToolRegistry,
    repairer: &'a JsonRepairer,
}

impl<'a> ToolInvoker<'a> {
    pub fn new(registry: &'a ToolRegistry, repairer: &'a JsonRepairer) -> Self {
        Self { registry, repairer }
    }

    /// Run one call. Always yields the tool message to append and the outcome record.
    pub async fn dispatch(
        &self,
        call: &ToolCallRequest,
        session: &SessionContext,
    ) -> (Message, ToolCallOutcome) {
        let started = Instant::now();
        let status = match self.execute(call, session).await {
            Ok(value) => OutcomeStatus::Result(value),
            Err(message) => {
                warn!(tool = %call.name, call_id = %call.id, error = %message, "Tool call failed");
                OutcomeStatus::Error(message)
            }
        };
        let execution_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let content = match &status {
            OutcomeStatus::Result(Value::String(s)) => s.clone(),
            OutcomeStatus::Result(other) => other.to_string(),
            OutcomeStatus::Error(message) => message.clone(),
        };

        debug!(tool = %call.name, call_id = %call.id, execution_time_ms, "Tool call finished");

        let message = Message::tool_result(&call.id, &call.name, content);
        let outcome = ToolCallOutcome {
            call_id: call.id.clone(),
            name: call.name.clone(),
            status,
            execution_time_ms,
            done: true,
        };
        (message, outcome)
    }

    async fn execute(&self, call: &ToolCallRequest, session: &SessionContext) -> Result<Value, String> {
        let Some(tool) = self.registry.get(&call.name) else {
            return Err(ToolError::NotFound(call.name.clone()).to_string());
        };

        let arguments = self
            .parse_arguments(&call.arguments)
            .await
            .map_err(|e| format!("Error executing {}: {e}", call.name))?;

        if tool.strict_arguments() {
            validate_arguments(&tool.parameters_schema(), &arguments)
                .map_err(|e| format!("Error executing {}: {e}", call.name))?;
        }

        debug!(tool = %call.name, args = %arguments, "Executing tool");
        tool.execute(arguments, session)
            .await
            .map_err(|e| format!("Error executing {}: {e}", call.name))
    }

    async fn parse_arguments(&self, raw: &str) -> Result<Value, ToolError> {
        if raw.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        self.repairer
            .extract(raw)
            .await
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferroagent_core::message::Role;
    use ferroagent_tools::{CalculatorTool, FnTool};

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CalculatorTool));
        registry.register(Box::new(FnTool::new(
            "profile",
            "Returns a structured profile",
            serde_json::json!({"type": "object"}),
            |args, _session| async move { Ok(serde_json::json!({"seen": args})) },
        )));
        registry.register(Box::new(FnTool::new(
            "explode",
            "Always fails",
            serde_json::json!({"type": "object"}),
            |_args, _session| async move {
                Err(ToolError::ExecutionFailed {
                    tool_name: "explode".into(),
                    reason: "boom".into(),
                })
            },
        )));
        registry
    }

    async fn dispatch(call: ToolCallRequest) -> (Message, ToolCallOutcome) {
        let registry = registry();
        let repairer = JsonRepairer::local();
        ToolInvoker::new(&registry, &repairer)
            .dispatch(&call, &SessionContext::new())
            .await
    }

    #[tokio::test]
    async fn string_result_is_used_verbatim() {
        let (message, outcome) = dispatch(ToolCallRequest::new(
            "c1",
            "calculate",
            r#"{"operation":"multiply","a":6,"b":7}"#,
        ))
        .await;
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(message.name.as_deref(), Some("calculate"));
        assert_eq!(message.text(), "6 × 7 = 42");
        assert!(outcome.done);
        assert!(!outcome.is_error());
    }

    #[tokio::test]
    async fn structured_result_is_serialized() {
        let (message, outcome) = dispatch(ToolCallRequest::new("c2", "profile", "   ")).await;
        assert_eq!(message.text(), r#"{"seen":{}}"#);
        assert_eq!(outcome.result(), Some(&serde_json::json!({"seen": {}})));
    }

    #[tokio::test]
    async fn unknown_tool_is_recovered() {
        let (message, outcome) = dispatch(ToolCallRequest::new("c3", "teleport", "{}")).await;
        assert_eq!(message.text(), "Tool 'teleport' not found");
        assert_eq!(outcome.status, OutcomeStatus::Error("Tool 'teleport' not found".into()));
    }

    #[tokio::test]
    async fn handler_failure_is_recovered() {
        let (message, outcome) = dispatch(ToolCallRequest::new("c4", "explode", "{}")).await;
        assert!(message.text().starts_with("Error executing explode:"));
        assert!(message.text().contains("boom"));
        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn division_by_zero_is_a_tool_message() {
        let (message, _) = dispatch(ToolCallRequest::new(
            "c5",
            "calculate",
            r#"{"operation":"divide","a":1,"b":0}"#,
        ))
        .await;
        assert!(message.text().contains("Division by zero"));
    }

    #[tokio::test]
    async fn schema_violations_are_reported() {
        let (message, outcome) = dispatch(ToolCallRequest::new(
            "c6",
            "calculate",
            r#"{"operation":"add","a":"two","b":2}"#,
        ))
        .await;
        assert!(message.text().contains("must be of type number"));
        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn unparseable_arguments_are_reported() {
        let (message, outcome) = dispatch(ToolCallRequest::new("c7", "calculate", "add 2 and 2")).await;
        assert!(message.text().starts_with("Error executing calculate: Invalid tool arguments"));
        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn sloppy_arguments_are_repaired() {
        let (message, _) = dispatch(ToolCallRequest::new(
            "c8",
            "calculate",
            "Sure: {\"operation\": \"add\", \"a\": 1, \"b\": 2}",
        ))
        .await;
        assert_eq!(message.text(), "1 + 2 = 3");
    }
}
