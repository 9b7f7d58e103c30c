//! The `final_answer` tool: the model's way of ending a run.
//!
//! The engine registers it automatically when absent. Calling it echoes the
//! answer back; the engine then treats the call as the termination signal.

use async_trait::async_trait;
use ferroagent_core::error::ToolError;
use ferroagent_core::tool::{SessionContext, Tool};
use serde_json::Value;

/// Registry key of the termination tool.
pub const FINAL_ANSWER_TOOL: &str = "final_answer";

pub struct FinalAnswerTool;

#[async_trait]
impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        FINAL_ANSWER_TOOL
    }

    fn description(&self) -> &str {
        "Use this tool to give the final, complete answer to the user once you have gathered all the information you need."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "The final answer to give to the user"
                }
            },
            "required": ["answer"]
        })
    }

    async fn execute(&self, arguments: Value, _session: &SessionContext) -> Result<Value, ToolError> {
        tracing::debug!("final_answer called");
        match arguments.get("answer") {
            Some(answer) => Ok(answer.clone()),
            None => Err(ToolError::InvalidArguments("Missing 'answer' argument".into())),
        }
    }
}
