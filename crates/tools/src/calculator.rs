//! Calculator tool: binary arithmetic on two numbers.
//!
//! Supports `add`, `subtract`, `multiply`, and `divide`. Division by zero
//! and unknown operations fail, which the engine reports back to the model
//! as a tool error.

use async_trait::async_trait;
use ferroagent_core::error::ToolError;
use ferroagent_core::tool::{SessionContext, Tool};
use serde_json::Value;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Perform a basic arithmetic operation on two numbers."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "description": "Operation: add, subtract, multiply, divide"
                },
                "a": { "type": "number", "description": "First number" },
                "b": { "type": "number", "description": "Second number" }
            },
            "required": ["operation", "a", "b"]
        })
    }

    fn strict_arguments(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Value, _session: &SessionContext) -> Result<Value, ToolError> {
        let operation = arguments["operation"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'operation' argument".into()))?;
        let a = number_arg(&arguments, "a")?;
        let b = number_arg(&arguments, "b")?;

        let (symbol, value) = match operation {
            "add" => ("+", a + b),
            "subtract" => ("-", a - b),
            "multiply" => ("×", a * b),
            "divide" => {
                if b == 0.0 {
                    return Err(self.failure("Division by zero"));
                }
                ("÷", a / b)
            }
            other => return Err(self.failure(format!("Unsupported operation: {other}"))),
        };

        Ok(Value::String(format!(
            "{} {symbol} {} = {}",
            format_number(a),
            format_number(b),
            format_number(value)
        )))
    }
}

impl CalculatorTool {
    fn failure(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: reason.into(),
        }
    }
}

fn number_arg(arguments: &Value, key: &str) -> Result<f64, ToolError> {
    arguments[key]
        .as_f64()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing numeric '{key}' argument")))
}

/// Drop the trailing `.0` of whole numbers.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
