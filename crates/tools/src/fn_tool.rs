//! Closure-backed tools.
//!
//! `FnTool` turns a name, a description, a parameter schema, and an async
//! closure into a [`Tool`], so callers can register handlers without
//! declaring a type per tool.

use async_trait::async_trait;
use ferroagent_core::error::ToolError;
use ferroagent_core::tool::{SessionContext, Tool};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>;
type Handler = Arc<dyn Fn(Value, SessionContext) -> HandlerFuture + Send + Sync>;

pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    strict: bool,
    handler: Handler,
}

impl FnTool {
    /// Build a tool from an async handler receiving the arguments and the session.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            strict: false,
            handler: Arc::new(move |args, session| Box::pin(handler(args, session))),
        }
    }

    /// Check arguments against the schema before the handler runs.
    pub fn validated(mut self) -> Self {
        self.strict = true;
        self
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("strict", &self.strict)
            .finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn strict_arguments(&self) -> bool {
        self.strict
    }

    async fn execute(&self, arguments: Value, session: &SessionContext) -> Result<Value, ToolError> {
        (self.handler)(arguments, session.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greet() -> FnTool {
        FnTool::new(
            "greet",
            "Greets someone",
            serde_json::json!({
                "type": "object",
                "properties": { "who": { "type": "string" } },
                "required": ["who"]
            }),
            |args, _session| async move {
                let who = args["who"].as_str().unwrap_or("nobody").to_string();
                Ok(Value::String(format!("hello {who}")))
            },
        )
    }

    #[tokio::test]
    async fn closure_runs_with_arguments() {
        let tool = greet();
        let out = tool
            .execute(serde_json::json!({"who": "Ada"}), &SessionContext::new())
            .await
            .unwrap();
        assert_eq!(out, "hello Ada");
        assert!(!tool.strict_arguments());
    }

    #[tokio::test]
    async fn closure_sees_session_values() {
        let tool = FnTool::new("whoami", "", serde_json::json!({}), |_args, session| async move {
            Ok(session.get("user").cloned().unwrap_or(Value::Null))
        });
        let session = SessionContext::new().with_value("user", serde_json::json!("grace"));
        let out = tool.execute(Value::Null, &session).await.unwrap();
        assert_eq!(out, "grace");
    }

    #[test]
    fn definition_carries_schema() {
        let def = greet().validated().to_definition();
        assert_eq!(def.name, "greet");
        assert_eq!(def.parameters["required"][0], "who");
    }
}
