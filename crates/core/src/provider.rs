//! Provider trait: the abstraction over chat-completion backends.
//!
//! A Provider takes the conversation log plus the tool definitions and
//! returns one assistant message, which may request tool calls. The
//! transport behind it is a black box to the orchestration loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "qwen/qwen3-coder:free", "gpt-4o")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// How the model may pick tools; only meaningful when `tools` is non-empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// Build a request; tool choice is `auto` exactly when tools are offered.
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        temperature: f32,
    ) -> Self {
        let tool_choice = (!tools.is_empty()).then_some(ToolChoice::Auto);
        Self {
            model: model.into(),
            messages,
            temperature,
            max_tokens: None,
            tools,
            tool_choice,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Tool selection mode sent with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// The function-calling wire shape:
    /// `{"type": "function", "function": {"name", "description", "parameters"}}`.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated assistant message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The conversation engine calls `complete()` without knowing which backend
/// is behind it, so tests substitute scripted providers freely.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_choice_is_auto_only_with_tools() {
        let without = ProviderRequest::new("m", vec![], vec![], 0.7);
        assert!(without.tool_choice.is_none());

        let with = ProviderRequest::new(
            "m",
            vec![],
            vec![ToolDefinition {
                name: "final_answer".into(),
                description: "Give the answer".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            0.7,
        );
        assert_eq!(with.tool_choice, Some(ToolChoice::Auto));
        let json = serde_json::to_value(&with).unwrap();
        assert_eq!(json["tool_choice"], "auto");
    }

    #[test]
    fn tool_definition_wire_shape() {
        let tool = ToolDefinition {
            name: "get_weather".into(),
            description: "Weather for a city".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string", "description": "City name" }
                },
                "required": ["city"]
            }),
        };
        let wire = tool.to_wire();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "get_weather");
        assert_eq!(wire["function"]["parameters"]["required"][0], "city");
    }
}
