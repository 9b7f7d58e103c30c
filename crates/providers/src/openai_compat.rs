//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenRouter, OpenAI, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/chat/completions` with function calling.

use async_trait::async_trait;
use ferroagent_config::AppConfig;
use ferroagent_core::error::ProviderError;
use ferroagent_core::message::{Message, ToolCallRequest};
use ferroagent_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM provider.
///
/// This handles the vast majority of LLM providers since most expose
/// an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Build the provider described by the application config.
    pub fn from_config(config: &AppConfig) -> std::result::Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ProviderError::NotConfigured(
                    "no API key: set FERROAGENT_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY".into(),
                )
            })?;
        Ok(Self::new(
            provider_name_for(&config.base_url),
            config.base_url.clone(),
            api_key,
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
                name: m.name.clone(),
            })
            .collect()
    }

    /// Build the JSON body of a chat-completion request.
    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request.tools.iter().map(ToolDefinition::to_wire).collect();
            body["tools"] = serde_json::Value::Array(tools);
            let choice = request.tool_choice.unwrap_or(ToolChoice::Auto);
            body["tool_choice"] = serde_json::json!(choice);
        }

        body
    }

    /// Turn a decoded API response into the first choice's assistant message.
    fn into_provider_response(
        api_response: ApiResponse,
        requested_model: &str,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        if let Some(err) = api_response.error {
            let status_code = err
                .code
                .as_ref()
                .and_then(serde_json::Value::as_u64)
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(200);
            return Err(ProviderError::ApiError {
                status_code,
                message: err.message,
            });
        }

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let tool_calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let id = tc
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                ToolCallRequest::new(id, tc.function.name, tc.function.arguments)
            })
            .collect();

        let mut message = Message::assistant_tool_calls(tool_calls);
        message.content = choice.message.content;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response
                .model
                .unwrap_or_else(|| requested_model.to_string()),
        })
    }
}

/// Pick a display name from the endpoint URL.
fn provider_name_for(base_url: &str) -> &'static str {
    if base_url.contains("openrouter.ai") {
        "openrouter"
    } else if base_url.contains("api.openai.com") {
        "openai"
    } else {
        "openai-compatible"
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            return Err(ProviderError::ModelNotFound(request.model));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let parsed = Self::into_provider_response(api_response, &request.model)?;
        trace!(
            tool_calls = parsed.message.tool_calls.len(),
            has_content = parsed.message.content.is_some(),
            "Completion received"
        );
        Ok(parsed)
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openrouter_constructor() {
        let provider = OpenAiCompatProvider::openrouter("sk-test");
        assert_eq!(provider.name(), "openrouter");
        assert!(provider.base_url.contains("openrouter.ai"));
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = AppConfig::default();
        assert!(matches!(
            OpenAiCompatProvider::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));

        let config = AppConfig {
            api_key: Some("sk-test".into()),
            base_url: "http://localhost:11434/v1/".into(),
            ..AppConfig::default()
        };
        let provider = OpenAiCompatProvider::from_config(&config).unwrap();
        assert_eq!(provider.name(), "openai-compatible");
        assert_eq!(provider.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn message_conversion_keeps_null_content_and_back_references() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::assistant_tool_calls(vec![ToolCallRequest::new("c1", "get_weather", "{}")]),
            Message::tool_result("c1", "get_weather", "sunny"),
        ];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 3);
        assert_eq!(api_messages[0].role, "system");

        let wire = serde_json::to_value(&api_messages).unwrap();
        assert!(wire[1]["content"].is_null());
        assert_eq!(wire[1]["tool_calls"][0]["type"], "function");
        assert_eq!(wire[2]["tool_call_id"], "c1");
        assert_eq!(wire[2]["name"], "get_weather");
        assert!(wire[0].get("tool_calls").is_none());
    }

    #[test]
    fn request_body_sets_auto_tool_choice_only_with_tools() {
        let bare = ProviderRequest::new("m", vec![Message::user("hi")], vec![], 0.7);
        let body = OpenAiCompatProvider::request_body(&bare);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());

        let with_tools = ProviderRequest::new(
            "m",
            vec![Message::user("hi")],
            vec![ToolDefinition {
                name: "final_answer".into(),
                description: "answer".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            0.2,
        );
        let body = OpenAiCompatProvider::request_body(&with_tools);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "final_answer");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn parses_tool_call_response() {
        let raw = r#"{
            "model": "qwen/qwen3-coder:free",
            "choices": [{"message": {"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "calculate", "arguments": "{\"operation\":\"add\",\"a\":2,\"b\":2}"}}
            ]}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        let resp = OpenAiCompatProvider::into_provider_response(api, "requested").unwrap();
        assert_eq!(resp.model, "qwen/qwen3-coder:free");
        assert!(resp.message.content.is_none());
        assert_eq!(resp.message.tool_calls[0].name, "calculate");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn missing_tool_call_id_is_generated() {
        let raw = r#"{"choices": [{"message": {"tool_calls": [
            {"function": {"name": "final_answer", "arguments": ""}}
        ]}}]}"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        let resp = OpenAiCompatProvider::into_provider_response(api, "m").unwrap();
        assert!(resp.message.tool_calls[0].id.starts_with("call_"));
        assert_eq!(resp.model, "m");
    }

    #[test]
    fn empty_choices_is_a_transient_api_error() {
        let api: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let err = OpenAiCompatProvider::into_provider_response(api, "m").unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 200, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn error_body_maps_to_api_error() {
        let raw = r#"{"error": {"message": "Provider returned error", "code": 502}}"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        let err = OpenAiCompatProvider::into_provider_response(api, "m").unwrap_err();
        match err {
            ProviderError::ApiError { status_code, message } => {
                assert_eq!(status_code, 502);
                assert!(message.contains("Provider returned error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
