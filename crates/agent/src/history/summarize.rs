//! AI-assisted compression: older turns are replaced by a model-written
//! summary, falling back to plain truncation whenever that fails.

use super::{HistoryPolicy, split_window, truncate, validate_json};
use crate::assist::AssistClient;
use crate::json_repair::JsonRepairer;
use ferroagent_core::message::{Message, Role};
use tracing::{info, warn};

const SUMMARY_PROMPT: &str = "\
Compress the following conversation history. Keep every fact, decision, and \
tool result that later turns may depend on; drop greetings and repetition. \
Reply ONLY with a JSON array of messages, each an object with a \"role\" \
(\"user\" or \"assistant\") and a \"content\" string.

History:
";

#[derive(Debug, Clone)]
pub struct Summarizer {
    assist: AssistClient,
    repairer: JsonRepairer,
}

impl Summarizer {
    pub fn new(assist: AssistClient, repairer: JsonRepairer) -> Self {
        Self { assist, repairer }
    }

    /// Compress `messages` if longer than the policy allows.
    ///
    /// Keeps the system message and the recent window verbatim and replaces
    /// the rest with the summary. Any failure of the summarization call or
    /// of its output falls back to [`truncate`].
    pub async fn compress(&self, messages: &[Message], policy: &HistoryPolicy) -> Vec<Message> {
        let max_length = policy.max_length.max(1);
        if messages.len() <= max_length {
            return messages.to_vec();
        }

        let window = split_window(messages, max_length, policy.keep_recent);
        if window.dropped.is_empty() {
            return truncate(messages, max_length, policy.keep_recent);
        }

        let summary = match self.summarize(&window.dropped).await {
            Ok(summary) => summary,
            Err(reason) => {
                warn!(%reason, "History summarization failed, truncating instead");
                return truncate(messages, max_length, policy.keep_recent);
            }
        };

        let mut result: Vec<Message> = window.system.into_iter().collect();
        result.extend(summary);
        result.extend(window.kept);

        info!(before = messages.len(), after = result.len(), "History summarized");
        if result.is_empty() {
            return truncate(messages, max_length, policy.keep_recent);
        }
        if result.len() > max_length {
            return truncate(&result, max_length, policy.keep_recent);
        }
        result
    }

    async fn summarize(&self, prefix: &[Message]) -> Result<Vec<Message>, String> {
        let payload = serde_json::to_string_pretty(prefix).map_err(|e| e.to_string())?;
        let reply = self
            .assist
            .complete(&format!("{SUMMARY_PROMPT}{payload}"))
            .await
            .map_err(|e| e.to_string())?;
        let value = self.repairer.extract(&reply).await.map_err(|e| e.to_string())?;
        let summary = validate_json(&value).map_err(|e| e.to_string())?;
        Ok(summary
            .into_iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant) && !m.has_tool_calls())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::test_helpers::{SequentialMockProvider, make_text_response};
    use ferroagent_config::CompressionStrategy;
    use ferroagent_core::message::ToolCallRequest;
    use std::sync::Arc;
    use std::time::Duration;

    fn long_history() -> Vec<Message> {
        let mut messages = vec![Message::system("be brief")];
        for i in 0..6 {
            messages.push(Message::user(format!("q{i}")));
            messages.push(Message::assistant(format!("a{i}")));
        }
        messages
    }

    fn policy() -> HistoryPolicy {
        HistoryPolicy {
            max_length: 8,
            keep_recent: 4,
            strategy: CompressionStrategy::Summarize,
        }
    }

    fn summarizer(provider: Arc<SequentialMockProvider>) -> Summarizer {
        let assist = AssistClient::new(provider, "small", 0.2)
            .with_retry(RetryPolicy::new(1, Duration::from_millis(1)));
        Summarizer::new(assist, JsonRepairer::local())
    }

    #[tokio::test]
    async fn summary_replaces_the_prefix() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            r#"[{"role": "user", "content": "Earlier: asked q0..q3"}, {"role": "assistant", "content": "answered a0..a3"}]"#,
        )]));
        let result = summarizer(provider.clone()).compress(&long_history(), &policy()).await;

        assert_eq!(result.len(), 7);
        assert_eq!(result[0].role, Role::System);
        assert_eq!(result[1].text(), "Earlier: asked q0..q3");
        assert_eq!(result[3].text(), "q4");
        assert_eq!(result[6].text(), "a5");

        let prompt = provider.requests()[0].messages[1].text().to_string();
        assert!(prompt.contains("\"q0\""));
        assert!(!prompt.contains("\"q5\""));
    }

    #[tokio::test]
    async fn invalid_summary_falls_back_to_truncation() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "I could not summarize that.",
        )]));
        let result = summarizer(provider).compress(&long_history(), &policy()).await;

        assert_eq!(result.len(), 5);
        assert_eq!(result[0].role, Role::System);
        assert_eq!(result[1].text(), "q4");
    }

    #[tokio::test]
    async fn summary_that_is_not_a_message_array_falls_back() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            r#"{"summary": "stuff"}"#,
        )]));
        let result = summarizer(provider).compress(&long_history(), &policy()).await;
        assert_eq!(result.len(), 5);
    }

    #[tokio::test]
    async fn tool_turn_is_not_split_by_the_summary_boundary() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            r#"[{"role": "user", "content": "Earlier small talk"}]"#,
        )]));
        let messages = vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("add some numbers"),
            Message::assistant_tool_calls(vec![
                ToolCallRequest::new("c1", "calculate", "{}"),
                ToolCallRequest::new("c2", "calculate", "{}"),
            ]),
            Message::tool_result("c1", "calculate", "1 + 1 = 2"),
            Message::tool_result("c2", "calculate", "2 + 2 = 4"),
        ];
        let policy = HistoryPolicy {
            max_length: 6,
            keep_recent: 2,
            strategy: CompressionStrategy::Summarize,
        };
        let result = summarizer(provider.clone()).compress(&messages, &policy).await;

        assert!(result.len() <= 6);
        let roles: Vec<Role> = result.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::User, Role::Assistant, Role::Tool, Role::Tool]
        );
        assert_eq!(result[2].text(), "add some numbers");
        assert_eq!(result[3].tool_calls.len(), 2);

        let prompt = provider.requests()[0].messages[1].text().to_string();
        assert!(prompt.contains("\"hello\""));
        assert!(!prompt.contains("1 + 1 = 2"));
    }

    #[tokio::test]
    async fn short_history_is_untouched() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let messages = vec![Message::system("s"), Message::user("hi")];
        let result = summarizer(provider.clone()).compress(&messages, &policy()).await;
        assert_eq!(result, messages);
        assert_eq!(provider.call_count(), 0);
    }
}
