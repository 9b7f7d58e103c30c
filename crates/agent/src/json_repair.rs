//! Best-effort extraction of a JSON payload from free-form model output.
//!
//! Layers run in order and each one falls through to the next on failure:
//!
//! 1. **Direct parse** of the block between the first `{`/`[` and the last
//!    `}`/`]` (after stripping a `\boxed{...}` wrapper).
//! 2. **Heuristic repair**: escape stray quotes inside string values, then
//!    parse again.
//! 3. **AI repair**: ask a model for corrected JSON once, then run the local
//!    layers on its reply with no further AI pass.
//!
//! Keys containing dots are normalized to underscores on success.

use crate::assist::AssistClient;
use ferroagent_core::error::JsonRepairError;
use regex_lite::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, warn};

const BOXED_PREFIX: &str = "\\boxed{";

/// Remove a leading `\boxed{` and its closing brace.
pub fn strip_boxed(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix(BOXED_PREFIX) {
        Some(inner) => inner.strip_suffix('}').unwrap_or(inner),
        None => trimmed,
    }
}

/// Slice from the first opening brace/bracket to the last closing one.
pub fn slice_json_block(text: &str) -> Result<&str, JsonRepairError> {
    let start = text.find(['{', '[']).ok_or(JsonRepairError::NoJsonBlock)?;
    let end = text.rfind(['}', ']']).ok_or(JsonRepairError::NoJsonBlock)?;
    if end < start {
        return Err(JsonRepairError::NoJsonBlock);
    }
    Ok(&text[start..=end])
}

fn string_value_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#":\s*"(.*?)"(\s*[,}\]])"#).ok())
        .as_ref()
}

/// Escape unescaped double quotes inside `"key": "value"` string values.
pub fn escape_inner_quotes(json: &str) -> String {
    let Some(pattern) = string_value_pattern() else {
        return json.to_string();
    };
    pattern
        .replace_all(json, |caps: &Captures<'_>| {
            let mut escaped = String::with_capacity(caps[1].len());
            let mut backslashes = 0usize;
            for ch in caps[1].chars() {
                if ch == '"' && backslashes % 2 == 0 {
                    escaped.push('\\');
                }
                backslashes = if ch == '\\' { backslashes + 1 } else { 0 };
                escaped.push(ch);
            }
            format!(": \"{escaped}\"{}", &caps[2])
        })
        .into_owned()
}

/// Replace dots in object keys with underscores, at every depth.
pub fn normalize_dotted_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.replace('.', "_"), normalize_dotted_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_dotted_keys).collect()),
        other => other,
    }
}

/// Run the local layers (direct parse, then heuristic repair).
pub fn extract_local(text: &str) -> Result<Value, JsonRepairError> {
    let block = slice_json_block(strip_boxed(text))?;

    let direct_error = match serde_json::from_str::<Value>(block) {
        Ok(value) => return Ok(normalize_dotted_keys(value)),
        Err(e) => e,
    };

    let repaired = escape_inner_quotes(block);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            debug!("JSON parsed after escaping inner quotes");
            Ok(normalize_dotted_keys(value))
        }
        Err(_) => Err(JsonRepairError::Unrepairable {
            text: block.to_string(),
            reason: direct_error.to_string(),
        }),
    }
}

/// JSON extraction with an optional AI repair pass.
#[derive(Debug, Clone, Default)]
pub struct JsonRepairer {
    assist: Option<AssistClient>,
}

impl JsonRepairer {
    /// Local layers only.
    pub fn local() -> Self {
        Self::default()
    }

    /// Local layers plus one AI repair attempt.
    pub fn with_assist(assist: AssistClient) -> Self {
        Self {
            assist: Some(assist),
        }
    }

    pub fn ai_enabled(&self) -> bool {
        self.assist.is_some()
    }

    pub async fn extract(&self, text: &str) -> Result<Value, JsonRepairError> {
        let err = match extract_local(text) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let Some(assist) = &self.assist else {
            return Err(err);
        };
        let block = match &err {
            JsonRepairError::Unrepairable { text, reason } => {
                warn!(%reason, "Local JSON repair failed, asking the model to correct it");
                text.clone()
            }
            JsonRepairError::NoJsonBlock => return Err(err),
        };

        let prompt = format!(
            "Fix the following malformed JSON. Make sure it is valid JSON and return ONLY the corrected JSON, with no introduction or explanation.\n\nJSON to fix:\n{block}"
        );

        let corrected = assist.complete(&prompt).await.map_err(|e| JsonRepairError::Unrepairable {
            text: block.clone(),
            reason: format!("repair request failed: {e}"),
        })?;

        extract_local(&corrected).map_err(|e| JsonRepairError::Unrepairable {
            text: corrected.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::test_helpers::{SequentialMockProvider, make_text_response};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn serialized_values_come_back_unchanged() {
        let values = [
            serde_json::json!({"a": 1, "b": [true, null, "x"], "c": {"d": "e"}}),
            serde_json::json!([1, 2, {"k": "v"}]),
            serde_json::json!({"quote": "she said \"hi\", then left", "n": -2.5}),
            serde_json::json!({}),
        ];
        for value in values {
            let text = serde_json::to_string(&value).unwrap();
            assert_eq!(extract_local(&text).unwrap(), value);
        }
    }

    #[test]
    fn dotted_keys_are_normalized() {
        assert_eq!(extract_local(r#"{"a.b":1}"#).unwrap(), serde_json::json!({"a_b": 1}));
        assert_eq!(
            extract_local(r#"{"outer": [{"x.y.z": {"p.q": 2}}]}"#).unwrap(),
            serde_json::json!({"outer": [{"x_y_z": {"p_q": 2}}]})
        );
    }

    #[test]
    fn block_is_sliced_out_of_prose() {
        let text = "Sure! Here is the result:\n```json\n{\"answer\": \"42\"}\n```\nHope it helps.";
        assert_eq!(extract_local(text).unwrap(), serde_json::json!({"answer": "42"}));
    }

    #[test]
    fn boxed_wrapper_is_stripped() {
        let text = "\\boxed{{\"answer\": 7}}";
        assert_eq!(extract_local(text).unwrap(), serde_json::json!({"answer": 7}));
    }

    #[test]
    fn inner_quotes_are_escaped() {
        let text = r#"{"answer": "The sign says "open" today", "ok": true}"#;
        assert_eq!(
            extract_local(text).unwrap(),
            serde_json::json!({"answer": "The sign says \"open\" today", "ok": true})
        );
    }

    #[test]
    fn no_delimiters_is_no_json_block() {
        assert_eq!(extract_local("just words").unwrap_err(), JsonRepairError::NoJsonBlock);
        assert_eq!(extract_local("} backwards {").unwrap_err(), JsonRepairError::NoJsonBlock);
        assert_eq!(extract_local("42").unwrap_err(), JsonRepairError::NoJsonBlock);
    }

    #[test]
    fn broken_json_is_unrepairable_locally() {
        let err = extract_local("{\"a\": 1,, }").unwrap_err();
        match err {
            JsonRepairError::Unrepairable { text, .. } => assert_eq!(text, "{\"a\": 1,, }"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    fn repairer(provider: Arc<SequentialMockProvider>) -> JsonRepairer {
        JsonRepairer::with_assist(
            AssistClient::new(provider, "qwen/qwen3-4b:free", 0.2)
                .with_retry(RetryPolicy::new(1, Duration::from_millis(1))),
        )
    }

    #[tokio::test]
    async fn ai_pass_repairs_once() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "{\"a\": 1}",
        )]));
        let value = repairer(provider.clone()).extract("{\"a\": 1,, }").await.unwrap();
        assert_eq!(value, serde_json::json!({"a": 1}));
        assert_eq!(provider.call_count(), 1);
        assert!(provider.requests()[0].messages[1].text().contains("{\"a\": 1,, }"));
    }

    #[tokio::test]
    async fn second_failure_is_unrepairable_with_offending_text() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "{still: broken",
        )]));
        let err = repairer(provider.clone()).extract("{\"a\": 1,, }").await.unwrap_err();
        match err {
            JsonRepairError::Unrepairable { text, .. } => assert_eq!(text, "{still: broken"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn no_json_block_skips_ai_pass() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let err = repairer(provider.clone()).extract("nothing here").await.unwrap_err();
        assert_eq!(err, JsonRepairError::NoJsonBlock);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn valid_json_never_calls_the_model() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let value = repairer(provider.clone()).extract("[1,2,3]").await.unwrap();
        assert_eq!(value, serde_json::json!([1, 2, 3]));
        assert_eq!(provider.call_count(), 0);
    }
}
