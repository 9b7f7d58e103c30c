//! Conversation history: the ordered message log and the operations on it.
//!
//! [`HistoryManager`] owns the log. The free functions validate, compress,
//! render, and summarize message slices without owning them, so the same
//! rules apply to a live log and to a persisted one being loaded.

pub mod summarize;

use ferroagent_config::{CompressionStrategy, HistoryConfig};
use ferroagent_core::error::HistoryError;
use ferroagent_core::message::{Message, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use summarize::Summarizer;

/// When and how the log is compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPolicy {
    /// Compress once the log is longer than this
    pub max_length: usize,
    /// Non-system messages preserved verbatim
    pub keep_recent: usize,
    pub strategy: CompressionStrategy,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self::from(&HistoryConfig::default())
    }
}

impl From<&HistoryConfig> for HistoryPolicy {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            max_length: config.max_length,
            keep_recent: config.keep_recent,
            strategy: config.strategy,
        }
    }
}

/// The ordered message log of one conversation.
#[derive(Debug, Clone, Default)]
pub struct HistoryManager {
    messages: Vec<Message>,
}

impl HistoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a message to the end of the log.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the whole log after validating it. The log is untouched on error.
    pub fn replace(&mut self, messages: Vec<Message>) -> Result<(), HistoryError> {
        validate(&messages)?;
        self.messages = messages;
        Ok(())
    }

    /// Append several messages after validating them.
    pub fn extend(&mut self, messages: Vec<Message>) -> Result<(), HistoryError> {
        validate(&messages)?;
        self.messages.extend(messages);
        Ok(())
    }

    /// Swap in an already-compressed log without re-validating it.
    pub(crate) fn set_compressed(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Remove and return the newest message.
    pub fn discard_last(&mut self) -> Option<Message> {
        self.messages.pop()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Put `system` back at index 0 unless a system message already leads the log.
    pub fn ensure_system_first(&mut self, system: &Message) {
        if self.messages.first().is_some_and(|m| m.role == Role::System) {
            return;
        }
        self.messages.retain(|m| m.role != Role::System);
        self.messages.insert(0, system.clone());
    }
}

/// Reject logs containing a non-assistant message without content.
pub fn validate(messages: &[Message]) -> Result<(), HistoryError> {
    for (index, message) in messages.iter().enumerate() {
        if message.role != Role::Assistant && message.content.is_none() {
            return Err(HistoryError::MissingContent {
                index,
                role: message.role.to_string(),
            });
        }
    }
    Ok(())
}

/// Validate and decode a persisted log (a JSON array of messages).
pub fn validate_json(value: &serde_json::Value) -> Result<Vec<Message>, HistoryError> {
    let items = value.as_array().ok_or(HistoryError::NotAnArray)?;
    let mut messages = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let role_name = item.get("role").and_then(|r| r.as_str()).unwrap_or_default();
        let Some(role) = Role::parse(role_name) else {
            return Err(HistoryError::InvalidRole {
                index,
                role: item.get("role").map(|r| r.to_string()).unwrap_or_else(|| "<missing>".into()),
            });
        };

        let has_content = item.get("content").is_some_and(|c| !c.is_null());
        if role != Role::Assistant && !has_content {
            return Err(HistoryError::MissingContent {
                index,
                role: role.to_string(),
            });
        }

        let message: Message = serde_json::from_value(item.clone()).map_err(|e| HistoryError::Malformed {
            index,
            reason: e.to_string(),
        })?;
        messages.push(message);
    }

    Ok(messages)
}

/// Reduce an oversized log to the system message plus the most recent turns.
///
/// Returns the input unchanged when it is within `max_length`. Otherwise the
/// result keeps the first system message and the last `keep_recent`
/// non-system messages, bounded by `max_length`. A tool-call turn and its
/// results are kept or dropped together, the latest user message is kept
/// when it fits, and the result is never empty.
pub fn truncate(messages: &[Message], max_length: usize, keep_recent: usize) -> Vec<Message> {
    if messages.len() <= max_length.max(1) {
        return messages.to_vec();
    }

    let window = split_window(messages, max_length, keep_recent);
    let mut result: Vec<Message> = window.system.into_iter().collect();
    result.extend(window.kept);

    if result.is_empty() {
        result.extend(fallback_message(messages));
    }
    result
}

/// The compression boundary: what survives verbatim and what is cut.
pub(crate) struct Window {
    pub system: Option<Message>,
    pub dropped: Vec<Message>,
    pub kept: Vec<Message>,
}

/// Split `messages` into the first system message, the cut prefix and the
/// preserved tail, moving the boundary so no tool-call turn is split.
pub(crate) fn split_window(messages: &[Message], max_length: usize, keep_recent: usize) -> Window {
    let system = messages.iter().find(|m| m.role == Role::System).cloned();
    let capacity = max_length.max(1) - usize::from(system.is_some());
    let keep = keep_recent.min(capacity);

    let units = turn_units(messages.iter().filter(|m| m.role != Role::System));

    // Walk back whole units; one that straddles `keep` still fits if it fits `capacity`.
    let mut start = units.len();
    let mut count = 0;
    while start > 0 && count < keep {
        let size = units[start - 1].len();
        if count + size > capacity {
            break;
        }
        count += size;
        start -= 1;
    }

    let mut promoted = None;
    let tail_has_user = units[start..].iter().flatten().any(|m| m.role == Role::User);
    if !tail_has_user {
        if let Some(user) = (0..start).rev().find(|&i| units[i][0].role == Role::User) {
            while count + 1 > capacity && start < units.len() {
                count -= units[start].len();
                start += 1;
            }
            if count < capacity {
                promoted = Some(user);
            }
        }
    }

    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for (i, unit) in units.into_iter().enumerate() {
        if i >= start || promoted == Some(i) {
            kept.extend(unit);
        } else {
            dropped.extend(unit);
        }
    }

    Window {
        system,
        dropped,
        kept,
    }
}

/// Group messages into turns: a single message, or an assistant tool-call
/// message followed by its results. Tool results without their call and
/// tool-call turns missing a result are left out.
fn turn_units<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Vec<Vec<Message>> {
    let mut units: Vec<Vec<Message>> = Vec::new();
    let mut pending: Option<(HashSet<&str>, Vec<Message>)> = None;

    for message in messages {
        if message.role == Role::Tool {
            if let Some((ids, unit)) = pending.as_mut() {
                if message.tool_call_id.as_deref().is_some_and(|id| ids.contains(id)) {
                    unit.push(message.clone());
                }
            }
            continue;
        }

        units.extend(pending.take().and_then(complete_unit));
        if message.has_tool_calls() {
            let ids = message.tool_calls.iter().map(|c| c.id.as_str()).collect();
            pending = Some((ids, vec![message.clone()]));
        } else {
            units.push(vec![message.clone()]);
        }
    }
    units.extend(pending.and_then(complete_unit));
    units
}

fn complete_unit((ids, unit): (HashSet<&str>, Vec<Message>)) -> Option<Vec<Message>> {
    let answered: HashSet<&str> = unit[1..]
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    ids.iter().all(|id| answered.contains(id)).then_some(unit)
}

/// Last resort for a log whose every turn is larger than the budget.
fn fallback_message(messages: &[Message]) -> Option<Message> {
    if let Some(plain) = messages
        .iter()
        .rev()
        .find(|m| m.role != Role::Tool && !m.has_tool_calls())
    {
        return Some(plain.clone());
    }
    messages.iter().rev().find(|m| m.role == Role::Assistant).map(|m| {
        let mut stripped = m.clone();
        stripped.tool_calls.clear();
        stripped.content.get_or_insert_with(String::new);
        stripped
    })
}

/// Human-readable transcript. Tool results are skipped.
pub fn render(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role != Role::Tool)
        .map(|m| {
            let label = match m.role {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::Tool => "Tool",
            };
            let body = match m.content.as_deref() {
                Some(text) if !text.is_empty() => text.to_string(),
                _ => "[Tool calls]".to_string(),
            };
            format!("{label}: {body}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Message counts per role plus the total number of requested tool calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total: usize,
    pub system: usize,
    pub user: usize,
    pub assistant: usize,
    pub tool: usize,
    pub tool_calls: usize,
}

pub fn stats(messages: &[Message]) -> HistoryStats {
    let mut stats = HistoryStats {
        total: messages.len(),
        ..HistoryStats::default()
    };
    for message in messages {
        match message.role {
            Role::System => stats.system += 1,
            Role::User => stats.user += 1,
            Role::Assistant => stats.assistant += 1,
            Role::Tool => stats.tool += 1,
        }
        stats.tool_calls += message.tool_calls.len();
    }
    stats
}
