//! Lifecycle events and the observer bus that delivers them.
//!
//! Subscribers register on a named channel (an event name such as
//! `tool_message`, the catch-all `message` channel, or every channel via
//! [`EventBus::on_any`]). Delivery is synchronous and in emission order,
//! to the subscribers present at the time of the emit.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use crate::message::{Message, Role};

/// Channel that additionally receives every message-bearing event.
pub const MESSAGE_CHANNEL: &str = "message";

/// Everything a running conversation reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A streaming run began
    Start {
        #[serde(rename = "userMessage")]
        user_message: String,
    },
    /// A user turn was appended to the log
    UserMessage(Message),
    /// The model asked for tools
    AssistantToolCalls(Message),
    /// A tool result was appended
    ToolMessage(Message),
    /// The model answered in free text
    AssistantMessage(Message),
    /// The loop advanced to a new iteration
    Iteration { iteration: u32 },
    /// The run finished
    Complete {
        content: String,
        role: Role,
        iterations: u32,
        messages: Vec<Message>,
    },
    /// The run failed
    Error { message: String },
}

impl AgentEvent {
    /// The channel name this event is emitted on.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::UserMessage(_) => "user_message",
            Self::AssistantToolCalls(_) => "assistant_tool_calls",
            Self::ToolMessage(_) => "tool_message",
            Self::AssistantMessage(_) => "assistant_message",
            Self::Iteration { .. } => "iteration",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// The message carried by this event, if any.
    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::UserMessage(m)
            | Self::AssistantToolCalls(m)
            | Self::ToolMessage(m)
            | Self::AssistantMessage(m) => Some(m),
            _ => None,
        }
    }

    /// The event body without the `event` tag.
    pub fn payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.remove("event");
        }
        value
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked with the channel name it fired on and the event.
pub type EventHandler = Arc<dyn Fn(&str, &AgentEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    channel: Option<String>,
    handler: EventHandler,
}

/// Named-channel observer registry.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a single channel.
    pub fn on<F>(&mut self, channel: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &AgentEvent) + Send + Sync + 'static,
    {
        self.subscribe(Some(channel.into()), Arc::new(handler))
    }

    /// Subscribe to every event, regardless of channel.
    pub fn on_any<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &AgentEvent) + Send + Sync + 'static,
    {
        self.subscribe(None, Arc::new(handler))
    }

    /// Forward every event into an unbounded channel. Send errors are ignored
    /// once the receiver is gone.
    pub fn forward_to(&mut self, tx: mpsc::UnboundedSender<AgentEvent>) -> SubscriptionId {
        self.on_any(move |_, event| {
            let _ = tx.send(event.clone());
        })
    }

    fn subscribe(&mut self, channel: Option<String>, handler: EventHandler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscriptions.push(Subscription { id, channel, handler });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        before != self.subscriptions.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Deliver an event on its own channel, then on `message` if it carries one.
    /// Catch-all subscribers see it once.
    pub fn emit(&self, event: &AgentEvent) {
        let name = event.event_name();
        for sub in &self.subscriptions {
            match sub.channel.as_deref() {
                None => (sub.handler)(name, event),
                Some(channel) if channel == name => (sub.handler)(name, event),
                _ => {}
            }
        }
        if event.message().is_some() {
            for sub in &self.subscriptions {
                if sub.channel.as_deref() == Some(MESSAGE_CHANNEL) {
                    (sub.handler)(name, event);
                }
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriptions.len())
            .finish()
    }
}
