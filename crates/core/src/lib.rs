//! # FerroAgent Core
//!
//! Domain types, traits, and error definitions for the FerroAgent
//! conversation orchestrator. This crate defines the domain model that all
//! other crates implement against.
//!
//! ## Design Philosophy
//!
//! The completion backend and the tools are traits here. Implementations
//! live in their respective crates, so tests swap in scripted providers and
//! closure tools without touching the engine.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, HistoryError, JsonRepairError, ProviderError, Result, ToolError};
pub use event::{AgentEvent, EventBus, SubscriptionId};
pub use message::{ConversationId, Message, Role, ToolCallRequest};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, ToolDefinition, Usage};
pub use tool::{OutcomeStatus, SessionContext, Tool, ToolCallOutcome, ToolRegistry};
