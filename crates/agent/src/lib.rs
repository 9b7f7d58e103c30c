//! The conversation engine: the heart of FerroAgent.
//!
//! A run follows a **Request → Dispatch → Observe** cycle:
//!
//! 1. **Receive** a user message and append it to the log
//! 2. **Prepare** the log (hook, compression, system message first)
//! 3. **Send to the model** with every registered tool
//! 4. **If tool calls**: execute them in order, append results, loop back to step 2
//! 5. **If a termination signal**: return the answer
//!
//! The loop ends on a successful `final_answer` call, a stop signal, or (in
//! lenient mode) any free-text reply, and fails once the iteration limit is hit.

pub mod assist;
pub mod engine;
pub mod history;
pub mod invoker;
pub mod json_repair;
pub mod retry;

#[cfg(test)]
mod test_helpers;

pub use assist::{AssistClient, ModelChain};
pub use engine::{
    ConversationEngine, ConversationState, EngineConfig, PreRequestHook, RunResponse, StepOutcome,
    Termination, is_stop_signal,
};
pub use history::{HistoryManager, HistoryPolicy, HistoryStats, Summarizer};
pub use invoker::ToolInvoker;
pub use json_repair::JsonRepairer;
pub use retry::RetryPolicy;
