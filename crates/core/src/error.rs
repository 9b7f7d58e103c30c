//! Error types for the FerroAgent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! carries only the failures that are fatal to a whole run.

use thiserror::Error;

/// Failures that end a whole run.
///
/// Per-call failures (tools, argument parsing) never surface here; they are
/// reported back to the model as tool results.
#[derive(Debug, Error)]
pub enum Error {
    /// The completion request kept failing after every retry attempt.
    #[error("Completion request failed after {attempts} attempt(s): {source}")]
    CompletionRequestFailed {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// The conversation loop ran out of iterations without a termination signal.
    #[error("Maximum number of iterations reached ({max_iterations})")]
    MaxIterationsExceeded { max_iterations: u32 },

    /// A bulk history replacement was rejected before mutation.
    #[error("Invalid history: {0}")]
    InvalidHistory(#[from] HistoryError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    ///
    /// Credentials, unknown models and missing configuration are permanent;
    /// everything the network or an overloaded upstream can cause is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 200,
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::EmptyResponse(_) => true,
            Self::AuthenticationFailed(_) | Self::ModelNotFound(_) | Self::NotConfigured(_) => {
                false
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history must be a JSON array of messages")]
    NotAnArray,

    #[error("message {index} has an invalid role: {role}")]
    InvalidRole { index: usize, role: String },

    #[error("message {index} ({role}) must have content")]
    MissingContent { index: usize, role: String },

    #[error("message {index} is malformed: {reason}")]
    Malformed { index: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonRepairError {
    #[error("no JSON block found in text")]
    NoJsonBlock,

    #[error("unrepairable JSON ({reason}): {text}")]
    Unrepairable { text: String, reason: String },
}
