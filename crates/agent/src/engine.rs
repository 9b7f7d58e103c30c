//! The conversation engine: the iteration loop at the heart of FerroAgent.
//!
//! Each iteration:
//!
//! 1. **Prepare** the log: pre-request hook, compression, system message first
//! 2. **Request** a completion with every registered tool (bounded retry)
//! 3. **Interpret** the reply:
//!    - a stop signal (`STOP` token or a trailing `?`) ends the run
//!    - free text is a `response` (ends a lenient run, discarded in a strict one)
//!    - tool calls are dispatched in order; a successful `final_answer` ends the run
//!
//! The loop gives up with [`Error::MaxIterationsExceeded`] once the iteration
//! ceiling is hit.

use crate::assist::AssistClient;
use crate::history::{self, HistoryManager, HistoryPolicy, HistoryStats, Summarizer};
use crate::invoker::ToolInvoker;
use crate::json_repair::{self, JsonRepairer};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use ferroagent_config::{AppConfig, CompressionStrategy, TerminationPolicy};
use ferroagent_core::error::{Error, Result};
use ferroagent_core::event::{AgentEvent, EventBus, SubscriptionId};
use ferroagent_core::message::{Message, Role, ToolCallRequest};
use ferroagent_core::provider::{Provider, ProviderRequest, ProviderResponse};
use ferroagent_core::tool::{OutcomeStatus, SessionContext, Tool, ToolCallOutcome, ToolRegistry};
use ferroagent_tools::{FINAL_ANSWER_TOOL, FinalAnswerTool};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SINGLE_TOOL_HINT: &str = "ALWAYS CALL ONLY ONE tool at a time.";
const STOP_TOKEN: &str = "STOP";

/// Everything the engine needs to know up front.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_iterations: u32,
    /// System instructions; may be empty
    pub instructions: String,
    /// Append the one-tool-per-reply line to the system prompt
    pub single_tool_hint: bool,
    pub verbose: bool,
    pub debug: bool,
    pub history: HistoryPolicy,
    pub retry: RetryPolicy,
    pub termination: TerminationPolicy,
    /// Allow one AI pass when local JSON repair fails
    pub json_repair_ai: bool,
    /// Model (or "primary,fallback" chain) for repair prompts
    pub repair_model: String,
    pub repair_temperature: f32,
    /// Model (or chain) for history summarization
    pub summary_model: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

impl EngineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_iterations: config.max_iterations,
            instructions: config.instructions.clone(),
            single_tool_hint: true,
            verbose: config.verbose,
            debug: config.debug,
            history: HistoryPolicy::from(&config.history),
            retry: RetryPolicy::from(&config.retry),
            termination: config.termination,
            json_repair_ai: config.json_repair.ai_enabled,
            repair_model: config.json_repair.model.clone(),
            repair_temperature: config.json_repair.temperature,
            summary_model: config.summary_model().to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_termination(mut self, termination: TerminationPolicy) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_history_policy(mut self, history: HistoryPolicy) -> Self {
        self.history = history;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_single_tool_hint(mut self, enabled: bool) -> Self {
        self.single_tool_hint = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_json_repair_ai(mut self, enabled: bool) -> Self {
        self.json_repair_ai = enabled;
        self
    }

    /// The system prompt this configuration produces, if any.
    pub fn system_prompt(&self) -> Option<String> {
        let instructions = self.instructions.trim();
        let prompt = match (instructions.is_empty(), self.single_tool_hint) {
            (true, false) => return None,
            (true, true) => SINGLE_TOOL_HINT.to_string(),
            (false, false) => instructions.to_string(),
            (false, true) => format!("{instructions}\n\n{SINGLE_TOOL_HINT}"),
        };
        Some(prompt)
    }
}

/// Rewrites or filters the log right before each completion request.
#[async_trait]
pub trait PreRequestHook: Send + Sync {
    async fn before_request(&self, messages: Vec<Message>) -> Vec<Message>;
}

/// Ephemeral per-run state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub iteration: u32,
    pub running: bool,
}

/// What a single iteration produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The model asked to stop or asked the user a question
    Stop { content: String },
    /// Free-text reply
    Response { content: String },
    /// Tools were dispatched
    ToolCalls {
        calls: Vec<ToolCallRequest>,
        outcomes: Vec<ToolCallOutcome>,
    },
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    FinalAnswer,
    Stop,
    Response,
}

/// The result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub content: String,
    pub role: Role,
    pub iterations: u32,
    pub messages: Vec<Message>,
    #[serde(rename = "type")]
    pub termination: Termination,
}

/// Drives one conversation against a provider.
pub struct ConversationEngine {
    provider: Arc<dyn Provider>,
    config: EngineConfig,
    system_message: Option<Message>,
    history: HistoryManager,
    tools: ToolRegistry,
    events: EventBus,
    session: SessionContext,
    repairer: JsonRepairer,
    summarizer: Option<Summarizer>,
    hook: Option<Arc<dyn PreRequestHook>>,
    state: ConversationState,
}

impl ConversationEngine {
    /// Create an engine with only the `final_answer` tool registered.
    pub fn new(provider: Arc<dyn Provider>, config: EngineConfig) -> Self {
        let repairer = if config.json_repair_ai {
            JsonRepairer::with_assist(
                AssistClient::new(provider.clone(), &config.repair_model, config.repair_temperature)
                    .with_retry(config.retry),
            )
        } else {
            JsonRepairer::local()
        };

        let summarizer = (config.history.strategy == CompressionStrategy::Summarize).then(|| {
            Summarizer::new(
                AssistClient::new(provider.clone(), &config.summary_model, config.repair_temperature)
                    .with_retry(config.retry),
                repairer.clone(),
            )
        });

        let system_message = config.system_prompt().map(Message::system);
        let mut history = HistoryManager::new();
        history.extend(system_message.iter().cloned().collect()).ok();

        let mut tools = ToolRegistry::new();
        ensure_final_answer(&mut tools);

        Self {
            provider,
            config,
            system_message,
            history,
            tools,
            events: EventBus::new(),
            session: SessionContext::new(),
            repairer,
            summarizer,
            hook: None,
            state: ConversationState::default(),
        }
    }

    /// Use `tools`, adding `final_answer` if it is missing.
    pub fn with_tools(mut self, mut tools: ToolRegistry) -> Self {
        ensure_final_answer(&mut tools);
        self.tools = tools;
        self
    }

    pub fn with_pre_request_hook(mut self, hook: Arc<dyn PreRequestHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = session;
        self
    }

    // --- Running ---

    /// Run to completion without lifecycle notifications.
    pub async fn run(&mut self, input: &str) -> Result<RunResponse> {
        self.run_loop(input, false).await
    }

    /// Run to completion, emitting `start`, `iteration`, `complete` and `error`
    /// on the event bus in addition to the message events.
    pub async fn run_stream(&mut self, input: &str) -> Result<RunResponse> {
        self.run_loop(input, true).await
    }

    /// Run and return only the final content.
    pub async fn process_message(&mut self, input: &str) -> Result<String> {
        Ok(self.run(input).await?.content)
    }

    async fn run_loop(&mut self, input: &str, streaming: bool) -> Result<RunResponse> {
        self.state = ConversationState {
            iteration: 0,
            running: true,
        };

        if self.config.verbose {
            info!(input = %input, "Starting run");
        }
        if streaming {
            self.events.emit(&AgentEvent::Start {
                user_message: input.to_string(),
            });
        }

        self.add_user_message(input);
        let result = self.iterate(streaming).await;
        self.state.running = false;

        match result {
            Ok(response) => {
                if self.config.verbose {
                    info!(
                        iterations = response.iterations,
                        termination = ?response.termination,
                        "Run completed"
                    );
                }
                if streaming {
                    self.events.emit(&AgentEvent::Complete {
                        content: response.content.clone(),
                        role: response.role,
                        iterations: response.iterations,
                        messages: response.messages.clone(),
                    });
                }
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, iteration = self.state.iteration, "Run failed");
                if streaming {
                    self.events.emit(&AgentEvent::Error {
                        message: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    async fn iterate(&mut self, streaming: bool) -> Result<RunResponse> {
        let max_iterations = self.config.max_iterations;

        while self.state.iteration < max_iterations {
            self.state.iteration += 1;
            let iteration = self.state.iteration;
            if self.config.verbose {
                info!(iteration, max_iterations, "Iteration");
            }
            if streaming {
                self.events.emit(&AgentEvent::Iteration { iteration });
            }

            match self.step().await? {
                StepOutcome::Stop { content } => {
                    return Ok(self.finish(content, Termination::Stop));
                }
                StepOutcome::Response { content } => match self.config.termination {
                    TerminationPolicy::Lenient => {
                        return Ok(self.finish(content, Termination::Response));
                    }
                    TerminationPolicy::Strict => {
                        self.history.discard_last();
                        if self.config.verbose {
                            info!("Discarding free-text reply, waiting for final_answer");
                        }
                    }
                },
                StepOutcome::ToolCalls { calls, outcomes } => {
                    if let Some(answer) = final_answer_content(&calls, &outcomes) {
                        return Ok(self.finish(answer, Termination::FinalAnswer));
                    }
                    if self.config.verbose {
                        info!(calls = calls.len(), "Continuing with the next iteration");
                    }
                }
            }
        }

        Err(Error::MaxIterationsExceeded { max_iterations })
    }

    fn finish(&self, content: String, termination: Termination) -> RunResponse {
        RunResponse {
            content,
            role: Role::Assistant,
            iterations: self.state.iteration,
            messages: self.history.snapshot(),
            termination,
        }
    }

    /// Execute one iteration: prepare the log, request a completion, and act on it.
    pub async fn step(&mut self) -> Result<StepOutcome> {
        self.prepare_history().await;

        let definitions = self.tools.definitions();
        if self.config.verbose {
            info!(
                messages = self.history.len(),
                tools = ?self.tools.names(),
                "Requesting completion"
            );
        }

        let request = ProviderRequest::new(
            self.config.model.clone(),
            self.history.snapshot(),
            definitions,
            self.config.temperature,
        )
        .with_max_tokens(self.config.max_tokens);

        let response = self.request_completion(request).await?;
        let reply = response.message;

        if !reply.has_tool_calls() {
            let content = reply.content.clone().unwrap_or_default();
            let mut message = reply;
            message.role = Role::Assistant;
            self.history.append(message.clone());
            self.events.emit(&AgentEvent::AssistantMessage(message));

            if self.config.verbose {
                info!(thought = %content, "Model replied with text");
            }

            return Ok(if is_stop_signal(&content) {
                StepOutcome::Stop { content }
            } else {
                StepOutcome::Response { content }
            });
        }

        if self.config.verbose {
            if let Some(reasoning) = reply.content.as_deref().filter(|c| !c.trim().is_empty()) {
                info!(reasoning = %reasoning, "Model reasoning");
            }
            for call in &reply.tool_calls {
                info!(tool = %call.name, args = %call.arguments, "Tool call requested");
            }
        }

        let calls = reply.tool_calls;
        let assistant = Message::assistant_tool_calls(calls.clone());
        self.history.append(assistant.clone());
        self.events.emit(&AgentEvent::AssistantToolCalls(assistant));

        let invoker = ToolInvoker::new(&self.tools, &self.repairer);
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in &calls {
            let (message, outcome) = invoker.dispatch(call, &self.session).await;
            if self.config.verbose {
                info!(tool = %call.name, observation = %message.text(), "Observation");
            }
            self.history.append(message.clone());
            self.events.emit(&AgentEvent::ToolMessage(message));
            outcomes.push(outcome);
        }

        Ok(StepOutcome::ToolCalls { calls, outcomes })
    }

    async fn prepare_history(&mut self) {
        if let Some(hook) = &self.hook {
            let rewritten = hook.before_request(self.history.snapshot()).await;
            if let Err(e) = self.history.replace(rewritten) {
                warn!(error = %e, "Pre-request hook produced an invalid history, ignoring it");
            }
        }

        let policy = &self.config.history;
        if self.history.len() > policy.max_length {
            let before = self.history.len();
            let compressed = match (&self.summarizer, policy.strategy) {
                (Some(summarizer), CompressionStrategy::Summarize) => {
                    summarizer.compress(self.history.messages(), policy).await
                }
                _ => history::truncate(self.history.messages(), policy.max_length, policy.keep_recent),
            };
            debug!(before, after = compressed.len(), "History compressed");
            self.history.set_compressed(compressed);
        }

        if let Some(system) = &self.system_message {
            self.history.ensure_system_first(system);
        }
    }

    async fn request_completion(&self, request: ProviderRequest) -> Result<ProviderResponse> {
        let response = self
            .config
            .retry
            .run(|attempt| {
                let request = request.clone();
                async move {
                    debug!(model = %request.model, attempt, "Sending completion request");
                    self.provider.complete(request).await
                }
            })
            .await?;

        if self.config.debug {
            debug!(
                response = %serde_json::to_string_pretty(&response).unwrap_or_default(),
                "Model response"
            );
        }
        Ok(response)
    }

    // --- History ---

    /// Append a message and emit it as `user_message`.
    pub fn add_message(&mut self, content: &str, role: Role) {
        let message = Message::with_content(role, content);
        self.history.append(message.clone());
        self.events.emit(&AgentEvent::UserMessage(message));
    }

    pub fn add_user_message(&mut self, content: &str) {
        self.add_message(content, Role::User);
    }

    /// Clear the log down to the system prompt.
    pub fn reset(&mut self) {
        self.history.clear();
        if let Some(system) = &self.system_message {
            self.history.append(system.clone());
        }
        self.state = ConversationState::default();
    }

    pub fn history(&self) -> &[Message] {
        self.history.messages()
    }

    /// Replace the log. Invalid histories are rejected without mutation.
    pub fn set_history(&mut self, messages: Vec<Message>) -> Result<()> {
        self.history.replace(messages)?;
        Ok(())
    }

    /// Replace the log from its persisted JSON form.
    pub fn set_history_json(&mut self, value: &Value) -> Result<()> {
        let messages = history::validate_json(value)?;
        self.set_history(messages)
    }

    pub fn append_to_history(&mut self, messages: Vec<Message>) -> Result<()> {
        self.history.extend(messages)?;
        Ok(())
    }

    pub fn readable_history(&self) -> String {
        history::render(self.history.messages())
    }

    pub fn history_stats(&self) -> HistoryStats {
        history::stats(self.history.messages())
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.history.last()
    }

    // --- Tools ---

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Register a tool; an existing tool with the same name is replaced.
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        self.tools.register(tool);
    }

    pub fn remove_tool(&mut self, name: &str) -> bool {
        self.tools.remove(name)
    }

    // --- Events ---

    pub fn on<F>(&mut self, channel: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &AgentEvent) + Send + Sync + 'static,
    {
        self.events.on(channel, handler)
    }

    pub fn off(&mut self, id: SubscriptionId) -> bool {
        self.events.off(id)
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    // --- Flags and state ---

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.config.verbose = verbose;
    }

    pub fn is_verbose(&self) -> bool {
        self.config.verbose
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn iteration(&self) -> u32 {
        self.state.iteration
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }
}

fn ensure_final_answer(tools: &mut ToolRegistry) {
    if !tools.contains(FINAL_ANSWER_TOOL) {
        tools.register(Box::new(FinalAnswerTool));
    }
}

/// `STOP` as a standalone token, or text ending in a question mark.
pub fn is_stop_signal(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.ends_with('?')
        || trimmed
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| token == STOP_TOKEN)
}

/// The answer carried by a successful `final_answer` call in this step, if any.
fn final_answer_content(calls: &[ToolCallRequest], outcomes: &[ToolCallOutcome]) -> Option<String> {
    calls.iter().find_map(|call| {
        if call.name != FINAL_ANSWER_TOOL {
            return None;
        }
        let outcome = outcomes.iter().find(|o| o.call_id == call.id)?;
        let OutcomeStatus::Result(result) = &outcome.status else {
            return None;
        };

        let answer = json_repair::extract_local(&call.arguments)
            .ok()
            .and_then(|args| args.get("answer").cloned())
            .unwrap_or_else(|| result.clone());
        Some(match answer {
            Value::String(s) => s,
            other => other.to_string(),
        })
    })
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("messages", &self.history.len())
            .field("tools", &self.tools)
            .field("state", &self.state)
            .finish()
    }
}
