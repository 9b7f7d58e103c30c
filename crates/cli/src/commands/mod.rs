pub mod chat;
pub mod config_cmd;
pub mod history;
pub mod repair;
pub mod run;

use ferroagent_agent::{ConversationEngine, EngineConfig};
use ferroagent_config::AppConfig;
use ferroagent_providers::OpenAiCompatProvider;
use std::sync::Arc;

pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Load the configuration, failing with setup instructions when no key is set.
pub fn load_config() -> CommandResult<AppConfig> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export OPENROUTER_API_KEY='sk-or-v1-...'   (recommended)");
        eprintln!("    export OPENAI_API_KEY='sk-...'            (for OpenAI direct)");
        eprintln!("    export FERROAGENT_API_KEY='sk-...'        (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    Ok(config)
}

/// Build an engine with the bundled tools from the loaded configuration.
pub fn build_engine(config: &AppConfig, verbose: bool) -> CommandResult<ConversationEngine> {
    let provider = OpenAiCompatProvider::from_config(config)?;
    let engine_config = EngineConfig::from_app_config(config).with_verbose(config.verbose || verbose);

    Ok(ConversationEngine::new(Arc::new(provider), engine_config)
        .with_tools(ferroagent_tools::default_registry()))
}
