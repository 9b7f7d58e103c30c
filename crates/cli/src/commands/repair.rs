//! `ferroagent repair-json`: Extract a JSON value from free text.
//!
//! Uses the AI pass when a key is configured and repair is enabled,
//! otherwise local heuristics only.

use super::CommandResult;
use ferroagent_agent::{AssistClient, JsonRepairer, RetryPolicy};
use ferroagent_config::AppConfig;
use ferroagent_providers::OpenAiCompatProvider;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

pub async fn run(file: Option<PathBuf>) -> CommandResult {
    let text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let repairer = repairer_for(&config);
    if !repairer.ai_enabled() {
        tracing::debug!("AI repair unavailable, using local heuristics only");
    }

    let value = repairer.extract(&text).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn repairer_for(config: &AppConfig) -> JsonRepairer {
    if !config.json_repair.ai_enabled {
        return JsonRepairer::local();
    }
    match OpenAiCompatProvider::from_config(config) {
        Ok(provider) => JsonRepairer::with_assist(
            AssistClient::new(
                Arc::new(provider),
                &config.json_repair.model,
                config.json_repair.temperature,
            )
            .with_retry(RetryPolicy::from(&config.retry)),
        ),
        Err(_) => JsonRepairer::local(),
    }
}
