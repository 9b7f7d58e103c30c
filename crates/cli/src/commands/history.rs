//! `ferroagent history`: Inspect saved conversations, plus the persistence
//! helpers shared with `chat`.

use super::CommandResult;
use ferroagent_agent::ConversationEngine;
use ferroagent_agent::history::{self, HistoryStats};
use std::path::Path;

pub fn run(file: &Path, stats: bool) -> CommandResult {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let messages = history::validate_json(&value)?;

    if stats {
        let stats: HistoryStats = history::stats(&messages);
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", history::render(&messages));
    }
    Ok(())
}

/// Write the engine's log as a JSON array of messages.
pub fn save_history(engine: &ConversationEngine, path: &Path) -> CommandResult {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(engine.history())?)?;
    tracing::debug!(path = %path.display(), messages = engine.history().len(), "History saved");
    Ok(())
}

/// Replace the engine's log with the one stored at `path`.
pub fn load_history(engine: &mut ConversationEngine, path: &Path) -> CommandResult {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    engine.set_history_json(&value)?;
    tracing::debug!(path = %path.display(), messages = engine.history().len(), "History loaded");
    Ok(())
}
