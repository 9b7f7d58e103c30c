//! `ferroagent run`: Single-message mode.

use super::{CommandResult, build_engine, load_config};

pub async fn run(message: &str, stream: bool, verbose: bool) -> CommandResult {
    let config = load_config()?;
    let mut engine = build_engine(&config, verbose)?;

    if stream {
        engine.events_mut().on_any(|_channel, event| {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
            }
        });
        engine.run_stream(message).await?;
    } else {
        let response = engine.run(message).await?;
        println!("{}", response.content);
    }

    Ok(())
}
