//! `ferroagent chat`: Interactive conversation.

use super::history::{load_history, save_history};
use super::{CommandResult, build_engine, load_config};
use ferroagent_agent::ConversationEngine;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
  /exit, /quit      Leave the chat
  /reset            Clear the conversation (keeps the system prompt)
  /history          Print the conversation so far
  /tools            List the registered tools
  /verbose on|off   Toggle reasoning logs
  /help             Show this help";

enum Flow {
    Continue,
    Exit,
}

pub async fn run(history_file: Option<PathBuf>, verbose: bool) -> CommandResult {
    let config = load_config()?;
    let mut engine = build_engine(&config, verbose)?;

    if let Some(path) = history_file.as_deref().filter(|p| p.exists()) {
        load_history(&mut engine, path)?;
    }

    println!();
    println!("  FerroAgent: Interactive Mode");
    println!();
    println!("  Model:     {}", config.model);
    println!("  Tools:     {}", engine.tools().names().join(", "));
    if let Some(path) = &history_file {
        println!("  History:   {} ({} messages)", path.display(), engine.history().len());
    }
    println!();
    println!("  Type your message and press Enter, /help for commands.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            match handle_command(&mut engine, input) {
                Flow::Continue => continue,
                Flow::Exit => break,
            }
        }

        eprint!("  ...");
        match engine.run(input).await {
            Ok(response) => {
                eprint!("\r     \r");
                println!();
                for line in response.content.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }

        if let Some(path) = &history_file {
            persist(&engine, path);
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn handle_command(engine: &mut ConversationEngine, input: &str) -> Flow {
    let mut parts = input.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let argument = parts.next();

    match command {
        "/exit" | "/quit" => return Flow::Exit,
        "/reset" => {
            engine.reset();
            println!("  Conversation cleared.");
        }
        "/history" => println!("{}", engine.readable_history()),
        "/tools" => {
            for name in engine.tools().names() {
                println!("  - {name}");
            }
        }
        "/verbose" => match argument {
            Some("on") => engine.set_verbose(true),
            Some("off") => engine.set_verbose(false),
            _ => println!("  Verbose is {}", if engine.is_verbose() { "on" } else { "off" }),
        },
        "/help" => println!("{HELP}"),
        other => println!("  Unknown command {other}, try /help"),
    }
    println!();
    Flow::Continue
}

fn persist(engine: &ConversationEngine, path: &Path) {
    if let Err(e) = save_history(engine, path) {
        eprintln!("  [Error] Failed to save history: {e}");
    }
}
