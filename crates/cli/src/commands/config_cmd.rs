//! `ferroagent config`: Show where the configuration lives and what it contains.

use super::CommandResult;
use ferroagent_config::AppConfig;

pub fn run() -> CommandResult {
    let path = AppConfig::config_path();
    println!("# Config file: {}", path.display());

    match AppConfig::load() {
        Ok(config) => {
            println!("#   status:  {}", if path.exists() { "loaded" } else { "not found, using defaults" });
            println!("#   model:   {}", config.model);
            println!("#   api key: {}", if config.has_api_key() { "set" } else { "missing" });
        }
        Err(e) => println!("#   status:  invalid ({e})"),
    }

    println!();
    print!("{}", AppConfig::default_toml());
    Ok(())
}
