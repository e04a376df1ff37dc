// sentinel/src/commands/print.rs
//
// USE CASE: Print the parsed configuration back out (yaml | json).

use std::path::PathBuf;

use anyhow::bail;
use sentinel_core::infrastructure::config::load_config;

pub fn execute(config_path: PathBuf, format: String) -> anyhow::Result<()> {
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {:?} is invalid: {:#}", config_path, e);
            std::process::exit(1);
        }
    };

    match format.as_str() {
        "yaml" => print!("{}", serde_yaml::to_string(&config)?),
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        other => bail!("unknown format '{}' (expected yaml or json)", other),
    }
    Ok(())
}
