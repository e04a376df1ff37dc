// sentinel/src/commands/validate.rs
//
// USE CASE: Validate a configuration without executing anything. Runs the
// full resolution pass (merge + filter invariants + identifier
// consistency) so every fatal configuration-shape error surfaces here.

use std::path::PathBuf;

use sentinel_core::domain::config::resolve::resolve_run;
use sentinel_core::infrastructure::config::load_config;

use crate::commands::reference_date;

pub fn execute(config_path: PathBuf, as_of: Option<String>) -> anyhow::Result<()> {
    let as_of = reference_date(&as_of)?;

    let outcome = load_config(&config_path)
        .map_err(anyhow::Error::from)
        .and_then(|config| resolve_run(&config, as_of).map_err(anyhow::Error::from));

    match outcome {
        Ok(resolved) => {
            println!(
                "✅ {:?} is valid ({} checks).",
                config_path,
                resolved.checks.len()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ {:?} is invalid: {:#}", config_path, e);
            std::process::exit(1);
        }
    }
}
