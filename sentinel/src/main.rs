// sentinel/src/main.rs

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup Logging (Tracing)
    // RUST_LOG=debug sentinel run ... for the details
    // Diagnostics go to stderr so stdout stays a clean data channel
    // (the `print` command serializes config there).
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config_path,
            db_path,
            set,
            as_of,
        } => commands::run::execute(config_path, db_path, set, as_of).await,

        Commands::Validate {
            config_path,
            as_of,
        } => commands::validate::execute(config_path, as_of),

        Commands::Print {
            config_path,
            format,
        } => commands::print::execute(config_path, format),
    }
}
