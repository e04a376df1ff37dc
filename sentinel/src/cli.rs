// sentinel/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Declarative data-quality checks over an embedded analytical engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🚀 Runs the declared checks and reports results
    Run {
        /// Path to the check configuration file
        #[arg(long)]
        config_path: PathBuf,

        /// Database file for the embedded engine (":memory:" for none)
        #[arg(long, default_value = ":memory:")]
        db_path: String,

        /// Runtime overwrite, dot-path form (repeatable, later wins):
        /// e.g. --set partition_date=2023-06-15
        #[arg(long = "set", value_name = "PATH=VALUE")]
        set: Vec<String>,

        /// Reference date for relative date expressions (default: today)
        #[arg(long)]
        as_of: Option<String>,
    },

    /// ✅ Validates a configuration without executing anything
    Validate {
        /// Path to the check configuration file
        #[arg(long)]
        config_path: PathBuf,

        /// Reference date for relative date expressions (default: today)
        #[arg(long)]
        as_of: Option<String>,
    },

    /// 📄 Prints the parsed configuration (yaml | json)
    Print {
        /// Path to the check configuration file
        #[arg(long)]
        config_path: PathBuf,

        /// Output format: yaml | json
        #[arg(long, default_value = "yaml")]
        format: String,
    },
}
