// sentinel/src/commands/run.rs
//
// USE CASE: Run the declared checks.

use std::path::PathBuf;

use anyhow::Context;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Table};
use sentinel_core::application::report::{
    aggregate_rows, failed_checks_message, persist_results,
};
use sentinel_core::application::{CheckExecutor, CheckStatus, ResultRow, RunReport};
use sentinel_core::domain::config::overwrite;
use sentinel_core::domain::config::resolve::resolve_run;
use sentinel_core::infrastructure::adapters::duckdb::DuckDbEngine;
use sentinel_core::infrastructure::config::load_config;

use crate::commands::reference_date;

pub async fn execute(
    config_path: PathBuf,
    db_path: String,
    set: Vec<String>,
    as_of: Option<String>,
) -> anyhow::Result<()> {
    let start = std::time::Instant::now();

    // A. Load the declaration tree (Infra)
    println!("⚙️  Loading configuration...");
    let mut config = load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;
    println!("   Suite: {}", config.name);

    // B. Overwrites land on the pre-merge tree, then everything resolves.
    overwrite::apply(&mut config, &set).context("Invalid overwrite")?;
    let as_of = reference_date(&as_of)?;
    let resolved = resolve_run(&config, as_of).context("Configuration is invalid")?;
    println!("   Checks: {}", resolved.checks.len());

    // C. Engine + setup SQL, then the sequential run.
    let engine = DuckDbEngine::new(&db_path)
        .with_context(|| format!("Failed to initialize DuckDB at {}", db_path))?;
    let mut executor = CheckExecutor::new(&engine, config.database_accessor.clone());
    executor
        .run_setup(&config.database_setup)
        .await
        .context("database_setup failed")?;

    let report = executor.run(&resolved).await;

    render_results(&report);

    // D. Result sinks (table + log file), only when configured.
    if let Some(result_table) = &resolved.options.result_table {
        let rows: Vec<ResultRow> = report.rows().cloned().collect();
        persist_results(&engine, result_table, &aggregate_rows(&rows))
            .await
            .with_context(|| format!("Could not persist results to {}", result_table))?;
    }

    if let Some(log_path) = &resolved.options.log_path {
        let message = failed_checks_message(&report);
        if message.is_empty() {
            println!("   No failed checks, no log file written.");
        } else {
            std::fs::write(log_path, &message)
                .with_context(|| format!("Could not write log file {}", log_path))?;
            println!("   Failure log written to {}", log_path);
        }
    }

    if report.run_failed {
        eprintln!("\n❌ FAILURE. Finished in {:.2?}", start.elapsed());
        std::process::exit(1);
    }
    println!("\n✨ SUCCESS! Finished in {:.2?}", start.elapsed());
    Ok(())
}

fn render_results(report: &RunReport) {
    let identifier_header = report
        .outcomes
        .first()
        .map(|o| o.row.identifier_column.clone())
        .unwrap_or_else(|| "IDENTIFIER".to_string());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_header(vec![
        "DATE",
        "METRIC_NAME",
        identifier_header.as_str(),
        "TABLE",
        "COLUMN",
        "VALUE",
        "LOWER",
        "UPPER",
        "RESULT",
    ]);

    for row in report.rows() {
        table.add_row(vec![
            Cell::new(&row.date),
            Cell::new(&row.metric_name),
            Cell::new(&row.identifier),
            Cell::new(&row.table),
            Cell::new(row.column.as_deref().unwrap_or("-")),
            Cell::new(
                row.value
                    .map(|v| format!("{:.4}", v))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(fmt_bound(row.lower_threshold)),
            Cell::new(fmt_bound(row.upper_threshold)),
            Cell::new(row.result.as_str()),
        ]);
    }

    println!("{table}");

    let failed = report
        .rows()
        .filter(|r| matches!(r.result, CheckStatus::Fail | CheckStatus::Error))
        .count();
    println!(
        "   {} checks, {} failed or errored",
        report.outcomes.len(),
        failed
    );
}

fn fmt_bound(bound: Option<f64>) -> String {
    match bound {
        None => "-".to_string(),
        Some(v) if v == f64::INFINITY => "inf".to_string(),
        Some(v) if v == f64::NEG_INFINITY => "-inf".to_string(),
        Some(v) => format!("{}", v),
    }
}
