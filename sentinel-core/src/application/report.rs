// sentinel-core/src/application/report.rs

// Message building and result-sink plumbing around the emitted rows:
// human-readable failure messages, aggregation of missing-data rows (one
// row per table/date with all identifiers joined), and optional appending
// of results to a database table.

use std::collections::BTreeMap;
use tracing::info;

use crate::application::checks::ResultRow;
use crate::application::executor::RunReport;
use crate::domain::config::resolve::ResolvedCheck;
use crate::ports::engine::{EngineError, QueryEngine};

const FLOAT_PRECISION: usize = 4;

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.*}", FLOAT_PRECISION, v),
        None => "NULL".to_string(),
    }
}

/// `"{identifier}: Metric {name} failed on {date} for {table}. Value {v}
/// is not between {lo} and {hi}."` plus the optional annotations.
pub fn failure_message(check: &ResolvedCheck, row: &ResultRow) -> String {
    let date_info = check
        .date_info
        .as_deref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default();
    let extra_info = check
        .extra_info
        .as_deref()
        .map(|e| format!(" {}", e))
        .unwrap_or_default();

    format!(
        "{}: Metric {} failed on {}{} for {}. Value {} is not between {} and {}.{}",
        row.identifier,
        row.metric_name,
        row.date,
        date_info,
        row.table,
        format_value(row.value),
        row.lower_threshold.unwrap_or(f64::NEG_INFINITY),
        row.upper_threshold.unwrap_or(f64::INFINITY),
        extra_info
    )
}

pub fn error_message(check: &ResolvedCheck, error: &str) -> String {
    format!(
        "{}: Metric {} query errored with {}",
        crate::application::checks::identifier_value(check),
        crate::application::checks::metric_name(check),
        error
    )
}

pub fn no_data_message(check: &ResolvedCheck, table: &str) -> String {
    format!(
        "No data in {} on {} for: {}",
        table,
        crate::application::checks::report_date(check),
        crate::application::checks::identifier_value(check)
    )
}

/// Sorted, deduplicated, comma-joined values.
fn aggregate_values(values: &[String]) -> String {
    let mut unique: Vec<String> = values.to_vec();
    unique.sort();
    unique.dedup();
    unique.join(", ")
}

/// Missing-data messages collapse per table/date; a run over many
/// partitions otherwise floods the log with one line per identifier.
pub fn aggregate_messages(messages: &[String]) -> Vec<String> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut other: Vec<String> = Vec::new();

    for message in messages {
        if !message.starts_with("No data") {
            other.push(message.clone());
            continue;
        }
        match message.split_once(':') {
            Some((head, identifier)) => grouped
                .entry(head.to_string())
                .or_default()
                .push(identifier.trim().to_string()),
            None => other.push(message.clone()),
        }
    }

    let mut aggregated: Vec<String> = grouped
        .into_iter()
        .map(|(head, identifiers)| format!("{}: {}", head, aggregate_values(&identifiers)))
        .collect();
    aggregated.extend(other);
    aggregated.sort();
    aggregated
}

/// The run's failure digest: aggregated, sorted, newline-separated.
pub fn failed_checks_message(report: &RunReport) -> String {
    aggregate_messages(&report.messages()).join("\n")
}

/// Aggregates `data_exists` rows per (date, metric, table); all other rows
/// pass through untouched.
pub fn aggregate_rows(rows: &[ResultRow]) -> Vec<ResultRow> {
    let mut grouped: BTreeMap<(String, String, String), Vec<&ResultRow>> = BTreeMap::new();
    let mut other: Vec<ResultRow> = Vec::new();

    for row in rows {
        if row.metric_name == "data_exists" {
            grouped
                .entry((row.date.clone(), row.metric_name.clone(), row.table.clone()))
                .or_default()
                .push(row);
        } else {
            other.push(row.clone());
        }
    }

    let mut aggregated: Vec<ResultRow> = grouped
        .into_values()
        .map(|group| {
            let identifiers: Vec<String> =
                group.iter().map(|r| r.identifier.clone()).collect();
            let mut merged = group[0].clone();
            merged.identifier = aggregate_values(&identifiers);
            merged
        })
        .collect();

    aggregated.append(&mut other);
    aggregated
}

fn sql_text(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn sql_opt_text(value: &Option<String>) -> String {
    value.as_deref().map(sql_text).unwrap_or_else(|| "NULL".to_string())
}

fn sql_number(value: Option<f64>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(v) if v == f64::INFINITY => "'infinity'::DOUBLE".to_string(),
        Some(v) if v == f64::NEG_INFINITY => "'-infinity'::DOUBLE".to_string(),
        Some(v) => v.to_string(),
    }
}

/// Appends the (aggregated) results to `result_table`. `TABLE` and
/// `COLUMN` are reserved words, so every identifier is quoted.
pub async fn persist_results(
    engine: &dyn QueryEngine,
    result_table: &str,
    rows: &[ResultRow],
) -> Result<(), EngineError> {
    if rows.is_empty() {
        info!("no entries in results, nothing persisted");
        return Ok(());
    }

    let identifier_column = rows[0].identifier_column.clone();

    let create = format!(
        "CREATE TABLE IF NOT EXISTS {} (\
\"DATE\" DATE, \
\"METRIC_NAME\" VARCHAR, \
\"TABLE\" VARCHAR, \
\"{id}\" VARCHAR, \
\"COLUMN\" VARCHAR, \
\"VALUE\" DOUBLE, \
\"LOWER_THRESHOLD\" DOUBLE, \
\"UPPER_THRESHOLD\" DOUBLE, \
\"RESULT\" VARCHAR, \
\"INSERT_TIMESTAMP\" TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
        result_table,
        id = identifier_column
    );
    engine.execute(&create).await?;

    let values: Vec<String> = rows
        .iter()
        .map(|row| {
            format!(
                "({}, {}, {}, {}, {}, {}, {}, {}, {})",
                sql_text(&row.date),
                sql_text(&row.metric_name),
                sql_text(&row.table),
                sql_text(&row.identifier),
                sql_opt_text(&row.column),
                sql_number(row.value),
                sql_number(row.lower_threshold),
                sql_number(row.upper_threshold),
                sql_text(row.result.as_str())
            )
        })
        .collect();

    let insert = format!(
        "INSERT INTO {} (\"DATE\", \"METRIC_NAME\", \"TABLE\", \"{}\", \"COLUMN\", \"VALUE\", \"LOWER_THRESHOLD\", \"UPPER_THRESHOLD\", \"RESULT\") VALUES {}",
        result_table,
        identifier_column,
        values.join(", ")
    );
    engine.execute(&insert).await?;

    info!(rows = rows.len(), table = %result_table, "results persisted");
    Ok(())
}
