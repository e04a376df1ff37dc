// sentinel-core/src/application/checks.rs

// The check evaluator: one measurement strategy per check type, each
// assembling a single SQL statement against the bulk-loaded working copy
// and classifying the scalar it reads back. Queries reference flattened
// column aliases; result rows report the original dotted column.

use chrono::Duration;

use crate::domain::config::resolve::ResolvedCheck;
use crate::domain::config::{CheckType, IdentifierFormat, IqrSide, MaxOrMin};
use crate::domain::filter::predicate::{
    conjunction, flatten_alias, scalar_literal, ColumnMode,
};
use crate::domain::filter::{FilterKind, ResolvedFilter};
use crate::application::dataset::working_table_ref;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Success,
    Fail,
    MonitorOnly,
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Success => "SUCCESS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::MonitorOnly => "MONITOR_ONLY",
            CheckStatus::Error => "ERROR",
        }
    }
}

/// One emitted result. Created once per evaluated check, never mutated
/// after emission.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub date: String,
    pub metric_name: String,
    /// Name of the identifier field, per `identifier_format`.
    pub identifier_column: String,
    pub identifier: String,
    pub table: String,
    pub column: Option<String>,
    pub value: Option<f64>,
    pub lower_threshold: Option<f64>,
    pub upper_threshold: Option<f64>,
    pub result: CheckStatus,
}

/// Last segment of a dotted column; metric names never carry struct paths.
fn column_stem(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

pub fn metric_name(check: &ResolvedCheck) -> String {
    let stem = column_stem(&check.check_column);
    match check.check_type {
        CheckType::NullRatioCheck => format!("{}_null_ratio", stem),
        CheckType::RegexMatchCheck => format!("{}_regex_match_ratio", stem),
        CheckType::ValuesInSetCheck => format!("{}_values_in_set_ratio", stem),
        CheckType::RollingValuesInSetCheck => format!("{}_rolling_values_in_set_ratio", stem),
        CheckType::DuplicateCheck => format!("{}_duplicates", stem),
        CheckType::CountCheck => {
            if check.check_column == "*" {
                "row_count".to_string()
            } else if check.distinct {
                format!("{}_distinct_count", stem)
            } else {
                format!("{}_count", stem)
            }
        }
        CheckType::AverageCheck => format!("{}_average", stem),
        CheckType::MaxCheck => format!("{}_max", stem),
        CheckType::MinCheck => format!("{}_min", stem),
        CheckType::OccurrenceCheck => {
            let side = match check.max_or_min {
                Some(MaxOrMin::Min) => "min",
                _ => "max",
            };
            format!("{}_occurrence_{}", stem, side)
        }
        CheckType::MatchRateCheck => format!("{}_matchrate", stem),
        CheckType::RelCountChangeCheck => format!("{}_count_change", stem),
        CheckType::IqrOutlierCheck => {
            let side = match check.how {
                IqrSide::Both => "both",
                IqrSide::Upper => "upper",
                IqrSide::Lower => "lower",
            };
            format!(
                "{}_outlier_iqr_{}_{}",
                stem,
                side,
                check.iqr_factor.to_string().replace('.', "_")
            )
        }
    }
}

/// The as-of date reported on result rows: the date filter's resolved
/// value when there is one, the injected run date otherwise.
pub fn report_date(check: &ResolvedCheck) -> String {
    check
        .date_filter()
        .and_then(|f| f.resolved_date)
        .unwrap_or(check.as_of)
        .to_string()
}

/// Table reference reported on result rows (join checks report the pair).
pub fn report_table(check: &ResolvedCheck) -> String {
    if check.check_type == CheckType::MatchRateCheck {
        format!(
            "{}_JOIN_{}",
            check.left_table.as_deref().unwrap_or_default(),
            check.right_table.as_deref().unwrap_or_default()
        )
    } else {
        check.table.clone().unwrap_or_default()
    }
}

// --- IDENTIFIER NAMING ---

pub fn identifier_column(check: &ResolvedCheck) -> String {
    let filter = check.identifier_filter();
    match check.identifier_format {
        IdentifierFormat::Identifier => "IDENTIFIER".to_string(),
        IdentifierFormat::FilterName => filter
            .map(|f| f.name.to_uppercase())
            .unwrap_or_else(|| "IDENTIFIER".to_string()),
        IdentifierFormat::ColumnName => filter
            .map(|f| {
                f.column
                    .as_deref()
                    .map(str::to_uppercase)
                    .unwrap_or_else(|| f.name.to_uppercase())
            })
            .unwrap_or_else(|| "IDENTIFIER".to_string()),
    }
}

pub fn identifier_value(check: &ResolvedCheck) -> String {
    let placeholder = check.identifier_placeholder.as_str();
    let Some(filter) = check.identifier_filter() else {
        return placeholder.to_string();
    };
    let value = filter
        .value
        .as_ref()
        .map(|v| v.render())
        .unwrap_or_else(|| placeholder.to_string());

    match check.identifier_format {
        IdentifierFormat::Identifier => match &filter.column {
            // the reported column keeps its original dotted form
            Some(column) if filter.value.is_some() => format!("{}={}", column, value),
            _ => value,
        },
        IdentifierFormat::FilterName | IdentifierFormat::ColumnName => value,
    }
}

// --- CLASSIFICATION ---

/// Thresholds are not enforced for monitor-only checks; a missing value
/// fails (existence probes catch most empty slices before this point).
pub fn classify_bounds(
    monitor_only: bool,
    value: Option<f64>,
    lower: f64,
    upper: f64,
) -> CheckStatus {
    if monitor_only {
        return CheckStatus::MonitorOnly;
    }
    match value {
        Some(v) if lower <= v && v <= upper => CheckStatus::Success,
        _ => CheckStatus::Fail,
    }
}

/// Classification against the check's own static thresholds. IQR checks
/// swap in their dynamically computed bounds at the executor level.
pub fn classify(check: &ResolvedCheck, value: Option<f64>) -> CheckStatus {
    classify_bounds(
        check.monitor_only,
        value,
        check.lower_threshold,
        check.upper_threshold,
    )
}

// --- QUERY ASSEMBLY ---

fn rolling_strategy(check_type: CheckType) -> bool {
    matches!(
        check_type,
        CheckType::RollingValuesInSetCheck
            | CheckType::RelCountChangeCheck
            | CheckType::IqrOutlierCheck
    )
}

/// Rolling strategies cannot run without an as-of date; the executor turns
/// this into a per-check ERROR row rather than aborting the run.
pub fn requires_date_filter(check: &ResolvedCheck) -> bool {
    rolling_strategy(check.check_type)
}

fn non_date_filters(check: &ResolvedCheck) -> impl Iterator<Item = &ResolvedFilter> {
    check.filters.values().filter(|f| f.kind != FilterKind::Date)
}

fn where_suffix(predicate: Option<String>) -> String {
    predicate.map(|p| format!(" WHERE {}", p)).unwrap_or_default()
}

fn all_filters_where(check: &ResolvedCheck) -> String {
    where_suffix(conjunction(check.filters.values(), ColumnMode::WorkingCopy))
}

fn value_set_literal(check: &ResolvedCheck) -> String {
    let parts: Vec<String> = check.value_set.iter().map(scalar_literal).collect();
    format!("({})", parts.join(", "))
}

fn escaped(text: &str) -> String {
    text.replace('\'', "''")
}

/// The measurement statement for one resolved check. Column references use
/// the flattened working-copy aliases throughout.
pub fn assemble_query(check: &ResolvedCheck) -> Result<String, String> {
    let name = metric_name(check);
    let table = working_table_ref(check.table.as_deref().unwrap_or_default());
    let column = if check.check_column == "*" {
        "*".to_string()
    } else {
        flatten_alias(&check.check_column)
    };

    let query = match check.check_type {
        CheckType::NullRatioCheck => format!(
            "SELECT CASE WHEN COUNT(*) = 0 THEN 0.0 ELSE COUNT(CASE WHEN {col} IS NULL THEN 1 END) * 1.0 / COUNT(*) END AS {name} FROM {table}{filter_sql}",
            col = column,
            name = name,
            table = table,
            filter_sql = all_filters_where(check)
        ),
        CheckType::RegexMatchCheck => format!(
            "SELECT AVG(CASE WHEN regexp_matches(CAST({col} AS VARCHAR), '{re}') THEN 1 ELSE 0 END) AS {name} FROM {table}{filter_sql}",
            col = column,
            re = escaped(check.regex_to_match.as_deref().unwrap_or_default()),
            name = name,
            table = table,
            filter_sql = all_filters_where(check)
        ),
        CheckType::ValuesInSetCheck => format!(
            "SELECT AVG(CASE WHEN {col} IN {set} THEN 1 ELSE 0 END) AS {name} FROM {table}{filter_sql}",
            col = column,
            set = value_set_literal(check),
            name = name,
            table = table,
            filter_sql = all_filters_where(check)
        ),
        CheckType::DuplicateCheck => format!(
            "SELECT COUNT(*) - COUNT(DISTINCT {col}) AS {name} FROM {table}{filter_sql}",
            col = column,
            name = name,
            table = table,
            filter_sql = all_filters_where(check)
        ),
        CheckType::CountCheck => {
            let aggregate = if check.distinct {
                format!("COUNT(DISTINCT {})", column)
            } else {
                format!("COUNT({})", column)
            };
            format!(
                "SELECT {agg} AS {name} FROM {table}{filter_sql}",
                agg = aggregate,
                name = name,
                table = table,
                filter_sql = all_filters_where(check)
            )
        }
        CheckType::AverageCheck | CheckType::MaxCheck | CheckType::MinCheck => {
            let aggregate = match check.check_type {
                CheckType::AverageCheck => "AVG",
                CheckType::MaxCheck => "MAX",
                _ => "MIN",
            };
            format!(
                "SELECT {agg}({col}) AS {name} FROM {table}{filter_sql}",
                agg = aggregate,
                col = column,
                name = name,
                table = table,
                filter_sql = all_filters_where(check)
            )
        }
        CheckType::OccurrenceCheck => {
            let order = match check.max_or_min {
                Some(MaxOrMin::Min) => "ASC",
                _ => "DESC",
            };
            format!(
                "SELECT COUNT(*) AS {name} FROM {table}{filter_sql} GROUP BY {col} ORDER BY {name} {order} LIMIT 1",
                name = name,
                table = table,
                filter_sql = all_filters_where(check),
                col = column,
                order = order
            )
        }
        CheckType::RollingValuesInSetCheck => {
            let (date_column, start, end) = rolling_bounds(check, check.interval_days.into())?;
            let mut predicate = format!(
                "{} BETWEEN '{}' AND '{}'",
                date_column, start, end
            );
            if let Some(rest) = conjunction(non_date_filters(check), ColumnMode::WorkingCopy) {
                predicate.push_str(&format!(" AND {}", rest));
            }
            format!(
                "SELECT AVG(CASE WHEN {col} IN {set} THEN 1 ELSE 0 END) AS {name} FROM {table} WHERE {predicate}",
                col = column,
                set = value_set_literal(check),
                name = name,
                table = table,
                predicate = predicate
            )
        }
        CheckType::MatchRateCheck => assemble_match_rate(check, &name)?,
        CheckType::RelCountChangeCheck => assemble_rel_count_change(check, &name, &column)?,
        CheckType::IqrOutlierCheck => assemble_iqr_outlier(check, &name, &column)?,
    };

    Ok(query)
}

fn rolling_bounds(
    check: &ResolvedCheck,
    window_days: i64,
) -> Result<(String, String, String), String> {
    let filter = check
        .date_filter()
        .ok_or_else(|| "required date filter is missing for a rolling check".to_string())?;
    let end = filter
        .resolved_date
        .ok_or_else(|| "date filter has no resolved value".to_string())?;
    let column = filter
        .column
        .clone()
        .ok_or_else(|| "date filter has no column".to_string())?;
    let start = end - Duration::days(window_days);
    Ok((
        flatten_alias(&column),
        start.to_string(),
        end.to_string(),
    ))
}

fn assemble_match_rate(check: &ResolvedCheck, name: &str) -> Result<String, String> {
    let left = working_table_ref(check.left_table.as_deref().unwrap_or_default());
    let right = working_table_ref(check.right_table.as_deref().unwrap_or_default());
    let side_filter_sql = all_filters_where(check);

    let right_columns: Vec<String> = check
        .join_columns_right
        .iter()
        .map(|c| flatten_alias(c))
        .collect();

    let join_on: Vec<String> = check
        .join_columns_left
        .iter()
        .zip(check.join_columns_right.iter())
        .map(|(l, r)| format!("lefty.{} = righty.{}", flatten_alias(l), flatten_alias(r)))
        .collect();

    Ok(format!(
        "WITH righty AS (SELECT DISTINCT {right_cols}, TRUE AS in_right_table FROM {right}{side_where}), \
lefty AS (SELECT * FROM {left}{side_where}) \
SELECT CASE WHEN COUNT(*) = 0 THEN NULL ELSE ROUND(COUNT(CASE WHEN in_right_table THEN 1 END) * 1.0 / COUNT(*), 3) END AS {name} \
FROM lefty LEFT JOIN righty ON {join_on}",
        right_cols = right_columns.join(", "),
        right = right,
        side_where = side_filter_sql,
        left = left,
        name = name,
        join_on = join_on.join(" AND ")
    ))
}

fn assemble_rel_count_change(
    check: &ResolvedCheck,
    name: &str,
    column: &str,
) -> Result<String, String> {
    let table = working_table_ref(check.table.as_deref().unwrap_or_default());
    let (date_column, start, end) = rolling_bounds(check, check.rolling_days.into())?;
    let history_end = (check
        .date_filter()
        .and_then(|f| f.resolved_date)
        .ok_or_else(|| "date filter has no resolved value".to_string())?
        - Duration::days(1))
    .to_string();

    let mut base_predicate = format!("{} BETWEEN '{}' AND '{}'", date_column, start, end);
    if let Some(rest) = conjunction(non_date_filters(check), ColumnMode::WorkingCopy) {
        base_predicate.push_str(&format!(" AND {}", rest));
    }

    // The current day's count falls back to 0 via the UNION so a day with
    // no rows still yields a comparable value instead of an empty result.
    Ok(format!(
        "WITH base AS (SELECT {date_col}, COUNT(DISTINCT {col}) AS dist_cnt FROM {table} WHERE {base_predicate} GROUP BY {date_col}), \
rolling_avgs AS (SELECT AVG(dist_cnt) AS rolling_avg FROM base WHERE {date_col} BETWEEN '{start}' AND '{history_end}'), \
current_cnt AS (SELECT MAX(dist_cnt) AS dist_cnt FROM (SELECT dist_cnt FROM base WHERE {date_col} = '{end}' UNION ALL SELECT 0 AS dist_cnt)) \
SELECT CASE WHEN rolling_avg IS NULL OR rolling_avg = 0 THEN NULL ELSE ROUND((dist_cnt - rolling_avg) * 1.0 / rolling_avg, 3) END AS {name} \
FROM current_cnt CROSS JOIN rolling_avgs",
        date_col = date_column,
        col = column,
        table = table,
        base_predicate = base_predicate,
        start = start,
        history_end = history_end,
        end = end,
        name = name
    ))
}

fn assemble_iqr_outlier(
    check: &ResolvedCheck,
    name: &str,
    column: &str,
) -> Result<String, String> {
    let table = working_table_ref(check.table.as_deref().unwrap_or_default());
    let (date_column, start, end) = rolling_bounds(check, check.interval_days.into())?;

    let mut raw_predicate = format!("{} BETWEEN '{}' AND '{}'", date_column, start, end);
    if let Some(rest) = conjunction(non_date_filters(check), ColumnMode::WorkingCopy) {
        raw_predicate.push_str(&format!(" AND {}", rest));
    }

    Ok(format!(
        "WITH raw AS (SELECT {date_col}, {col} FROM {table} WHERE {raw_predicate}), \
compare AS (SELECT * FROM raw WHERE {date_col} < '{end}'), \
slice AS (SELECT * FROM raw WHERE {date_col} = '{end}'), \
percentiles AS (SELECT quantile_cont(CAST({col} AS DOUBLE), 0.25) AS q25, quantile_cont(CAST({col} AS DOUBLE), 0.75) AS q75 FROM compare) \
SELECT CAST(slice.{col} AS DOUBLE) AS {name}, \
q25 - {factor} * (q75 - q25) AS lower_threshold, \
q75 + {factor} * (q75 - q25) AS upper_threshold \
FROM slice CROSS JOIN percentiles LIMIT 1",
        date_col = date_column,
        col = column,
        table = table,
        raw_predicate = raw_predicate,
        end = end,
        name = name,
        factor = check.iqr_factor
    ))
}
