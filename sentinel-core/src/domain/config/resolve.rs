// sentinel-core/src/domain/config/resolve.rs

// Three-level default resolution: global defaults -> bundle defaults ->
// check declaration, merged as layered overlays over immutable records.
// Resolution is a pure function of (config, as_of); it produces the full
// check list first and only then validates cross-check invariants; the
// identifier-consistency pass needs the whole collection.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::config::{
    CheckArgs, CheckType, Config, IdentifierFormat, IqrSide, MaxOrMin,
};
use crate::domain::dates;
use crate::domain::error::DomainError;
use crate::domain::filter::{FilterKind, FilterSpec, FilterValue, ResolvedFilter, Scalar};

/// Run-level options lifted out of the global defaults.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub result_table: Option<String>,
    pub log_path: Option<String>,
    pub identifier_format: IdentifierFormat,
    pub identifier_placeholder: String,
}

/// A check's fully merged, ready-to-execute argument set. Owned by the
/// resolution engine until handed to the evaluator, which reads only.
#[derive(Debug, Clone)]
pub struct ResolvedCheck {
    pub bundle: String,
    pub index: usize,
    pub check_type: CheckType,

    pub table: Option<String>,
    pub left_table: Option<String>,
    pub right_table: Option<String>,
    pub check_column: String,

    pub filters: BTreeMap<String, ResolvedFilter>,

    pub lower_threshold: f64,
    pub upper_threshold: f64,
    pub monitor_only: bool,

    pub identifier_format: IdentifierFormat,
    pub identifier_placeholder: String,

    pub regex_to_match: Option<String>,
    pub value_set: Vec<Scalar>,
    pub distinct: bool,
    pub max_or_min: Option<MaxOrMin>,
    pub join_columns_left: Vec<String>,
    pub join_columns_right: Vec<String>,
    pub rolling_days: u32,
    pub interval_days: u32,
    pub how: IqrSide,
    pub iqr_factor: f64,

    pub extra_info: Option<String>,
    pub date_info: Option<String>,

    /// The injected reference date, kept for result rows without a date filter.
    pub as_of: NaiveDate,
}

impl ResolvedCheck {
    /// Position label used by configuration errors ("bundle-1[2]").
    pub fn label(&self) -> String {
        format!("{}[{}]", self.bundle, self.index)
    }

    pub fn date_filter(&self) -> Option<&ResolvedFilter> {
        self.filters.values().find(|f| f.kind == FilterKind::Date)
    }

    pub fn identifier_filter(&self) -> Option<&ResolvedFilter> {
        self.filters
            .values()
            .find(|f| f.kind == FilterKind::Identifier)
    }

    /// The table whose emptiness/missingness is reported for this check.
    pub fn primary_table(&self) -> &str {
        self.table
            .as_deref()
            .or(self.left_table.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedRun {
    pub options: RunOptions,
    pub checks: Vec<ResolvedCheck>,
}

/// Resolves every declared check, in declaration order, then validates the
/// cross-check identifier-consistency invariant over the whole collection.
/// No SQL runs here; all configuration-shape errors are fatal.
pub fn resolve_run(config: &Config, as_of: NaiveDate) -> Result<ResolvedRun, DomainError> {
    let options = RunOptions {
        result_table: config.defaults.result_table.clone(),
        log_path: config.defaults.log_path.clone(),
        identifier_format: config.defaults.identifier_format,
        identifier_placeholder: config.defaults.identifier_placeholder.clone(),
    };

    let mut checks = Vec::new();
    for bundle in &config.check_bundles {
        for (index, declared) in bundle.checks.iter().enumerate() {
            let merged = config
                .defaults
                .args
                .overlay(&bundle.defaults)
                .overlay(declared);
            let check = resolve_check(merged, &bundle.name, index, &options, as_of)?;
            debug!(check = %check.label(), check_type = ?check.check_type, "resolved check");
            checks.push(check);
        }
    }

    validate_identifier_consistency(&checks, options.identifier_format)?;

    Ok(ResolvedRun { options, checks })
}

fn resolve_check(
    args: CheckArgs,
    bundle: &str,
    index: usize,
    options: &RunOptions,
    as_of: NaiveDate,
) -> Result<ResolvedCheck, DomainError> {
    let label = format!("{}[{}]", bundle, index);

    let check_type = args
        .check_type
        .ok_or_else(|| DomainError::ConfigMerge(format!("check '{}': missing check_type", label)))?;

    let filters = resolve_filters(&label, &args.filters, as_of)?;
    validate_cardinality(&label, &filters)?;

    let check = ResolvedCheck {
        bundle: bundle.to_string(),
        index,
        check_type,
        table: args.table,
        left_table: args.left_table,
        right_table: args.right_table,
        check_column: args.check_column.unwrap_or_else(|| "*".to_string()),
        filters,
        lower_threshold: args.lower_threshold.unwrap_or(f64::NEG_INFINITY),
        upper_threshold: args.upper_threshold.unwrap_or(f64::INFINITY),
        monitor_only: args.monitor_only.unwrap_or(false),
        identifier_format: options.identifier_format,
        identifier_placeholder: options.identifier_placeholder.clone(),
        regex_to_match: args.regex_to_match,
        value_set: args.value_set.map(|v| v.normalized()).unwrap_or_default(),
        distinct: args.distinct.unwrap_or(false),
        max_or_min: args.max_or_min,
        join_columns_left: args
            .join_columns_left
            .or_else(|| args.join_columns.clone())
            .unwrap_or_default(),
        join_columns_right: args
            .join_columns_right
            .or(args.join_columns)
            .unwrap_or_default(),
        rolling_days: args.rolling_days.unwrap_or(0),
        interval_days: args.interval_days.unwrap_or(14),
        how: args.how.unwrap_or(IqrSide::Both),
        iqr_factor: args.iqr_factor.unwrap_or(1.5),
        extra_info: args.extra_info,
        date_info: args.date_info,
        as_of,
    };

    validate_type_args(&check)?;
    Ok(check)
}

/// Applies per-filter defaults, resolves date expressions, and enforces the
/// operator/value and completeness invariants.
fn resolve_filters(
    label: &str,
    specs: &BTreeMap<String, FilterSpec>,
    as_of: NaiveDate,
) -> Result<BTreeMap<String, ResolvedFilter>, DomainError> {
    let mut resolved = BTreeMap::new();

    for (name, spec) in specs {
        let kind = spec.kind.unwrap_or_default();
        let parse_as_date = spec.parse_as_date.unwrap_or(false);
        let mut value = spec.value.clone();
        let mut resolved_date = None;

        // Date-kind values (and parse_as_date values) go through the date
        // resolver now; a malformed declaration must fail before execution.
        if kind == FilterKind::Date || parse_as_date {
            if let Some(FilterValue::Scalar(scalar)) = &value {
                let date = dates::resolve(&scalar.render(), as_of)?;
                value = Some(FilterValue::Scalar(Scalar::Text(date.to_string())));
                if kind == FilterKind::Date {
                    resolved_date = Some(date);
                }
            }
        }

        let filter = ResolvedFilter {
            name: name.clone(),
            column: spec.column.clone(),
            value,
            kind,
            operator: spec.operator.clone().unwrap_or_else(|| "=".to_string()),
            resolved_date,
        };

        filter.validate_operator(label)?;
        validate_completeness(label, &filter)?;
        resolved.insert(name.clone(), filter);
    }

    Ok(resolved)
}

fn validate_completeness(label: &str, filter: &ResolvedFilter) -> Result<(), DomainError> {
    if filter.is_naming_only() {
        return Ok(());
    }
    if filter.column.is_none() {
        return Err(DomainError::FilterIncomplete {
            check: label.to_string(),
            filter: filter.name.clone(),
            missing: "column".to_string(),
        });
    }
    if filter.value.is_none() {
        return Err(DomainError::FilterIncomplete {
            check: label.to_string(),
            filter: filter.name.clone(),
            missing: "value".to_string(),
        });
    }
    Ok(())
}

fn validate_cardinality(
    label: &str,
    filters: &BTreeMap<String, ResolvedFilter>,
) -> Result<(), DomainError> {
    for kind in [FilterKind::Date, FilterKind::Identifier] {
        let count = filters.values().filter(|f| f.kind == kind).count();
        if count > 1 {
            return Err(DomainError::FilterCardinality {
                check: label.to_string(),
                kind: kind.as_str().to_string(),
            });
        }
    }
    Ok(())
}

/// Per-check-type required arguments, validated after the merge so a value
/// may come from any scope.
fn validate_type_args(check: &ResolvedCheck) -> Result<(), DomainError> {
    let label = check.label();
    let missing = |what: &str| {
        DomainError::ConfigMerge(format!("check '{}': {}", label, what))
    };

    match check.check_type {
        CheckType::MatchRateCheck => {
            if check.left_table.is_none() || check.right_table.is_none() {
                return Err(missing("MatchRateCheck requires left_table and right_table"));
            }
            if check.join_columns_left.is_empty() || check.join_columns_right.is_empty() {
                return Err(missing(
                    "no join columns provided; use join_columns or join_columns_left and join_columns_right",
                ));
            }
            if check.join_columns_left.len() != check.join_columns_right.len() {
                return Err(missing(&format!(
                    "join_columns_left and join_columns_right must have equal length ({} vs. {})",
                    check.join_columns_left.len(),
                    check.join_columns_right.len()
                )));
            }
        }
        _ => {
            if check.table.is_none() {
                return Err(missing("missing table"));
            }
        }
    }

    match check.check_type {
        CheckType::RegexMatchCheck if check.regex_to_match.is_none() => {
            return Err(missing("RegexMatchCheck requires regex_to_match"));
        }
        CheckType::ValuesInSetCheck | CheckType::RollingValuesInSetCheck
            if check.value_set.is_empty() =>
        {
            return Err(missing("value_set must not be empty"));
        }
        CheckType::CountCheck if check.distinct && check.check_column == "*" => {
            return Err(missing(
                "cannot COUNT(DISTINCT *); set check_column or distinct = false",
            ));
        }
        CheckType::OccurrenceCheck if check.max_or_min.is_none() => {
            return Err(missing("OccurrenceCheck requires max_or_min"));
        }
        CheckType::RelCountChangeCheck if check.rolling_days < 1 => {
            return Err(missing("rolling_days must be at least 1"));
        }
        CheckType::IqrOutlierCheck => {
            if check.interval_days < 1 {
                return Err(missing("interval_days must be at least 1"));
            }
            if check.iqr_factor < 1.5 {
                return Err(missing("iqr_factor must be at least 1.5"));
            }
        }
        _ => {}
    }

    Ok(())
}

/// Cross-check pass: under `filter_name` (resp. `column_name`) formats, all
/// identifier filters across the run must agree on the filter name (resp.
/// column name), otherwise the persisted result schema would be ambiguous.
fn validate_identifier_consistency(
    checks: &[ResolvedCheck],
    format: IdentifierFormat,
) -> Result<(), DomainError> {
    let key_of = |check: &ResolvedCheck| -> Option<(String, String)> {
        let filter = check.identifier_filter()?;
        let key = match format {
            IdentifierFormat::Identifier => return None,
            IdentifierFormat::FilterName => filter.name.clone(),
            IdentifierFormat::ColumnName => filter.column.clone().unwrap_or_else(|| filter.name.clone()),
        };
        Some((key, check.label()))
    };

    let keyed: Vec<(String, String)> = checks.iter().filter_map(key_of).collect();
    let Some((first_key, _)) = keyed.first() else {
        return Ok(());
    };

    let offending: Vec<String> = keyed
        .iter()
        .filter(|(key, _)| key != first_key)
        .map(|(key, label)| format!("{} ('{}')", label, key))
        .collect();

    if !offending.is_empty() {
        let what = match format {
            IdentifierFormat::FilterName => "filter name",
            IdentifierFormat::ColumnName => "column name",
            IdentifierFormat::Identifier => unreachable!("identifier format never keys"),
        };
        return Err(DomainError::IdentifierConsistency {
            format: what.to_string(),
            detail: format!(
                "all identifier filters must have the same {} (expected '{}', offending: {})",
                what,
                first_key,
                offending.join(", ")
            ),
        });
    }

    Ok(())
}
