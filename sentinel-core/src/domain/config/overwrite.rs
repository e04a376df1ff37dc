// sentinel-core/src/domain/config/overwrite.rs

// Runtime `path=value` overwrites, applied to the PRE-merge tree so a
// global-scope overwrite still propagates to every check through normal
// default inheritance. The path is parsed once into a typed descriptor and
// applied by pattern matching: the CLI syntax stays stringly, the
// traversal does not.

use tracing::debug;

use crate::domain::config::{CheckArgs, Config, GlobalDefaults, IdentifierFormat};
use crate::domain::error::DomainError;
use crate::domain::filter::{FilterKind, FilterSpec, FilterValue, Scalar};

/// Where an overwrite lands in the declaration hierarchy.
#[derive(Debug, Clone, PartialEq)]
enum Scope {
    Global,
    /// Bundle defaults, or one specific check when an index is present.
    Bundle { name: String, check: Option<usize> },
}

/// What an overwrite addresses inside its scope.
#[derive(Debug, Clone, PartialEq)]
enum Target {
    /// A named scalar field (`monitor_only`, `upper_threshold`, ...).
    Scalar(String),
    /// One field of a named filter. `may_create` is true only for the bare
    /// `filters.<name>=value` convention.
    FilterField {
        filter: String,
        field: FilterField,
        may_create: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterField {
    Column,
    Value,
    Operator,
    Kind,
    ParseAsDate,
}

#[derive(Debug, Clone, PartialEq)]
struct Overwrite {
    scope: Scope,
    target: Target,
    raw: String,
}

/// Applies an ordered sequence of `path=value` overwrites; the later item
/// wins on conflicting paths (sequential application).
pub fn apply(config: &mut Config, items: &[String]) -> Result<(), DomainError> {
    for item in items {
        let overwrite = parse(item)?;
        debug!(item = %item, "applying overwrite");
        apply_one(config, &overwrite)?;
    }
    Ok(())
}

fn parse(item: &str) -> Result<Overwrite, DomainError> {
    let (path, raw) = item
        .split_once('=')
        .ok_or_else(|| DomainError::OverwritePath(format!("'{}' is not of the form path=value", item)))?;

    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(DomainError::OverwritePath(format!("empty segment in '{}'", path)));
    }

    let (scope, rest, explicit_prefix) = match segments.as_slice() {
        ["check_bundles", name, index, rest @ ..] if index.parse::<usize>().is_ok() => (
            Scope::Bundle {
                name: (*name).to_string(),
                check: index.parse().ok(),
            },
            rest,
            true,
        ),
        ["check_bundles", name, rest @ ..] => (
            Scope::Bundle {
                name: (*name).to_string(),
                check: None,
            },
            rest,
            true,
        ),
        ["check_bundles"] => {
            return Err(DomainError::OverwritePath(
                "'check_bundles' needs a bundle name".to_string(),
            ));
        }
        ["defaults", rest @ ..] => (Scope::Global, rest, true),
        rest => (Scope::Global, rest, false),
    };

    let target = match rest {
        [] => {
            return Err(DomainError::OverwritePath(format!(
                "'{}' does not address a field",
                path
            )));
        }
        // Bare name: by convention the value of a filter with that name,
        // unless it names a known scalar field at this scope. Under an
        // explicit `defaults.` prefix an unknown field is a typo, not an
        // invitation to create a filter.
        [single] => {
            if is_known_scalar(single.as_ref()) {
                Target::Scalar((*single).to_string())
            } else if explicit_prefix && matches!(scope, Scope::Global) {
                return Err(DomainError::OverwritePath(format!(
                    "unknown field '{}'",
                    single
                )));
            } else {
                Target::FilterField {
                    filter: (*single).to_string(),
                    field: FilterField::Value,
                    may_create: true,
                }
            }
        }
        ["filters", name] => Target::FilterField {
            filter: (*name).to_string(),
            field: FilterField::Value,
            may_create: true,
        },
        ["filters", name, field] => Target::FilterField {
            filter: (*name).to_string(),
            field: parse_filter_field(field.as_ref())?,
            may_create: false,
        },
        other => {
            return Err(DomainError::OverwritePath(format!(
                "'{}' does not resolve to an addressable field",
                other.join(".")
            )));
        }
    };

    Ok(Overwrite {
        scope,
        target,
        raw: raw.to_string(),
    })
}

fn parse_filter_field(field: &str) -> Result<FilterField, DomainError> {
    match field {
        "column" => Ok(FilterField::Column),
        "value" => Ok(FilterField::Value),
        "operator" => Ok(FilterField::Operator),
        "type" => Ok(FilterField::Kind),
        "parse_as_date" => Ok(FilterField::ParseAsDate),
        other => Err(DomainError::OverwritePath(format!(
            "unknown filter field '{}'",
            other
        ))),
    }
}

const GLOBAL_FIELDS: &[&str] = &[
    "result_table",
    "log_path",
    "identifier_format",
    "identifier_placeholder",
];

const ARG_FIELDS: &[&str] = &[
    "check_type",
    "table",
    "left_table",
    "right_table",
    "check_column",
    "lower_threshold",
    "upper_threshold",
    "monitor_only",
    "regex_to_match",
    "distinct",
    "max_or_min",
    "rolling_days",
    "interval_days",
    "how",
    "iqr_factor",
    "extra_info",
    "date_info",
];

fn is_known_scalar(field: &str) -> bool {
    GLOBAL_FIELDS.contains(&field) || ARG_FIELDS.contains(&field)
}

fn apply_one(config: &mut Config, overwrite: &Overwrite) -> Result<(), DomainError> {
    match &overwrite.scope {
        Scope::Global => match &overwrite.target {
            Target::Scalar(field) => set_global_scalar(&mut config.defaults, field, &overwrite.raw),
            Target::FilterField {
                filter,
                field,
                may_create,
            } => set_filter_field(
                &mut config.defaults.args,
                filter,
                *field,
                *may_create,
                &overwrite.raw,
            ),
        },
        Scope::Bundle { name, check } => {
            let bundle = config
                .check_bundles
                .iter_mut()
                .find(|b| &b.name == name)
                .ok_or_else(|| {
                    DomainError::OverwritePath(format!("unknown bundle '{}'", name))
                })?;

            let args = match check {
                None => &mut bundle.defaults,
                Some(index) => bundle.checks.get_mut(*index).ok_or_else(|| {
                    DomainError::OverwritePath(format!(
                        "bundle '{}' has no check at index {}",
                        name, index
                    ))
                })?,
            };

            match &overwrite.target {
                Target::Scalar(field) => set_arg_scalar(args, field, &overwrite.raw),
                Target::FilterField {
                    filter,
                    field,
                    may_create,
                } => set_filter_field(args, filter, *field, *may_create, &overwrite.raw),
            }
        }
    }
}

/// `parse_arg` typing: booleans and numbers are recognized, everything else
/// stays a string.
fn parse_scalar(raw: &str) -> Scalar {
    match raw.to_lowercase().as_str() {
        "true" => return Scalar::Bool(true),
        "false" => return Scalar::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Scalar::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Scalar::Float(f);
    }
    Scalar::Text(raw.to_string())
}

fn parse_bool(field: &str, raw: &str) -> Result<bool, DomainError> {
    match parse_scalar(raw) {
        Scalar::Bool(b) => Ok(b),
        _ => Err(DomainError::OverwritePath(format!(
            "field '{}' expects true/false, got '{}'",
            field, raw
        ))),
    }
}

fn parse_f64(field: &str, raw: &str) -> Result<f64, DomainError> {
    match raw.trim().to_lowercase().as_str() {
        "infinity" | "+infinity" | "inf" | "+inf" => return Ok(f64::INFINITY),
        "-infinity" | "-inf" => return Ok(f64::NEG_INFINITY),
        _ => {}
    }
    raw.parse().map_err(|_| {
        DomainError::OverwritePath(format!("field '{}' expects a number, got '{}'", field, raw))
    })
}

fn parse_u32(field: &str, raw: &str) -> Result<u32, DomainError> {
    raw.parse().map_err(|_| {
        DomainError::OverwritePath(format!(
            "field '{}' expects a positive integer, got '{}'",
            field, raw
        ))
    })
}

fn parse_enum<T: serde::de::DeserializeOwned>(field: &str, raw: &str) -> Result<T, DomainError> {
    serde_yaml::from_str(raw).map_err(|_| {
        DomainError::OverwritePath(format!("invalid value '{}' for field '{}'", raw, field))
    })
}

fn set_global_scalar(
    defaults: &mut GlobalDefaults,
    field: &str,
    raw: &str,
) -> Result<(), DomainError> {
    match field {
        "result_table" => defaults.result_table = Some(raw.to_string()),
        "log_path" => defaults.log_path = Some(raw.to_string()),
        "identifier_format" => {
            defaults.identifier_format = parse_enum::<IdentifierFormat>(field, raw)?;
        }
        "identifier_placeholder" => defaults.identifier_placeholder = raw.to_string(),
        _ => return set_arg_scalar(&mut defaults.args, field, raw),
    }
    Ok(())
}

fn set_arg_scalar(args: &mut CheckArgs, field: &str, raw: &str) -> Result<(), DomainError> {
    match field {
        "check_type" => args.check_type = Some(parse_enum(field, raw)?),
        "table" => args.table = Some(raw.to_string()),
        "left_table" => args.left_table = Some(raw.to_string()),
        "right_table" => args.right_table = Some(raw.to_string()),
        "check_column" => args.check_column = Some(raw.to_string()),
        "lower_threshold" => args.lower_threshold = Some(parse_f64(field, raw)?),
        "upper_threshold" => args.upper_threshold = Some(parse_f64(field, raw)?),
        "monitor_only" => args.monitor_only = Some(parse_bool(field, raw)?),
        "regex_to_match" => args.regex_to_match = Some(raw.to_string()),
        "distinct" => args.distinct = Some(parse_bool(field, raw)?),
        "max_or_min" => args.max_or_min = Some(parse_enum(field, raw)?),
        "rolling_days" => args.rolling_days = Some(parse_u32(field, raw)?),
        "interval_days" => args.interval_days = Some(parse_u32(field, raw)?),
        "how" => args.how = Some(parse_enum(field, raw)?),
        "iqr_factor" => args.iqr_factor = Some(parse_f64(field, raw)?),
        "extra_info" => args.extra_info = Some(raw.to_string()),
        "date_info" => args.date_info = Some(raw.to_string()),
        other => {
            return Err(DomainError::OverwritePath(format!(
                "unknown field '{}'",
                other
            )));
        }
    }
    Ok(())
}

fn set_filter_field(
    args: &mut CheckArgs,
    name: &str,
    field: FilterField,
    may_create: bool,
    raw: &str,
) -> Result<(), DomainError> {
    if !args.filters.contains_key(name) && !may_create {
        return Err(DomainError::OverwritePath(format!(
            "unknown filter '{}' (only the bare 'filters.{}=value' form may create one)",
            name, name
        )));
    }

    let spec = args
        .filters
        .entry(name.to_string())
        .or_insert_with(FilterSpec::default);

    match field {
        FilterField::Column => spec.column = Some(raw.to_string()),
        FilterField::Value => spec.value = Some(FilterValue::Scalar(parse_scalar(raw))),
        FilterField::Operator => spec.operator = Some(raw.to_string()),
        FilterField::Kind => spec.kind = Some(parse_enum::<FilterKind>("type", raw)?),
        FilterField::ParseAsDate => spec.parse_as_date = Some(parse_bool("parse_as_date", raw)?),
    }
    Ok(())
}
