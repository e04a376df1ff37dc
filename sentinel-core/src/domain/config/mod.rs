// sentinel-core/src/domain/config/mod.rs

pub mod overwrite;
pub mod resolve;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::domain::filter::{FilterSpec, Scalar};

/// Supported check types, keyed by their configuration name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckType {
    NullRatioCheck,
    RegexMatchCheck,
    ValuesInSetCheck,
    RollingValuesInSetCheck,
    DuplicateCheck,
    CountCheck,
    AverageCheck,
    MaxCheck,
    MinCheck,
    OccurrenceCheck,
    MatchRateCheck,
    RelCountChangeCheck,
    IqrOutlierCheck,
}

/// How the partition label of a result row is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierFormat {
    /// Column `IDENTIFIER`, value `"{column}={value}"`.
    #[default]
    Identifier,
    /// Column named after the identifier filter's name (uppercased).
    FilterName,
    /// Column named after the identifier filter's column (uppercased).
    ColumnName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxOrMin {
    Max,
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IqrSide {
    Both,
    Upper,
    Lower,
}

/// `value_set` accepts a single scalar or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSet {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl ValueSet {
    /// Deduplicated, sorted rendering for deterministic SQL.
    pub fn normalized(&self) -> Vec<Scalar> {
        let items = match self {
            ValueSet::One(s) => vec![s.clone()],
            ValueSet::Many(v) => v.clone(),
        };
        let mut rendered: Vec<(String, Scalar)> =
            items.into_iter().map(|s| (s.render(), s)).collect();
        rendered.sort_by(|a, b| a.0.cmp(&b.0));
        rendered.dedup_by(|a, b| a.0 == b.0);
        rendered.into_iter().map(|(_, s)| s).collect()
    }
}

/// Thresholds are plain numbers or the strings `infinity` / `-infinity`.
fn deserialize_threshold<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => match s.trim().to_lowercase().as_str() {
            "infinity" | "+infinity" | "inf" | "+inf" => Ok(Some(f64::INFINITY)),
            "-infinity" | "-inf" => Ok(Some(f64::NEG_INFINITY)),
            other => Err(serde::de::Error::custom(format!(
                "invalid threshold '{}'",
                other
            ))),
        },
    }
}

fn serialize_threshold<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        None => serializer.serialize_none(),
        Some(v) if v.is_infinite() => {
            serializer.serialize_str(if *v > 0.0 { "infinity" } else { "-infinity" })
        }
        Some(v) => serializer.serialize_f64(*v),
    }
}

/// The union of per-check arguments, every field optional. Scopes each
/// declare a slice; `overlay` builds one new record per level by applying
/// non-null field overrides. Merge order is an explicit, testable pure
/// function, nothing mutates in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_type: Option<CheckType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_column: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_threshold",
        serialize_with = "serialize_threshold",
        skip_serializing_if = "Option::is_none"
    )]
    pub lower_threshold: Option<f64>,
    #[serde(
        default,
        deserialize_with = "deserialize_threshold",
        serialize_with = "serialize_threshold",
        skip_serializing_if = "Option::is_none"
    )]
    pub upper_threshold: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_only: Option<bool>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, FilterSpec>,

    // --- type-specific arguments ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_to_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_set: Option<ValueSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_or_min: Option<MaxOrMin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_columns_left: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_columns_right: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub how: Option<IqrSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iqr_factor: Option<f64>,

    // --- annotations carried into failure messages ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_info: Option<String>,
}

impl CheckArgs {
    /// Scalar fields last-writer-wins; the filter map merges field-wise per
    /// filter name (a name present at both scopes merges per field).
    pub fn overlay(&self, patch: &CheckArgs) -> CheckArgs {
        let mut filters = self.filters.clone();
        for (name, spec) in &patch.filters {
            filters
                .entry(name.clone())
                .and_modify(|base| *base = base.overlay(spec))
                .or_insert_with(|| spec.clone());
        }

        CheckArgs {
            check_type: patch.check_type.or(self.check_type),
            table: patch.table.clone().or_else(|| self.table.clone()),
            left_table: patch.left_table.clone().or_else(|| self.left_table.clone()),
            right_table: patch
                .right_table
                .clone()
                .or_else(|| self.right_table.clone()),
            check_column: patch
                .check_column
                .clone()
                .or_else(|| self.check_column.clone()),
            lower_threshold: patch.lower_threshold.or(self.lower_threshold),
            upper_threshold: patch.upper_threshold.or(self.upper_threshold),
            monitor_only: patch.monitor_only.or(self.monitor_only),
            filters,
            regex_to_match: patch
                .regex_to_match
                .clone()
                .or_else(|| self.regex_to_match.clone()),
            value_set: patch.value_set.clone().or_else(|| self.value_set.clone()),
            distinct: patch.distinct.or(self.distinct),
            max_or_min: patch.max_or_min.or(self.max_or_min),
            join_columns: patch
                .join_columns
                .clone()
                .or_else(|| self.join_columns.clone()),
            join_columns_left: patch
                .join_columns_left
                .clone()
                .or_else(|| self.join_columns_left.clone()),
            join_columns_right: patch
                .join_columns_right
                .clone()
                .or_else(|| self.join_columns_right.clone()),
            rolling_days: patch.rolling_days.or(self.rolling_days),
            interval_days: patch.interval_days.or(self.interval_days),
            how: patch.how.or(self.how),
            iqr_factor: patch.iqr_factor.or(self.iqr_factor),
            extra_info: patch.extra_info.clone().or_else(|| self.extra_info.clone()),
            date_info: patch.date_info.clone().or_else(|| self.date_info.clone()),
        }
    }
}

fn default_placeholder() -> String {
    "ALL".to_string()
}

/// Global defaults: run-level options plus a `CheckArgs` slice that every
/// check inherits through the normal three-level merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,

    #[serde(default)]
    pub identifier_format: IdentifierFormat,

    #[serde(default = "default_placeholder")]
    pub identifier_placeholder: String,

    #[serde(flatten)]
    pub args: CheckArgs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckBundle {
    pub name: String,

    #[serde(default)]
    pub defaults: CheckArgs,

    #[serde(default)]
    pub checks: Vec<CheckArgs>,
}

/// Root configuration tree, pre-merge. The Overwrite Engine mutates this
/// shape; the Default Resolution Engine consumes it read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub name: String,

    /// Free SQL executed once at process start (attaching providers etc.).
    #[serde(default)]
    pub database_setup: String,

    /// Attached database name prefixed onto source tables; empty means the
    /// engine's own catalog.
    #[serde(default)]
    pub database_accessor: String,

    #[serde(default)]
    pub defaults: GlobalDefaults,

    #[serde(default)]
    pub check_bundles: Vec<CheckBundle>,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            result_table: None,
            log_path: None,
            identifier_format: IdentifierFormat::default(),
            identifier_placeholder: default_placeholder(),
            args: CheckArgs::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::filter::{FilterKind, FilterValue};

    #[test]
    fn test_minimal_config_parses() {
        let yaml = r#"
name: test_config
database_setup: ""
database_accessor: memory

defaults:
  monitor_only: true

check_bundles:
  - name: test_bundle
    checks:
      - check_type: CountCheck
        table: test_table
        check_column: id
        lower_threshold: 0
        upper_threshold: 100
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, "test_config");
        assert_eq!(config.defaults.args.monitor_only, Some(true));
        assert_eq!(config.defaults.identifier_placeholder, "ALL");
        let check = &config.check_bundles[0].checks[0];
        assert_eq!(check.check_type, Some(CheckType::CountCheck));
        assert_eq!(check.upper_threshold, Some(100.0));
    }

    #[test]
    fn test_threshold_infinity_strings() {
        let yaml = r#"
check_type: CountCheck
lower_threshold: -infinity
upper_threshold: infinity
"#;
        let args: CheckArgs = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(args.lower_threshold, Some(f64::NEG_INFINITY));
        assert_eq!(args.upper_threshold, Some(f64::INFINITY));
    }

    #[test]
    fn test_overlay_scalar_last_writer_wins() {
        let global = CheckArgs {
            table: Some("t_global".into()),
            lower_threshold: Some(0.0),
            ..CheckArgs::default()
        };
        let bundle = CheckArgs {
            table: Some("t_bundle".into()),
            ..CheckArgs::default()
        };
        let check = CheckArgs {
            lower_threshold: Some(5.0),
            ..CheckArgs::default()
        };

        let merged = global.overlay(&bundle).overlay(&check);
        assert_eq!(merged.table.as_deref(), Some("t_bundle"));
        assert_eq!(merged.lower_threshold, Some(5.0));
    }

    #[test]
    fn test_overlay_merges_filters_field_wise() {
        let global: CheckArgs = serde_yaml::from_str(
            r#"
filters:
  shop_id:
    column: shop_code
    type: identifier
"#,
        )
        .unwrap();
        let check: CheckArgs = serde_yaml::from_str(
            r#"
filters:
  shop_id:
    value: SHOP001
"#,
        )
        .unwrap();

        let merged = global.overlay(&check);
        let f = &merged.filters["shop_id"];
        assert_eq!(f.column.as_deref(), Some("shop_code"));
        assert_eq!(f.kind, Some(FilterKind::Identifier));
        assert!(matches!(f.value, Some(FilterValue::Scalar(_))));
    }

    #[test]
    fn test_value_set_normalization() {
        let set = ValueSet::Many(vec![
            Scalar::Text("toys".into()),
            Scalar::Text("clothing".into()),
            Scalar::Text("toys".into()),
        ]);
        let normalized = set.normalized();
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].render(), "clothing");
        assert_eq!(normalized[1].render(), "toys");

        let single = ValueSet::One(Scalar::Text("toys".into()));
        assert_eq!(single.normalized().len(), 1);
    }

    #[test]
    fn test_global_defaults_flatten_args() {
        let yaml = r#"
result_table: dq.results
identifier_format: filter_name
monitor_only: false
filters:
  partition_date:
    column: DATE
    type: date
"#;
        let defaults: GlobalDefaults = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(defaults.result_table.as_deref(), Some("dq.results"));
        assert_eq!(defaults.identifier_format, IdentifierFormat::FilterName);
        assert_eq!(defaults.args.monitor_only, Some(false));
        assert!(defaults.args.filters.contains_key("partition_date"));
    }
}
