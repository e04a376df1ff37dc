// sentinel-core/src/domain/filter/mod.rs

pub mod predicate;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::error::DomainError;

/// Filter role inside one check. At most one `date` and one `identifier`
/// filter may be active per resolved check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Date,
    Identifier,
    #[default]
    Other,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Date => "date",
            FilterKind::Identifier => "identifier",
            FilterKind::Other => "other",
        }
    }
}

/// One scalar as it appears in configuration or overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Raw rendering, for identifier labels and canonical keys (no SQL quoting).
    pub fn render(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A filter value: an explicit null (IS NULL semantics), a scalar, or a
/// list (IN / NOT IN semantics). Absence of a value is modelled with
/// `Option<FilterValue>` at the field level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Null,
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl FilterValue {
    pub fn is_list(&self) -> bool {
        matches!(self, FilterValue::List(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FilterValue::Null)
    }

    /// Raw rendering for identifier labels and canonical keys.
    pub fn render(&self) -> String {
        match self {
            FilterValue::Null => "null".to_string(),
            FilterValue::Scalar(s) => s.render(),
            FilterValue::List(items) => {
                let parts: Vec<String> = items.iter().map(Scalar::render).collect();
                format!("[{}]", parts.join(","))
            }
        }
    }
}

/// Distinguishes a declared `value: null` (explicit null predicate) from an
/// absent `value` key (field not set at this scope).
fn deserialize_value<'de, D>(deserializer: D) -> Result<Option<FilterValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_yaml::Value::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(Some(FilterValue::Null));
    }
    serde_yaml::from_value(raw)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// One named filter as declared at any of the three scopes. Every field is
/// optional so scopes can each contribute a slice of the final filter; the
/// merge is field-wise (`overlay`), never whole-object replacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<FilterValue>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FilterKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_as_date: Option<bool>,
}

impl FilterSpec {
    /// Field-wise overlay: fields declared on `patch` win, everything else
    /// is kept. This is what lets a global scope fix `column`/`type` while
    /// a check scope supplies only `value`.
    pub fn overlay(&self, patch: &FilterSpec) -> FilterSpec {
        FilterSpec {
            column: patch.column.clone().or_else(|| self.column.clone()),
            value: patch.value.clone().or_else(|| self.value.clone()),
            kind: patch.kind.or(self.kind),
            operator: patch.operator.clone().or_else(|| self.operator.clone()),
            parse_as_date: patch.parse_as_date.or(self.parse_as_date),
        }
    }
}

/// A filter once a check specification is fully resolved. Immutable from
/// here on; the evaluator and the predicate compiler only read it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFilter {
    pub name: String,
    pub column: Option<String>,
    pub value: Option<FilterValue>,
    pub kind: FilterKind,
    pub operator: String,
    /// Set for `date`-kind filters once the value went through the date
    /// resolver; range building for bulk loads starts from here.
    pub resolved_date: Option<NaiveDate>,
}

impl ResolvedFilter {
    /// Naming-only identifier filters label results but contribute no
    /// predicate (column and value both deliberately absent).
    pub fn is_naming_only(&self) -> bool {
        self.kind == FilterKind::Identifier && self.column.is_none() && self.value.is_none()
    }

    /// Operator/value compatibility shared by resolution and overwrites.
    pub fn validate_operator(&self, check: &str) -> Result<(), DomainError> {
        let op = self.operator.to_uppercase();
        let is_membership = op == "IN" || op == "NOT IN";
        match &self.value {
            Some(FilterValue::List(_)) if !is_membership => Err(DomainError::ConfigMerge(format!(
                "filter '{}' of check '{}': list values can only be used with IN/NOT IN, got '{}'",
                self.name, check, self.operator
            ))),
            Some(FilterValue::Null) if !(op == "=" || op == "!=") => {
                Err(DomainError::ConfigMerge(format!(
                    "filter '{}' of check '{}': null values can only be used with = or !=, got '{}'",
                    self.name, check, self.operator
                )))
            }
            Some(v) if is_membership && !v.is_list() => Err(DomainError::ConfigMerge(format!(
                "filter '{}' of check '{}': IN/NOT IN operators require a list value",
                self.name, check
            ))),
            None if is_membership => Err(DomainError::ConfigMerge(format!(
                "filter '{}' of check '{}': IN/NOT IN operators require a list value",
                self.name, check
            ))),
            _ => Ok(()),
        }
    }
}
