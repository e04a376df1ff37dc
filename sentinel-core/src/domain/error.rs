// sentinel-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

/// Configuration-shape errors are fatal to the whole run: they are raised
/// before any check executes. Runtime data failures live in the application
/// layer and are downgraded to per-check ERROR rows instead.
#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Configuration merge error: {0}")]
    #[diagnostic(code(sentinel::domain::config_merge))]
    ConfigMerge(String),

    #[error("Check '{check}' declares more than one '{kind}' filter")]
    #[diagnostic(
        code(sentinel::domain::filter_cardinality),
        help("At most one filter of type 'date' and one of type 'identifier' is allowed per check.")
    )]
    FilterCardinality { check: String, kind: String },

    #[error("Filter '{filter}' of check '{check}' is missing a {missing}")]
    #[diagnostic(
        code(sentinel::domain::filter_incomplete),
        help("Predicate filters need both a column and a value after merging; only identifier filters with neither are allowed (naming-only).")
    )]
    FilterIncomplete {
        check: String,
        filter: String,
        missing: String,
    },

    #[error("Inconsistent identifier naming under identifier_format '{format}': {detail}")]
    #[diagnostic(
        code(sentinel::domain::identifier_consistency),
        help("With identifier_format 'filter_name' or 'column_name', all identifier filters must share the same filter name (resp. column name) across the run.")
    )]
    IdentifierConsistency { format: String, detail: String },

    #[error("Could not parse date expression '{0}'")]
    #[diagnostic(
        code(sentinel::domain::date_parse),
        help("Expected YYYY-MM-DD, YYYYMMDD, today/yesterday/tomorrow, or a token with an inline offset like 'yesterday-2'.")
    )]
    DateParse(String),

    #[error("Overwrite path error: {0}")]
    #[diagnostic(
        code(sentinel::domain::overwrite_path),
        help("Paths must address an existing field; only the bare 'filters.<name>=value' form may create a new filter.")
    )]
    OverwritePath(String),
}
