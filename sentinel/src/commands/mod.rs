// sentinel/src/commands/mod.rs

pub mod print;
pub mod run;
pub mod validate;

use anyhow::Context;
use chrono::NaiveDate;

/// The run's reference date: today, unless --as-of pins it (any expression
/// the date resolver accepts, so "yesterday" works too).
pub(crate) fn reference_date(as_of: &Option<String>) -> anyhow::Result<NaiveDate> {
    let today = chrono::Utc::now().date_naive();
    match as_of {
        None => Ok(today),
        Some(expr) => sentinel_core::domain::dates::resolve(expr, today)
            .with_context(|| format!("invalid --as-of value '{}'", expr)),
    }
}
