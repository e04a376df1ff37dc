// sentinel-core/src/domain/dates.rs

use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

use crate::domain::error::DomainError;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| {
        Regex::new(r"^(today|yesterday|tomorrow)([+-][0-9]+)?$").expect("static regex")
    })
}

/// Resolves a date expression against an injected reference date.
///
/// Accepted forms: ISO `YYYY-MM-DD`, compact `YYYYMMDD`, the relative
/// tokens `today` / `yesterday` / `tomorrow`, and a token with an inline
/// signed day offset (`yesterday-2`, `today+3`). The offset applies after
/// the token resolves. Pure function of its two inputs: `as_of` is the
/// only clock reference, which keeps runs deterministic and testable.
pub fn resolve(expr: &str, as_of: NaiveDate) -> Result<NaiveDate, DomainError> {
    resolve_with_offset(expr, as_of, 0)
}

/// Like [`resolve`], with an additional external day offset that combines
/// with any inline offset. Offsets also apply to absolute dates
/// (`"19901003"` with offset 5 resolves to 1990-10-08).
pub fn resolve_with_offset(
    expr: &str,
    as_of: NaiveDate,
    offset_days: i64,
) -> Result<NaiveDate, DomainError> {
    let expr = expr.trim().to_lowercase();

    if let Some(caps) = token_re().captures(&expr) {
        let base = match &caps[1] {
            "today" => as_of,
            "yesterday" => as_of - Duration::days(1),
            "tomorrow" => as_of + Duration::days(1),
            _ => unreachable!("regex restricts tokens"),
        };
        let inline: i64 = caps
            .get(2)
            .map(|m| m.as_str().parse())
            .transpose()
            .map_err(|_| DomainError::DateParse(expr.clone()))?
            .unwrap_or(0);
        return Ok(base + Duration::days(inline + offset_days));
    }

    let parsed = NaiveDate::parse_from_str(&expr, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&expr, "%Y%m%d"))
        .map_err(|_| DomainError::DateParse(expr.clone()))?;

    Ok(parsed + Duration::days(offset_days))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_resolve_tokens() {
        let as_of = d(2024, 1, 15);
        assert_eq!(resolve("today", as_of).unwrap(), d(2024, 1, 15));
        assert_eq!(resolve("yesterday", as_of).unwrap(), d(2024, 1, 14));
        assert_eq!(resolve("tomorrow", as_of).unwrap(), d(2024, 1, 16));
        // tokens are case-insensitive
        assert_eq!(resolve("Yesterday", as_of).unwrap(), d(2024, 1, 14));
    }

    #[test]
    fn test_resolve_inline_offsets() {
        let as_of = d(2024, 1, 15);
        assert_eq!(resolve("yesterday-2", as_of).unwrap(), d(2024, 1, 13));
        assert_eq!(resolve("today+3", as_of).unwrap(), d(2024, 1, 18));
        assert_eq!(resolve("tomorrow-1", as_of).unwrap(), d(2024, 1, 15));
    }

    #[test]
    fn test_resolve_absolute_dates() {
        let as_of = d(1999, 12, 31); // must be ignored
        assert_eq!(resolve("2024-01-01", as_of).unwrap(), d(2024, 1, 1));
        assert_eq!(resolve("19901003", as_of).unwrap(), d(1990, 10, 3));
    }

    #[test]
    fn test_resolve_with_external_offset() {
        let as_of = d(2024, 1, 15);
        assert_eq!(
            resolve_with_offset("yesterday", as_of, -2).unwrap(),
            d(2024, 1, 12)
        );
        assert_eq!(
            resolve_with_offset("19901003", as_of, 5).unwrap(),
            d(1990, 10, 8)
        );
        // inline and external offsets combine
        assert_eq!(
            resolve_with_offset("today+1", as_of, 1).unwrap(),
            d(2024, 1, 17)
        );
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        let as_of = d(2024, 1, 15);
        assert!(matches!(
            resolve("last_tuesday", as_of),
            Err(DomainError::DateParse(_))
        ));
        assert!(matches!(
            resolve("2024-13-45", as_of),
            Err(DomainError::DateParse(_))
        ));
        assert!(matches!(resolve("", as_of), Err(DomainError::DateParse(_))));
    }
}
