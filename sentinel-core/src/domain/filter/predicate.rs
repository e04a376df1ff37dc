// sentinel-core/src/domain/filter/predicate.rs

// Turns resolved filters into SQL boolean predicates. Two naming modes
// exist because of the flattening contract: bulk loads read the *source*
// table (dotted struct columns are still addressable), while check queries
// read the in-memory working copy where dots were flattened to underscore
// aliases. Result rows always report the original dotted column.

use chrono::NaiveDate;

use crate::domain::filter::{FilterKind, FilterValue, ResolvedFilter, Scalar};

/// Column naming target of a generated predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnMode {
    /// The external source table: dotted struct columns used as declared.
    Source,
    /// The in-memory working copy: dots replaced by underscores.
    WorkingCopy,
}

/// Flattened alias under which a dotted column lands in the working copy.
pub fn flatten_alias(column: &str) -> String {
    column.replace('.', "_")
}

pub fn column_ref(column: &str, mode: ColumnMode) -> String {
    match mode {
        ColumnMode::Source => column.to_string(),
        ColumnMode::WorkingCopy => flatten_alias(column),
    }
}

/// SQL literal rendering shared with the evaluator (value sets, patterns).
pub fn scalar_literal(value: &Scalar) -> String {
    match value {
        Scalar::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

fn list_literal(items: &[Scalar]) -> String {
    let parts: Vec<String> = items.iter().map(scalar_literal).collect();
    format!("({})", parts.join(", "))
}

/// One row-level predicate, or `None` for naming-only identifier filters
/// (they label results and never restrict data).
pub fn row_predicate(filter: &ResolvedFilter, mode: ColumnMode) -> Option<String> {
    if filter.is_naming_only() {
        return None;
    }
    let column = column_ref(filter.column.as_deref()?, mode);

    // Date filters compare against the resolved calendar date.
    if filter.kind == FilterKind::Date {
        let date = filter.resolved_date?;
        return Some(format!("{} {} '{}'", column, filter.operator, date));
    }

    let predicate = match filter.value.as_ref()? {
        FilterValue::Null => match filter.operator.as_str() {
            "!=" => format!("{} IS NOT NULL", column),
            _ => format!("{} IS NULL", column),
        },
        FilterValue::List(items) => {
            format!("{} {} {}", column, filter.operator, list_literal(items))
        }
        FilterValue::Scalar(s) => format!("{} {} {}", column, filter.operator, scalar_literal(s)),
    };
    Some(predicate)
}

/// AND-joined predicates over a filter set; `None` when nothing restricts.
pub fn conjunction<'a, I>(filters: I, mode: ColumnMode) -> Option<String>
where
    I: IntoIterator<Item = &'a ResolvedFilter>,
{
    let parts: Vec<String> = filters
        .into_iter()
        .filter_map(|f| row_predicate(f, mode))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

/// One check's date requirement on a table: `[start, end]` inclusive.
/// Point checks have `start == end`; rolling checks reach back `window`
/// days before their as-of date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateWindow {
    pub column: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

pub fn window_predicate(window: &DateWindow, mode: ColumnMode) -> String {
    let column = column_ref(&window.column, mode);
    if window.start == window.end {
        format!("{} = '{}'", column, window.start)
    } else {
        format!("{} BETWEEN '{}' AND '{}'", column, window.start, window.end)
    }
}

/// Bulk-load combination: windows of different checks on one table are
/// OR-combined so the loaded slice covers every check's range. Row-level
/// filtering for each check then ANDs its own date predicate against the
/// already-loaded slice. The asymmetry is intentional, not a bug.
pub fn union_windows(windows: &[DateWindow], mode: ColumnMode) -> Option<String> {
    match windows {
        [] => None,
        [single] => Some(window_predicate(single, mode)),
        many => {
            let parts: Vec<String> = many.iter().map(|w| window_predicate(w, mode)).collect();
            Some(format!("({})", parts.join(" OR ")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn filter(column: &str, value: FilterValue, operator: &str) -> ResolvedFilter {
        ResolvedFilter {
            name: "f".into(),
            column: Some(column.into()),
            value: Some(value),
            kind: FilterKind::Other,
            operator: operator.into(),
            resolved_date: None,
        }
    }

    fn text(v: &str) -> FilterValue {
        FilterValue::Scalar(Scalar::Text(v.into()))
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_equality_and_numeric_predicates() {
        let f = filter("shop_code", text("SHOP001"), "=");
        assert_eq!(
            row_predicate(&f, ColumnMode::WorkingCopy).unwrap(),
            "shop_code = 'SHOP001'"
        );

        let f = filter("total_revenue", FilterValue::Scalar(Scalar::Int(1000)), ">=");
        assert_eq!(
            row_predicate(&f, ColumnMode::WorkingCopy).unwrap(),
            "total_revenue >= 1000"
        );
    }

    #[test]
    fn test_null_semantics() {
        let f = filter("deleted_at", FilterValue::Null, "=");
        assert_eq!(
            row_predicate(&f, ColumnMode::WorkingCopy).unwrap(),
            "deleted_at IS NULL"
        );

        let f = filter("deleted_at", FilterValue::Null, "!=");
        assert_eq!(
            row_predicate(&f, ColumnMode::WorkingCopy).unwrap(),
            "deleted_at IS NOT NULL"
        );
    }

    #[test]
    fn test_membership_and_like() {
        let list = FilterValue::List(vec![Scalar::Text("toys".into()), Scalar::Text("shoes".into())]);
        let f = filter("category", list, "IN");
        assert_eq!(
            row_predicate(&f, ColumnMode::WorkingCopy).unwrap(),
            "category IN ('toys', 'shoes')"
        );

        let f = filter("category", FilterValue::List(vec![Scalar::Text("returns".into())]), "NOT IN");
        assert_eq!(
            row_predicate(&f, ColumnMode::WorkingCopy).unwrap(),
            "category NOT IN ('returns')"
        );

        let f = filter("product_name", text("%widget%"), "LIKE");
        assert_eq!(
            row_predicate(&f, ColumnMode::WorkingCopy).unwrap(),
            "product_name LIKE '%widget%'"
        );
    }

    #[test]
    fn test_string_literals_escape_quotes() {
        let f = filter("name", text("O'Brien"), "=");
        assert_eq!(
            row_predicate(&f, ColumnMode::WorkingCopy).unwrap(),
            "name = 'O''Brien'"
        );
    }

    #[test]
    fn test_dual_naming_for_dotted_columns() {
        let f = filter("value.shopId", text("EC1705"), "=");
        // Working copy references the flattened alias...
        assert_eq!(
            row_predicate(&f, ColumnMode::WorkingCopy).unwrap(),
            "value_shopId = 'EC1705'"
        );
        // ...while the source keeps the dotted struct path.
        assert_eq!(
            row_predicate(&f, ColumnMode::Source).unwrap(),
            "value.shopId = 'EC1705'"
        );
        assert_eq!(flatten_alias("data.value.price"), "data_value_price");
    }

    #[test]
    fn test_naming_only_identifier_has_no_predicate() {
        let f = ResolvedFilter {
            name: "shop_id".into(),
            column: None,
            value: None,
            kind: FilterKind::Identifier,
            operator: "=".into(),
            resolved_date: None,
        };
        assert_eq!(row_predicate(&f, ColumnMode::WorkingCopy), None);
    }

    #[test]
    fn test_date_filter_uses_resolved_date() {
        let f = ResolvedFilter {
            name: "date".into(),
            column: Some("DATE".into()),
            value: Some(text("yesterday")),
            kind: FilterKind::Date,
            operator: "=".into(),
            resolved_date: Some(d(2023, 1, 15)),
        };
        assert_eq!(
            row_predicate(&f, ColumnMode::WorkingCopy).unwrap(),
            "DATE = '2023-01-15'"
        );
    }

    #[test]
    fn test_conjunction_joins_with_and() {
        let filters = vec![
            filter("shop_code", text("SHOP001"), "="),
            filter("total_revenue", FilterValue::Scalar(Scalar::Int(1000)), ">="),
        ];
        assert_eq!(
            conjunction(filters.iter(), ColumnMode::WorkingCopy).unwrap(),
            "shop_code = 'SHOP001' AND total_revenue >= 1000"
        );
        assert_eq!(conjunction([].iter(), ColumnMode::WorkingCopy), None);
    }

    // The bulk loader ORs date windows while row-level filtering ANDs them.
    // Easy to get backwards; this pins the contract.
    #[test]
    fn test_bulk_windows_combine_with_or_not_and() {
        let windows = vec![
            DateWindow {
                column: "DATE".into(),
                start: d(2023, 1, 1),
                end: d(2023, 1, 3),
            },
            DateWindow {
                column: "DATE".into(),
                start: d(2023, 1, 5),
                end: d(2023, 1, 5),
            },
        ];
        let sql = union_windows(&windows, ColumnMode::Source).unwrap();
        assert_eq!(
            sql,
            "(DATE BETWEEN '2023-01-01' AND '2023-01-03' OR DATE = '2023-01-05')"
        );
        assert!(!sql.contains("AND DATE"));
    }

    #[test]
    fn test_single_day_window_is_equality() {
        let w = DateWindow {
            column: "DATE".into(),
            start: d(2023, 1, 2),
            end: d(2023, 1, 2),
        };
        assert_eq!(
            window_predicate(&w, ColumnMode::WorkingCopy),
            "DATE = '2023-01-02'"
        );
    }
}
