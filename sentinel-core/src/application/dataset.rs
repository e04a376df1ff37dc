// sentinel-core/src/application/dataset.rs

// Bulk loading and the data-existence cache. Each check declares which
// slice of which table it needs; requests sharing a fingerprint (table +
// canonical filter set, date values excluded) collapse into ONE existence
// probe per run. Fetching materializes one working copy per table inside
// the engine, covering the OR-combination of every fingerprint's slice,
// a superset; per-check row filtering later ANDs each check's own
// predicates against it. Dotted struct columns flatten to underscore
// aliases on the way in.
//
// Probes always run before the table fetch: the working copy replaces the
// source name inside the engine, so a probe issued afterwards would read
// the already-filtered copy.

use chrono::Duration;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

use crate::domain::config::resolve::ResolvedCheck;
use crate::domain::config::CheckType;
use crate::domain::filter::predicate::{
    conjunction, flatten_alias, union_windows, ColumnMode, DateWindow,
};
use crate::domain::filter::{FilterKind, ResolvedFilter};
use crate::ports::engine::{EngineError, QueryEngine};

/// The data slice one check needs from one table.
#[derive(Debug, Clone)]
pub struct DatasetRequest {
    pub table: String,
    /// Original (dotted) column names; `*` requests the whole table.
    pub columns: BTreeSet<String>,
    /// Predicate filters excluding the date filter (its window is below).
    pub filters: Vec<ResolvedFilter>,
    pub window: Option<DateWindow>,
}

/// One probe unit: every request with the same fingerprint shares it.
#[derive(Debug, Clone)]
pub struct DatasetPlan {
    pub table: String,
    pub columns: BTreeSet<String>,
    pub filters: Vec<ResolvedFilter>,
    pub windows: Vec<DateWindow>,
    pub fingerprint: String,
}

/// One fetch unit: the union slice of every plan touching a table.
#[derive(Debug, Clone)]
pub struct TableLoad {
    pub table: String,
    pub columns: BTreeSet<String>,
    /// Each plan's full predicate; `None` means one plan wants it all.
    pub disjuncts: Vec<Option<String>>,
}

/// Days of history a rolling strategy reaches back from its as-of date.
fn rolling_window_days(check: &ResolvedCheck) -> i64 {
    match check.check_type {
        CheckType::RelCountChangeCheck => check.rolling_days.into(),
        CheckType::RollingValuesInSetCheck | CheckType::IqrOutlierCheck => {
            check.interval_days.into()
        }
        _ => 0,
    }
}

fn window_for(check: &ResolvedCheck) -> Option<DateWindow> {
    let date_filter = check.date_filter()?;
    let end = date_filter.resolved_date?;
    let column = date_filter.column.clone()?;
    Some(DateWindow {
        column,
        start: end - Duration::days(rolling_window_days(check)),
        end,
    })
}

fn predicate_filters(check: &ResolvedCheck) -> Vec<ResolvedFilter> {
    check
        .filters
        .values()
        .filter(|f| f.kind != FilterKind::Date && !f.is_naming_only())
        .cloned()
        .collect()
}

fn filter_columns(filters: &[ResolvedFilter]) -> impl Iterator<Item = String> + '_ {
    filters.iter().filter_map(|f| f.column.clone())
}

/// The dataset requests of one resolved check. `MatchRateCheck` yields two:
/// the left table must supply the check column, the right table only join
/// and filter columns; a check never requires a column from a table that
/// does not need to provide it.
pub fn requests_for(check: &ResolvedCheck) -> Vec<DatasetRequest> {
    let filters = predicate_filters(check);
    let window = window_for(check);

    if check.check_type == CheckType::MatchRateCheck {
        let mut left_columns: BTreeSet<String> = check.join_columns_left.iter().cloned().collect();
        left_columns.insert(check.check_column.clone());
        left_columns.extend(filter_columns(&filters));
        if let Some(w) = &window {
            left_columns.insert(w.column.clone());
        }

        let mut right_columns: BTreeSet<String> =
            check.join_columns_right.iter().cloned().collect();
        right_columns.extend(filter_columns(&filters));
        if let Some(w) = &window {
            right_columns.insert(w.column.clone());
        }

        return vec![
            DatasetRequest {
                table: check.left_table.clone().unwrap_or_default(),
                columns: left_columns,
                filters: filters.clone(),
                window: window.clone(),
            },
            DatasetRequest {
                table: check.right_table.clone().unwrap_or_default(),
                columns: right_columns,
                filters,
                window,
            },
        ];
    }

    let mut columns: BTreeSet<String> = BTreeSet::new();
    columns.insert(check.check_column.clone());
    columns.extend(filter_columns(&filters));
    if let Some(w) = &window {
        columns.insert(w.column.clone());
    }

    vec![DatasetRequest {
        table: check.table.clone().unwrap_or_default(),
        columns,
        filters,
        window,
    }]
}

/// Canonical key of a filter set: name, column, operator and value, sorted;
/// date filters contribute column only. Their exact value (or resolved
/// range) is deliberately excluded so overlapping windows share one probe.
fn canonical_filters(filters: &[ResolvedFilter], window: &Option<DateWindow>) -> String {
    let mut parts: Vec<String> = filters
        .iter()
        .map(|f| {
            format!(
                "{}|{}|{}|{}",
                f.name,
                f.column.as_deref().unwrap_or(""),
                f.operator,
                f.value.as_ref().map(|v| v.render()).unwrap_or_default()
            )
        })
        .collect();
    if let Some(w) = window {
        parts.push(format!("date|{}", w.column));
    }
    parts.sort();
    parts.join(";")
}

/// Grouping key: requests sharing it are served by one probe.
pub fn group_key(request: &DatasetRequest) -> String {
    format!(
        "{}\u{1}{}",
        request.table,
        canonical_filters(&request.filters, &request.window)
    )
}

/// Merges all requests of a run into probe plans. Column sets union; date
/// windows collect for OR-combination.
pub fn plan_datasets(requests: &[DatasetRequest]) -> BTreeMap<String, DatasetPlan> {
    let mut plans: BTreeMap<String, DatasetPlan> = BTreeMap::new();

    for request in requests {
        let key = group_key(request);
        let plan = plans.entry(key.clone()).or_insert_with(|| DatasetPlan {
            table: request.table.clone(),
            columns: BTreeSet::new(),
            filters: request.filters.clone(),
            windows: Vec::new(),
            fingerprint: String::new(),
        });
        plan.columns.extend(request.columns.iter().cloned());
        if let Some(w) = &request.window {
            if !plan.windows.contains(w) {
                plan.windows.push(w.clone());
            }
        }
    }

    // The full fingerprint includes the final column union.
    for (key, plan) in plans.iter_mut() {
        let columns: Vec<String> = plan.columns.iter().cloned().collect();
        plan.fingerprint = format!("{}\u{1}{}", key, columns.join(","));
    }

    plans
}

/// One plan's complete slice predicate (filters AND its date windows).
pub fn plan_where(plan: &DatasetPlan) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(p) = conjunction(plan.filters.iter(), ColumnMode::Source) {
        parts.push(p);
    }
    if let Some(w) = union_windows(&plan.windows, ColumnMode::Source) {
        parts.push(w);
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

/// Collapses the plans into one fetch per table (superset slice).
pub fn table_loads(plans: &BTreeMap<String, DatasetPlan>) -> BTreeMap<String, TableLoad> {
    let mut loads: BTreeMap<String, TableLoad> = BTreeMap::new();
    for plan in plans.values() {
        let load = loads
            .entry(plan.table.clone())
            .or_insert_with(|| TableLoad {
                table: plan.table.clone(),
                columns: BTreeSet::new(),
                disjuncts: Vec::new(),
            });
        load.columns.extend(plan.columns.iter().cloned());
        load.disjuncts.push(plan_where(plan));
    }
    loads
}

fn load_where(load: &TableLoad) -> Option<String> {
    if load.disjuncts.iter().any(Option::is_none) {
        return None;
    }
    let parts: Vec<String> = load.disjuncts.iter().flatten().cloned().collect();
    match parts.len() {
        0 => None,
        1 => Some(parts[0].clone()),
        _ => Some(
            parts
                .iter()
                .map(|p| format!("({})", p))
                .collect::<Vec<_>>()
                .join(" OR "),
        ),
    }
}

/// Source-table reference: dotted names address schema paths, each segment
/// quoted, with the accessor prefixed when one is attached.
pub fn source_table_ref(accessor: &str, table: &str) -> String {
    let quoted: Vec<String> = table
        .split('.')
        .map(|segment| format!("\"{}\"", segment))
        .collect();
    if accessor.is_empty() {
        quoted.join(".")
    } else {
        format!("\"{}\".{}", accessor, quoted.join("."))
    }
}

/// Working-copy reference: one local table whose name is the full source
/// table string, quoted as a single identifier.
pub fn working_table_ref(table: &str) -> String {
    format!("\"{}\"", table)
}

/// Lifecycle of one fingerprint (or one table fetch) inside a run.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetState {
    /// Rows exist (probe) / working copy materialized (fetch).
    Ready,
    /// Probe succeeded but the slice has no rows.
    Empty,
    /// The source object does not exist.
    Missing(String),
    /// The probe or fetch failed for another engine reason.
    Failed(String),
}

/// Per-run memo of probe states by fingerprint and fetch states by table.
/// Append-only for the lifetime of one run; a run's working set is
/// bounded, so nothing is ever evicted. Sequential evaluation upholds the
/// "at most one probe per fingerprint / one fetch per table" guarantee; a
/// parallel reimplementation would need a single-writer discipline here.
#[derive(Debug, Default)]
pub struct DatasetCache {
    probe_states: HashMap<String, DatasetState>,
    fetch_states: HashMap<String, DatasetState>,
    pub probes: usize,
    pub fetches: usize,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized "does this (table, filter set) have rows" probe.
    pub async fn probe(
        &mut self,
        engine: &dyn QueryEngine,
        accessor: &str,
        plan: &DatasetPlan,
    ) -> DatasetState {
        if let Some(state) = self.probe_states.get(&plan.fingerprint) {
            debug!(table = %plan.table, "existence cache hit");
            return state.clone();
        }

        let where_sql = plan_where(plan)
            .map(|w| format!(" WHERE {}", w))
            .unwrap_or_default();
        let probe_sql = format!(
            "SELECT COUNT(*) AS probe_count FROM {}{}",
            source_table_ref(accessor, &plan.table),
            where_sql
        );
        self.probes += 1;
        debug!(table = %plan.table, "existence probe");

        let state = match engine.fetch(&probe_sql).await {
            Err(EngineError::ObjectNotFound(msg)) => DatasetState::Missing(msg),
            Err(err) => DatasetState::Failed(err.to_string()),
            Ok(data) => {
                let row_count = data
                    .scalar("probe_count")
                    .and_then(|cell| cell.as_f64())
                    .unwrap_or(0.0);
                if row_count > 0.0 {
                    DatasetState::Ready
                } else {
                    DatasetState::Empty
                }
            }
        };

        self.probe_states
            .insert(plan.fingerprint.clone(), state.clone());
        state
    }

    /// Probe state previously established for a plan's fingerprint.
    pub fn probe_state(&self, plan: &DatasetPlan) -> Option<DatasetState> {
        self.probe_states.get(&plan.fingerprint).cloned()
    }

    pub fn table_has_rows(&self, plan: &DatasetPlan) -> Option<bool> {
        self.probe_state(plan)
            .map(|state| matches!(state, DatasetState::Ready))
    }

    fn select_list(load: &TableLoad) -> String {
        if load.columns.contains("*") {
            return "*".to_string();
        }
        load.columns
            .iter()
            .map(|column| {
                if column.contains('.') {
                    format!("{} AS {}", column, flatten_alias(column))
                } else {
                    column.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Memoized bulk fetch: materializes a table's working copy once per
    /// run, covering the union slice of every plan touching it.
    pub async fn load_table(
        &mut self,
        engine: &dyn QueryEngine,
        accessor: &str,
        load: &TableLoad,
    ) -> DatasetState {
        if let Some(state) = self.fetch_states.get(&load.table) {
            return state.clone();
        }

        let where_sql = load_where(load)
            .map(|w| format!(" WHERE {}", w))
            .unwrap_or_default();
        let fetch_sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT {} FROM {}{}",
            working_table_ref(&load.table),
            Self::select_list(load),
            source_table_ref(accessor, &load.table),
            where_sql
        );
        self.fetches += 1;
        info!(table = %load.table, "bulk loading dataset");

        let state = match engine.execute(&fetch_sql).await {
            Ok(()) => DatasetState::Ready,
            Err(EngineError::ObjectNotFound(msg)) => DatasetState::Missing(msg),
            Err(err) => DatasetState::Failed(err.to_string()),
        };
        self.fetch_states.insert(load.table.clone(), state.clone());
        state
    }

    /// Fetch state previously established for a table.
    pub fn fetch_state(&self, table: &str) -> Option<DatasetState> {
        self.fetch_states.get(table).cloned()
    }
}
