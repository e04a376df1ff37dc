// sentinel-core/src/application/executor.rs

// One run: setup SQL, dataset planning, then strictly sequential check
// evaluation against the shared working copies. Configuration-shape errors
// never reach this point, resolution already failed fast. Everything that
// goes wrong here is a per-check runtime failure, downgraded to an ERROR
// row so sibling checks keep running.

use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::application::checks::{
    assemble_query, classify_bounds, identifier_column, identifier_value, metric_name,
    report_date, report_table, requires_date_filter, CheckStatus, ResultRow,
};
use crate::application::dataset::{
    group_key, plan_datasets, requests_for, table_loads, DatasetCache, DatasetPlan, DatasetState,
};
use crate::application::report::{error_message, failure_message, no_data_message};
use crate::domain::config::resolve::{ResolvedCheck, ResolvedRun};
use crate::domain::config::{CheckType, IqrSide};
use crate::ports::engine::{EngineError, QueryEngine, TableData};

/// One check's emitted row plus its (optional) human-readable message.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub row: ResultRow,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<CheckOutcome>,
    pub run_failed: bool,
}

impl RunReport {
    pub fn rows(&self) -> impl Iterator<Item = &ResultRow> {
        self.outcomes.iter().map(|o| &o.row)
    }

    pub fn messages(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| o.message.clone())
            .collect()
    }
}

pub struct CheckExecutor<'e> {
    engine: &'e dyn QueryEngine,
    accessor: String,
    cache: DatasetCache,
}

impl<'e> CheckExecutor<'e> {
    pub fn new(engine: &'e dyn QueryEngine, accessor: impl Into<String>) -> Self {
        Self {
            engine,
            accessor: accessor.into(),
            cache: DatasetCache::new(),
        }
    }

    /// Probe/fetch counters, exposed for cache behavior assertions.
    pub fn cache_stats(&self) -> (usize, usize) {
        (self.cache.probes, self.cache.fetches)
    }

    /// Executes the free-form setup SQL once, before anything else.
    pub async fn run_setup(&self, setup_sql: &str) -> Result<(), EngineError> {
        if setup_sql.trim().is_empty() {
            return Ok(());
        }
        info!("running database setup");
        self.engine.execute(setup_sql).await
    }

    /// Evaluates every resolved check in declaration order, one at a time.
    #[instrument(skip(self, resolved), fields(checks = resolved.checks.len()))]
    pub async fn run(&mut self, resolved: &ResolvedRun) -> RunReport {
        let requests: Vec<_> = resolved
            .checks
            .iter()
            .flat_map(|check| requests_for(check))
            .collect();
        let plans = plan_datasets(&requests);
        info!(
            checks = resolved.checks.len(),
            datasets = plans.len(),
            "starting run"
        );

        // All probes run before any fetch: the working copy takes over the
        // source name inside the engine, so probe order matters.
        for plan in plans.values() {
            self.cache.probe(self.engine, &self.accessor, plan).await;
        }
        for load in table_loads(&plans).values() {
            let needed = plans.values().any(|plan| {
                plan.table == load.table
                    && matches!(self.cache.probe_state(plan), Some(DatasetState::Ready))
            });
            if needed {
                self.cache
                    .load_table(self.engine, &self.accessor, load)
                    .await;
            }
        }

        let mut outcomes = Vec::with_capacity(resolved.checks.len());
        for check in &resolved.checks {
            let outcome = self.evaluate(check, &plans).await;
            if outcome.row.result != CheckStatus::Success {
                if let Some(msg) = &outcome.message {
                    warn!(check = %check.label(), "{}", msg);
                }
            }
            outcomes.push(outcome);
        }

        let run_failed = outcomes
            .iter()
            .any(|o| matches!(o.row.result, CheckStatus::Fail | CheckStatus::Error));

        RunReport {
            outcomes,
            run_failed,
        }
    }

    async fn evaluate(
        &mut self,
        check: &ResolvedCheck,
        plans: &BTreeMap<String, DatasetPlan>,
    ) -> CheckOutcome {
        // 1. Every dataset this check reads must have probed and loaded.
        for request in requests_for(check) {
            let Some(plan) = plans.get(&group_key(&request)) else {
                return error_outcome(check, "internal: dataset plan missing".to_string());
            };
            match self.cache.probe_state(plan) {
                Some(DatasetState::Ready) => {}
                Some(DatasetState::Empty) => return no_data_outcome(check, &request.table),
                Some(DatasetState::Missing(_)) => {
                    return missing_table_outcome(check, &request.table);
                }
                Some(DatasetState::Failed(msg)) => return error_outcome(check, msg),
                None => return error_outcome(check, "internal: dataset not probed".to_string()),
            }
            match self.cache.fetch_state(&plan.table) {
                Some(DatasetState::Ready) => {}
                Some(DatasetState::Missing(_)) => {
                    return missing_table_outcome(check, &request.table);
                }
                Some(DatasetState::Failed(msg)) => return error_outcome(check, msg),
                Some(DatasetState::Empty) | None => {
                    return error_outcome(check, "internal: dataset not loaded".to_string());
                }
            }
        }

        // 2. Rolling strategies need an as-of date; per-check failure only.
        if requires_date_filter(check)
            && check.date_filter().and_then(|f| f.resolved_date).is_none()
        {
            return error_outcome(
                check,
                "required date filter is missing for a rolling check".to_string(),
            );
        }

        // 3. Assemble and run the measurement query.
        let sql = match assemble_query(check) {
            Ok(sql) => sql,
            Err(msg) => return error_outcome(check, msg),
        };
        let data = match self.engine.fetch(&sql).await {
            Ok(data) => data,
            Err(EngineError::ObjectNotFound(_)) => {
                return missing_table_outcome(check, check.primary_table());
            }
            Err(err) => return error_outcome(check, err.to_string()),
        };

        measured_outcome(check, &data)
    }
}

/// Effective thresholds: static from the spec, except IQR checks whose
/// bounds come out of the measurement query (per `how`).
fn effective_bounds(check: &ResolvedCheck, data: &TableData) -> (f64, f64) {
    if check.check_type != CheckType::IqrOutlierCheck {
        return (check.lower_threshold, check.upper_threshold);
    }

    let dynamic = |column: &str| data.scalar(column).and_then(|c| c.as_f64());
    let lower = match check.how {
        IqrSide::Both | IqrSide::Lower => {
            dynamic("lower_threshold").unwrap_or(f64::NEG_INFINITY)
        }
        IqrSide::Upper => f64::NEG_INFINITY,
    };
    let upper = match check.how {
        IqrSide::Both | IqrSide::Upper => dynamic("upper_threshold").unwrap_or(f64::INFINITY),
        IqrSide::Lower => f64::INFINITY,
    };
    (lower, upper)
}

fn measured_outcome(check: &ResolvedCheck, data: &TableData) -> CheckOutcome {
    let name = metric_name(check);
    let value = data.scalar(&name).and_then(|cell| cell.as_f64());
    let (lower, upper) = effective_bounds(check, data);
    let result = classify_bounds(check.monitor_only, value, lower, upper);

    let row = ResultRow {
        date: report_date(check),
        metric_name: name,
        identifier_column: identifier_column(check),
        identifier: identifier_value(check),
        table: report_table(check),
        column: Some(check.check_column.clone()),
        value,
        lower_threshold: Some(lower),
        upper_threshold: Some(upper),
        result,
    };

    let message = match result {
        CheckStatus::Fail => Some(failure_message(check, &row)),
        _ => None,
    };

    CheckOutcome { row, message }
}

/// The dataset exists but the requested slice has no rows.
fn no_data_outcome(check: &ResolvedCheck, table: &str) -> CheckOutcome {
    let row = ResultRow {
        date: report_date(check),
        metric_name: "data_exists".to_string(),
        identifier_column: identifier_column(check),
        identifier: identifier_value(check),
        table: table.to_string(),
        column: None,
        value: None,
        lower_threshold: None,
        upper_threshold: None,
        result: CheckStatus::Error,
    };
    let message = Some(no_data_message(check, table));
    CheckOutcome { row, message }
}

/// The source object is absent altogether.
fn missing_table_outcome(check: &ResolvedCheck, table: &str) -> CheckOutcome {
    let row = ResultRow {
        date: report_date(check),
        metric_name: "table_exists".to_string(),
        identifier_column: identifier_column(check),
        identifier: identifier_value(check),
        table: table.to_string(),
        column: None,
        value: None,
        lower_threshold: None,
        upper_threshold: None,
        result: CheckStatus::Error,
    };
    let message = Some(format!(
        "{}: Table {} does not exist",
        identifier_value(check),
        table
    ));
    CheckOutcome { row, message }
}

/// Any other engine failure for this check; siblings keep running.
fn error_outcome(check: &ResolvedCheck, error: String) -> CheckOutcome {
    let row = ResultRow {
        date: report_date(check),
        metric_name: metric_name(check),
        identifier_column: identifier_column(check),
        identifier: identifier_value(check),
        table: report_table(check),
        column: Some(check.check_column.clone()),
        value: None,
        lower_threshold: Some(check.lower_threshold),
        upper_threshold: Some(check.upper_threshold),
        result: CheckStatus::Error,
    };
    let message = Some(error_message(check, &error));
    CheckOutcome { row, message }
}
