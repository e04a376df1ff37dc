// sentinel-core/src/ports/engine.rs

// This file defines what the check runner needs from a query engine,
// without knowing how it is done. The adapter in infrastructure/ plugs
// DuckDB into this shape; tests plug in scripted mocks.

use async_trait::async_trait;
use miette::Diagnostic;
use std::collections::HashMap;
use thiserror::Error;

/// Failure surface of the query-engine collaborator. The "object not found"
/// condition is distinguishable so the evaluator can map a missing table to
/// a table_exists ERROR row instead of propagating.
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error("Object not found: {0}")]
    #[diagnostic(code(sentinel::engine::not_found))]
    ObjectNotFound(String),

    #[error("Query engine failure: {0}")]
    #[diagnostic(
        code(sentinel::engine::query),
        help("An error occurred inside the SQL engine.")
    )]
    Query(String),
}

/// One cell of a tabular result, narrowed to what checks actually read.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Numeric view used for scalar check values and thresholds.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Null => None,
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            CellValue::Text(s) => s.parse().ok(),
        }
    }
}

/// Column-named rows; the smallest tabular contract the evaluator needs.
#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl TableData {
    /// First-row lookup by column name (checks read single-row scalars).
    pub fn scalar(&self, column: &str) -> Option<&CellValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.first().and_then(|row| row.get(idx))
    }

    pub fn first_row(&self) -> Option<HashMap<String, CellValue>> {
        self.rows.first().map(|row| {
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect()
        })
    }
}

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Runs a SELECT and returns the tabular result.
    async fn fetch(&self, query: &str) -> Result<TableData, EngineError>;

    /// Runs a statement for its side effect (DDL, INSERT, setup SQL).
    async fn execute(&self, query: &str) -> Result<(), EngineError>;

    fn engine_name(&self) -> &str;
}
