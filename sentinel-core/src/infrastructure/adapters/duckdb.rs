// sentinel-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use duckdb::types::ValueRef;
use duckdb::{Config as DuckConfig, Connection};
use std::sync::{Arc, Mutex};

use crate::ports::engine::{CellValue, EngineError, QueryEngine, TableData};

/// DuckDB adapter for the [`QueryEngine`] port. The connection is shared
/// behind a mutex; the run loop is sequential so there is no contention,
/// the lock only guards against accidental cross-thread reuse.
pub struct DuckDbEngine {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbEngine {
    pub fn new(db_path: &str) -> Result<Self, EngineError> {
        let config = DuckConfig::default();
        let conn = if db_path == ":memory:" {
            Connection::open_in_memory_with_flags(config)
        } else {
            Connection::open_with_flags(db_path, config)
        }
        .map_err(map_duckdb_error)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, EngineError> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Query("DuckDB mutex poisoned".to_string()))
    }
}

/// The port needs the "object not found" condition to be distinguishable;
/// DuckDB reports it as a catalog error.
fn map_duckdb_error(err: duckdb::Error) -> EngineError {
    let msg = err.to_string();
    if msg.contains("Catalog Error") || msg.contains("does not exist") {
        EngineError::ObjectNotFound(msg)
    } else {
        EngineError::Query(msg)
    }
}

fn cell_from(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Boolean(b) => CellValue::Bool(b),
        ValueRef::TinyInt(i) => CellValue::Int(i.into()),
        ValueRef::SmallInt(i) => CellValue::Int(i.into()),
        ValueRef::Int(i) => CellValue::Int(i.into()),
        ValueRef::BigInt(i) => CellValue::Int(i),
        ValueRef::HugeInt(i) => CellValue::Int(i as i64),
        ValueRef::UTinyInt(i) => CellValue::Int(i.into()),
        ValueRef::USmallInt(i) => CellValue::Int(i.into()),
        ValueRef::UInt(i) => CellValue::Int(i.into()),
        ValueRef::UBigInt(i) => CellValue::Int(i as i64),
        ValueRef::Float(f) => CellValue::Float(f.into()),
        ValueRef::Double(f) => CellValue::Float(f),
        ValueRef::Decimal(d) => d
            .to_string()
            .parse()
            .map(CellValue::Float)
            .unwrap_or(CellValue::Null),
        ValueRef::Text(bytes) => CellValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Date32(days) => {
            // days since 1970-01-01; rendered ISO like every other date here
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
            CellValue::Text((epoch + Duration::days(days.into())).to_string())
        }
        other => CellValue::Text(format!("{:?}", other)),
    }
}

#[async_trait]
impl QueryEngine for DuckDbEngine {
    async fn fetch(&self, query: &str) -> Result<TableData, EngineError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(query).map_err(map_duckdb_error)?;

        let mut data_rows = Vec::new();
        {
            let mut rows = stmt.query([]).map_err(map_duckdb_error)?;
            while let Some(row) = rows.next().map_err(map_duckdb_error)? {
                let count = row.as_ref().column_count();
                let mut cells = Vec::with_capacity(count);
                for idx in 0..count {
                    cells.push(cell_from(row.get_ref(idx).map_err(map_duckdb_error)?));
                }
                data_rows.push(cells);
            }
        }

        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        Ok(TableData {
            columns,
            rows: data_rows,
        })
    }

    async fn execute(&self, query: &str) -> Result<(), EngineError> {
        if query.trim().is_empty() {
            return Ok(());
        }
        let conn = self.lock()?;
        // execute_batch: setup SQL may carry several statements
        conn.execute_batch(query).map_err(map_duckdb_error)
    }

    fn engine_name(&self) -> &str {
        "duckdb"
    }
}
