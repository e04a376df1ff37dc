pub mod duckdb;

pub use duckdb::DuckDbEngine;
