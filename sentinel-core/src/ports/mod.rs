pub mod engine;

pub use engine::{CellValue, EngineError, QueryEngine, TableData};
