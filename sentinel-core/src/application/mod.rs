pub mod checks;
pub mod dataset;
pub mod executor;
pub mod report;

pub use checks::{CheckStatus, ResultRow};
pub use executor::{CheckExecutor, RunReport};
