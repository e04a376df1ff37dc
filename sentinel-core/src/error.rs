// sentinel-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::engine::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    // --- DOMAIN ERRORS (merge, filters, overwrites, dates) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE ERRORS (IO, parsing, database) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- QUERY ENGINE COLLABORATOR ---
    #[error(transparent)]
    Engine(#[from] EngineError),

    // --- GENERIC / APPLICATIVE ERRORS ---
    #[error("Internal Error: {0}")]
    InternalError(String),
}

// Manual implementation to avoid a duplicate enum variant but keep ergonomics
impl From<std::io::Error> for SentinelError {
    fn from(err: std::io::Error) -> Self {
        SentinelError::Infrastructure(InfrastructureError::Io(err))
    }
}
