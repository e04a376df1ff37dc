pub mod adapters;
pub mod config;
pub mod error;

pub use error::InfrastructureError;
