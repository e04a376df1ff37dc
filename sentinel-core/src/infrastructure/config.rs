// sentinel-core/src/infrastructure/config.rs

use std::fs;
use std::path::Path;
use tracing::{info, instrument};

use crate::domain::config::Config;
use crate::infrastructure::error::InfrastructureError;

/// Loads the declaration tree from a YAML file. Shape validation beyond
/// what serde enforces happens later, in the resolution engine.
#[instrument(skip(path))]
pub fn load_config(path: &Path) -> Result<Config, InfrastructureError> {
    if !path.exists() {
        return Err(InfrastructureError::ConfigNotFound(
            path.display().to_string(),
        ));
    }

    let content = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&content)?;
    info!(name = %config.name, bundles = config.check_bundles.len(), "loaded configuration");
    Ok(config)
}
