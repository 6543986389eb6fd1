//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ExpanseConfig;
use std::path::Path;

/// Name of the configuration file inside a project directory.
pub const CONFIG_FILE_NAME: &str = "expanse.toml";

/// Loads and validates `expanse.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ExpanseConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE_NAME);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Like [`load_config`], but a missing file yields the defaults.
///
/// A file that exists but cannot be read or parsed is still an error.
pub fn load_config_or_default(project_dir: &Path) -> Result<ExpanseConfig, ConfigError> {
    match load_config(project_dir) {
        Err(ConfigError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(ExpanseConfig::default())
        }
        other => other,
    }
}

/// Parses and validates an `expanse.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ExpanseConfig, ConfigError> {
    let config: ExpanseConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &ExpanseConfig) -> Result<(), ConfigError> {
    if config.cache.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "cache.capacity must be at least 1".to_string(),
        ));
    }
    if config.store.dir.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "store.dir must not be empty".to_string(),
        ));
    }
    if config.log.filter.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "log.filter must not be empty".to_string(),
        ));
    }
    Ok(())
}
