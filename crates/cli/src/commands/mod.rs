pub mod ask;
pub mod doctor;
pub mod evaluate;
pub mod init;
pub mod serve;
pub mod tools;

use std::path::Path;

use datalyst_config::AppConfig;
use datalyst_core::{Error, Result};

/// Load the config from `path` (or the default location), then apply
/// environment overrides and validate.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let loaded = match path {
        None => AppConfig::load(),
        Some(path) => AppConfig::load_from(path).and_then(|mut config| {
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }),
    };
    loaded.map_err(|e| Error::Config {
        message: e.to_string(),
    })
}
