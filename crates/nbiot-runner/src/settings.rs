//! Effective configuration: file values with command-line overrides.

use crate::error::RunnerResult;
use nbiot_modem::ModemConfig;
use std::path::Path;
use tracing::debug;

/// Values given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
}

/// Load `path` (or the defaults) and apply `overrides`.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> RunnerResult<ModemConfig> {
    let mut config = match path {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            ModemConfig::from_file(path)?
        }
        None => ModemConfig::default(),
    };

    if let Some(port) = &overrides.port {
        config = config.with_port(port.clone());
    }
    if let Some(baud_rate) = overrides.baud_rate {
        config = config.with_baud_rate(baud_rate);
    }
    config.validate()?;
    Ok(config)
}

/// Render the effective configuration as YAML.
pub fn to_yaml(config: &ModemConfig) -> RunnerResult<String> {
    Ok(serde_yaml::to_string(config)?)
}
