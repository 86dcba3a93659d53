//! Merge policy and service for layered configuration.

pub mod service;

use crate::config::HostConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with the serialized defaults, the lowest precedence layer.
pub(crate) fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&HostConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
