//! Configuration loading for the command-line client.

use anyhow::{Context, Result};
use pvectl_api::{ClientConfig, DEFAULT_CONFIG_PATH};
use std::path::Path;
use tracing::{debug, info};

use crate::cli::Args;

/// Load the client configuration and apply command-line overrides.
///
/// An explicit `--config` must exist. Without one, the default location is
/// tried and built-in defaults are used when it is absent.
pub fn load(args: &Args) -> Result<ClientConfig> {
    let config = match &args.config {
        Some(path) => {
            let config = ClientConfig::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path))?;
            info!(config_path = %path, "Configuration loaded");
            config
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            let config = ClientConfig::load(DEFAULT_CONFIG_PATH).with_context(|| {
                format!("Failed to load configuration from {}", DEFAULT_CONFIG_PATH)
            })?;
            info!(config_path = %DEFAULT_CONFIG_PATH, "Configuration loaded from default location");
            config
        }
        None => {
            debug!("No config file found, using defaults");
            ClientConfig::default()
        }
    };

    let config = with_cli_overrides(config, args);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Apply CLI argument overrides to the configuration.
pub fn with_cli_overrides(mut config: ClientConfig, args: &Args) -> ClientConfig {
    if let Some(ref base_url) = args.base_url {
        config.base_url = base_url.clone();
    }

    config
}
