//! Configuration module for k8s-gateway.
//!
//! Loads the JSON gateway configuration (target project and filter rules)
//! named by `--config` / `GATEWAY_CONFIG`. The configuration is read once at
//! startup; there is no reload path.

use kgw_sdk::config::{FilterAction, GatewayConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Configuration loader.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader. An empty path means "no file".
    pub fn new(config_path: Option<&Path>) -> Self {
        Self {
            config_path: config_path
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf),
        }
    }

    /// Load the configuration.
    ///
    /// Without a file this yields the default configuration, which rejects
    /// every event.
    pub fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let config = match &self.config_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
                    path: path.clone(),
                    source,
                })?;
                let config =
                    GatewayConfig::from_json(&raw).map_err(|source| ConfigError::ParseError {
                        path: path.clone(),
                        source,
                    })?;
                info!(path = ?path, "Configuration loaded");
                config
            }
            None => {
                info!("No configuration file given");
                GatewayConfig::default()
            }
        };

        check(&config);
        Ok(config)
    }
}

/// Warn about settings that are accepted but almost certainly mistakes.
fn check(config: &GatewayConfig) {
    if config.project.is_empty() {
        warn!("No project configured; builds cannot be created");
    }
    if config.filters.is_empty() {
        warn!("No filters configured; every event will be rejected");
    }
    for (i, rule) in config.filters.iter().enumerate() {
        if let FilterAction::Unknown(action) = &rule.action {
            warn!(rule = i, %action, "Unknown filter action, treated as reject");
        }
    }
}
