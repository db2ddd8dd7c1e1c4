mod schema;

pub use schema::*;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {}: {source}", .path.display())]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] toml::de::Error),
    #[error("Missing required setting '{0}'")]
    MissingKey(&'static str),
}

/// Default search path, lowest precedence first
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["/etc/pg-cluster-logger.toml", "pg-cluster-logger.toml"];

/// Load and merge settings files
///
/// Files are applied in order; a key in a later file replaces the same key
/// from an earlier one. Missing files are skipped.
pub fn load_settings<P: AsRef<Path>>(paths: &[P]) -> Result<Settings, ConfigError> {
    let mut merged = toml::Table::new();

    for path in paths {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, skipping");
                continue;
            }
            Err(source) => {
                return Err(ConfigError::IoError {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let table: toml::Table = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), keys = table.len(), "Loaded configuration");
        merged.extend(table);
    }

    let settings: Settings = toml::Value::Table(merged).try_into()?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.node_name.trim().is_empty() {
        return Err(ConfigError::MissingKey("node_name"));
    }
    if settings.cluster_logger_logfile.as_os_str().is_empty() {
        return Err(ConfigError::MissingKey("cluster_logger_logfile"));
    }
    Ok(())
}
