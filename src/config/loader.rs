//! Configuration loading from disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Configuration written when the configured file does not exist yet.
pub const DEFAULT_CONFIG: &str = include_str!("../../config.toml");

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// A missing file is created from [`DEFAULT_CONFIG`] first.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    if !path.exists() {
        fs::write(path, DEFAULT_CONFIG).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "Wrote default configuration");
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Compression;

    #[test]
    fn default_config_is_valid() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert!(!config.gateways.is_empty());
        assert!(!config.servers.is_empty());
    }

    #[test]
    fn missing_file_is_created_from_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = load_config(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);
        assert_eq!(config.processing.workers, parse_config(DEFAULT_CONFIG).unwrap().processing.workers);
    }

    #[test]
    fn minimal_file_uses_defaults() {
        let config = parse_config(
            r#"
            [gateways.default]
            servers = ["lobby"]
            compression = "none"
            [[gateways.default.listeners]]
            bind = "0.0.0.0:19132"

            [servers.lobby]
            domains = ["play.example.com"]
            address = "10.0.0.5:19132"
            "#,
        )
        .unwrap();

        assert_eq!(config.processing.workers, 4);
        assert_eq!(config.gateways["default"].compression, Some(Compression::None));
        assert_eq!(config.servers["lobby"].dial_timeout_ms, None);
    }

    #[test]
    fn syntax_and_semantic_errors_are_distinguished() {
        assert!(matches!(parse_config("gateways = ["), Err(ConfigError::Parse(_))));
        let err = parse_config("[processing]\nworkers = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert_eq!(err.to_string(), "Validation failed: processing.workers: must be at least 1");
    }
}
