//! Configuration parsing and validation for shopfloor
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service settings (data directory, log level)
//! - Lease duration and sweep interval
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Operator leases last 8 hours unless configured otherwise
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 8 * 60 * 60;

/// Expired leases are reclaimed every 5 minutes unless configured otherwise
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ServiceConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration, falling back to defaults when the file does not exist
pub fn load_config_or_default(path: impl AsRef<Path>) -> ConfigResult<ServiceConfig> {
    let path = path.as_ref();
    if !path.exists() {
        info!(config_path = %path.display(), "No config file, using defaults");
        return Ok(ServiceConfig::default());
    }
    load_config(path)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<ServiceConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(ServiceConfig::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let config = parse_config("config_version = 1").unwrap();
        assert_eq!(config.leases.duration, Duration::from_secs(8 * 3600));
        assert_eq!(config.leases.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.service.log_level, "info");
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [service]
            data_dir = "/srv/shopfloor"
            log_level = "debug"

            [leases]
            duration_seconds = 43200
            sweep_interval_seconds = 60
        "#;

        let config = parse_config(config).unwrap();
        assert_eq!(config.service.data_dir, Path::new("/srv/shopfloor"));
        assert_eq!(config.service.log_level, "debug");
        assert_eq!(config.leases.duration, Duration::from_secs(12 * 3600));
        assert_eq!(config.leases.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_leases() {
        let config = r#"
            config_version = 1

            [leases]
            duration_seconds = 0
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.leases, LeaseSettings::default());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "config_version = 1\n[leases]\nsweep_interval_seconds = 30\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.leases.sweep_interval, Duration::from_secs(30));
    }
}
