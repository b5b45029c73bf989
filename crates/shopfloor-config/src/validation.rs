//! Configuration validation

use crate::schema::RawConfig;
use crate::{DEFAULT_LEASE_DURATION_SECS, DEFAULT_SWEEP_INTERVAL_SECS};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("leases.{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("Sweep interval {interval}s exceeds lease duration {duration}s")]
    IntervalExceedsLease { interval: u64, duration: u64 },

    #[error("service.log_level cannot be empty")]
    EmptyLogLevel,
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let duration = config
        .leases
        .duration_seconds
        .unwrap_or(DEFAULT_LEASE_DURATION_SECS);
    let interval = config
        .leases
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

    if duration == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "duration_seconds",
        });
    }
    if interval == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "sweep_interval_seconds",
        });
    }

    // An interval longer than the lease would let expired leases linger for more than a full lease
    if duration > 0 && interval > duration {
        errors.push(ValidationError::IntervalExceedsLease { interval, duration });
    }

    if let Some(level) = &config.service.log_level
        && level.trim().is_empty()
    {
        errors.push(ValidationError::EmptyLogLevel);
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawLeaseConfig, RawServiceConfig};

    fn raw(duration: Option<u64>, interval: Option<u64>) -> RawConfig {
        RawConfig {
            config_version: 1,
            service: RawServiceConfig::default(),
            leases: RawLeaseConfig {
                duration_seconds: duration,
                sweep_interval_seconds: interval,
            },
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&raw(None, None)).is_empty());
    }

    #[test]
    fn zero_values_rejected() {
        let errors = validate_config(&raw(Some(0), Some(0)));
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::ZeroDuration {
            field: "duration_seconds"
        }));
    }

    #[test]
    fn interval_longer_than_lease_rejected() {
        let errors = validate_config(&raw(Some(60), Some(300)));
        assert_eq!(
            errors,
            vec![ValidationError::IntervalExceedsLease {
                interval: 300,
                duration: 60
            }]
        );
    }

    #[test]
    fn empty_log_level_rejected() {
        let mut config = raw(None, None);
        config.service.log_level = Some("  ".into());
        assert_eq!(validate_config(&config), vec![ValidationError::EmptyLogLevel]);
    }
}
