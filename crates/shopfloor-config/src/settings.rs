//! Validated configuration structures

use crate::schema::{RawConfig, RawLeaseConfig, RawServiceConfig};
use crate::{DEFAULT_LEASE_DURATION_SECS, DEFAULT_SWEEP_INTERVAL_SECS};
use shopfloor_util::default_data_dir;
use std::path::PathBuf;
use std::time::Duration;

/// Validated configuration ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub service: ServiceSettings,
    pub leases: LeaseSettings,
}

impl ServiceConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceSettings::from_raw(raw.service),
            leases: LeaseSettings::from_raw(raw.leases),
        }
    }
}

/// Process-level settings
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub data_dir: PathBuf,
    pub log_level: String,
}

impl ServiceSettings {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            log_level: raw.log_level.unwrap_or_else(|| "info".into()),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Lease timing: how long an assignment lasts and how often expired ones are reclaimed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSettings {
    pub duration: Duration,
    pub sweep_interval: Duration,
}

impl LeaseSettings {
    fn from_raw(raw: RawLeaseConfig) -> Self {
        Self {
            duration: Duration::from_secs(
                raw.duration_seconds.unwrap_or(DEFAULT_LEASE_DURATION_SECS),
            ),
            sweep_interval: Duration::from_secs(
                raw.sweep_interval_seconds
                    .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
            ),
        }
    }
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(DEFAULT_LEASE_DURATION_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}
