//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Process-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Operator lease settings
    #[serde(default)]
    pub leases: RawLeaseConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the database
    pub data_dir: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    pub log_level: Option<String>,
}

/// Lease timing settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLeaseConfig {
    /// How long an operator assignment lasts (default: 8 hours)
    pub duration_seconds: Option<u64>,

    /// Pause between expiry sweeps (default: 5 minutes)
    pub sweep_interval_seconds: Option<u64>,
}
