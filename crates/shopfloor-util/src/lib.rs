//! Shared utilities for shopfloor
//!
//! This crate provides:
//! - ID types (MachineId, OperatorId)
//! - Time utilities (injectable clocks, mock time, duration formatting)
//! - Default paths for config and data directories

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
