//! Row types persisted by the store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfloor_util::{MachineId, OperatorId};
use std::fmt;
use std::str::FromStr;

/// Operational status of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Operational,
    #[default]
    Idle,
    Maintenance,
    Broken,
}

impl MachineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Operational => "OPERATIONAL",
            MachineStatus::Idle => "IDLE",
            MachineStatus::Maintenance => "MAINTENANCE",
            MachineStatus::Broken => "BROKEN",
        }
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OPERATIONAL" => Ok(MachineStatus::Operational),
            "IDLE" => Ok(MachineStatus::Idle),
            "MAINTENANCE" => Ok(MachineStatus::Maintenance),
            "BROKEN" => Ok(MachineStatus::Broken),
            other => Err(format!("unknown machine status '{}'", other)),
        }
    }
}

/// A time-bounded assignment of one operator to one machine.
///
/// A machine either has all three fields or none of them, which is why they
/// live together in one optional struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub operator: OperatorId,
    pub assigned_at: DateTime<Utc>,
    pub auto_remove_at: DateTime<Utc>,
}

/// A machine on the shop floor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
    pub model_number: Option<String>,
    pub workshop: String,
    pub status: MachineStatus,
    pub lease: Option<Lease>,
}

impl Machine {
    pub fn operator(&self) -> Option<OperatorId> {
        self.lease.as_ref().map(|l| l.operator)
    }
}

/// Fields needed to register a machine
#[derive(Debug, Clone)]
pub struct NewMachine {
    pub id: MachineId,
    pub name: String,
    pub model_number: Option<String>,
    pub workshop: String,
    pub status: MachineStatus,
}

impl NewMachine {
    pub fn new(id: MachineId, name: impl Into<String>, workshop: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            model_number: None,
            workshop: workshop.into(),
            status: MachineStatus::default(),
        }
    }
}

/// A user who can be assigned to machines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub username: String,
}

/// A lease found past its expiry during a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredLease {
    pub machine_id: MachineId,
    pub lease: Lease,
}
