//! Audit event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfloor_util::{MachineId, OperatorId};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Operator assigned to a machine
    LeaseAssigned {
        machine_id: MachineId,
        operator: OperatorId,
        /// Operator that was displaced by this assignment, if any
        replaced: Option<OperatorId>,
        auto_remove_at: DateTime<Utc>,
    },

    /// Lease removed on request
    LeaseCleared {
        machine_id: MachineId,
        operator: OperatorId,
    },

    /// Lease revoked by the sweeper
    LeaseExpired {
        machine_id: MachineId,
        operator: OperatorId,
        auto_remove_at: DateTime<Utc>,
    },

    /// A sweep failed and will be retried on the next tick
    SweepFailed { error: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self::at(shopfloor_util::now(), event)
    }

    /// Create an event stamped with an explicit time (e.g. from an injected clock)
    pub fn at(timestamp: DateTime<Utc>, event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }
}
