//! Events emitted when leases change

use chrono::{DateTime, Utc};
use shopfloor_util::{MachineId, OperatorId};

/// Lease lifecycle events, broadcast to any subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseEvent {
    /// Operator assigned (possibly displacing another)
    Assigned {
        machine_id: MachineId,
        operator: OperatorId,
        replaced: Option<OperatorId>,
        auto_remove_at: DateTime<Utc>,
    },

    /// Lease removed on request
    Cleared {
        machine_id: MachineId,
        operator: OperatorId,
    },

    /// Lease revoked by the sweeper
    Expired {
        machine_id: MachineId,
        operator: OperatorId,
        auto_remove_at: DateTime<Utc>,
    },

    /// A sweep failed; the next tick retries
    SweepFailed { error: String },
}
