//! Store trait definitions

use chrono::{DateTime, Utc};
use shopfloor_util::{MachineId, OperatorId};

use crate::{AuditEvent, ExpiredLease, Lease, Machine, NewMachine, Operator, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Registry

    /// Register an operator
    fn insert_operator(&self, operator: &Operator) -> StoreResult<()>;

    /// Look up an operator
    fn get_operator(&self, id: OperatorId) -> StoreResult<Option<Operator>>;

    /// Register a machine (without a lease)
    fn insert_machine(&self, machine: &NewMachine) -> StoreResult<Machine>;

    /// Look up a machine with its current lease
    fn get_machine(&self, id: MachineId) -> StoreResult<Option<Machine>>;

    /// All machines ordered by workshop then name
    fn list_machines(&self) -> StoreResult<Vec<Machine>>;

    // Leases

    /// Overwrite the lease on a machine. Returns false if the machine does not exist.
    fn set_lease(&self, id: MachineId, lease: &Lease) -> StoreResult<bool>;

    /// Remove any lease from a machine. Returns false if the machine does not exist.
    fn clear_lease(&self, id: MachineId) -> StoreResult<bool>;

    /// Leases whose `auto_remove_at <= now`
    fn expired_leases(&self, now: DateTime<Utc>) -> StoreResult<Vec<ExpiredLease>>;

    /// Remove a lease only if it still expires at `auto_remove_at`.
    ///
    /// Returns false when the lease was cleared or replaced since it was read.
    fn clear_lease_if_expires_at(
        &self,
        id: MachineId,
        auto_remove_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    // Connection management

    /// Replace a possibly stale connection before long-running background work
    fn refresh_connection(&self) -> StoreResult<()> {
        Ok(())
    }

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
