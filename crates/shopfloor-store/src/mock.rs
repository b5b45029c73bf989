//! Fault-injecting store wrapper for testing

use chrono::{DateTime, Utc};
use shopfloor_util::{MachineId, OperatorId};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::{
    AuditEvent, ExpiredLease, Lease, Machine, NewMachine, Operator, Store, StoreError,
    StoreResult,
};

/// Wraps a real store and fails selected operations on demand
pub struct FaultyStore {
    inner: Arc<dyn Store>,

    /// Make expiry scans (`expired_leases`) fail
    pub fail_scans: AtomicBool,

    /// Make lease writes (`set_lease`, `clear_lease`) fail
    pub fail_writes: AtomicBool,

    /// Number of expiry scans attempted, including failed ones
    pub scan_attempts: AtomicU64,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            fail_scans: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            scan_attempts: AtomicU64::new(0),
        }
    }

    pub fn set_fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn scan_attempts(&self) -> u64 {
        self.scan_attempts.load(Ordering::SeqCst)
    }

    fn check_writes(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected write failure".into()));
        }
        Ok(())
    }
}

impl Store for FaultyStore {
    fn insert_operator(&self, operator: &Operator) -> StoreResult<()> {
        self.inner.insert_operator(operator)
    }

    fn get_operator(&self, id: OperatorId) -> StoreResult<Option<Operator>> {
        self.inner.get_operator(id)
    }

    fn insert_machine(&self, machine: &NewMachine) -> StoreResult<Machine> {
        self.inner.insert_machine(machine)
    }

    fn get_machine(&self, id: MachineId) -> StoreResult<Option<Machine>> {
        self.inner.get_machine(id)
    }

    fn list_machines(&self) -> StoreResult<Vec<Machine>> {
        self.inner.list_machines()
    }

    fn set_lease(&self, id: MachineId, lease: &Lease) -> StoreResult<bool> {
        self.check_writes()?;
        self.inner.set_lease(id, lease)
    }

    fn clear_lease(&self, id: MachineId) -> StoreResult<bool> {
        self.check_writes()?;
        self.inner.clear_lease(id)
    }

    fn expired_leases(&self, now: DateTime<Utc>) -> StoreResult<Vec<ExpiredLease>> {
        self.scan_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected scan failure".into()));
        }
        self.inner.expired_leases(now)
    }

    fn clear_lease_if_expires_at(
        &self,
        id: MachineId,
        auto_remove_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner.clear_lease_if_expires_at(id, auto_remove_at)
    }

    fn refresh_connection(&self) -> StoreResult<()> {
        self.inner.refresh_connection()
    }

    fn append_audit(&self, event: AuditEvent) -> StoreResult<()> {
        self.inner.append_audit(event)
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        self.inner.get_recent_audits(limit)
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }
}
