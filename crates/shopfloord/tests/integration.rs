//! Integration tests for shopfloord
//!
//! These tests verify the end-to-end lease behavior: assignment, the running
//! sweeper, failure recovery and the single-instance start-guard.

use chrono::{DateTime, TimeZone, Utc};
use shopfloor_config::LeaseSettings;
use shopfloor_core::{LeaseService, SweepReport};
use shopfloor_store::{
    AuditEvent, AuditEventType, ExpiredLease, FaultyStore, Lease, Machine, NewMachine, Operator,
    SqliteStore, Store, StoreResult,
};
use shopfloor_util::{ManualClock, MachineId, OperatorId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap()
}

fn seed(store: &dyn Store) {
    store
        .insert_operator(&Operator {
            id: OperatorId::new(3),
            username: "amara".into(),
        })
        .unwrap();
    store
        .insert_machine(&NewMachine::new(MachineId::new(7), "Lathe", "North"))
        .unwrap();
}

fn seeded_store() -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    seed(store.as_ref());
    store
}

fn fast_settings() -> LeaseSettings {
    LeaseSettings {
        duration: Duration::from_secs(8 * 3600),
        sweep_interval: Duration::from_millis(20),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn lease_of(store: &dyn Store, id: i64) -> Option<Lease> {
    store.get_machine(MachineId::new(id)).unwrap().unwrap().lease
}

#[tokio::test]
async fn test_lease_scenario_with_manual_sweeps() {
    let clock = ManualClock::new(t0());
    let store = seeded_store();
    let service = LeaseService::new(
        store.clone(),
        Arc::new(clock.clone()),
        LeaseSettings::default(),
        Handle::current(),
    );

    let machine = service.assign(MachineId::new(7), OperatorId::new(3)).unwrap();
    let lease = machine.lease.clone().unwrap();
    assert_eq!(lease.operator, OperatorId::new(3));
    assert_eq!(lease.assigned_at, t0());
    assert_eq!(lease.auto_remove_at, t0() + chrono::Duration::hours(8));

    // One hour in: nothing to revoke
    clock.set(t0() + chrono::Duration::hours(1));
    assert_eq!(service.sweep_now().unwrap(), SweepReport::default());
    assert_eq!(service.machine(MachineId::new(7)).unwrap(), machine);

    // Just past expiry: revoked
    clock.set(t0() + chrono::Duration::hours(8) + chrono::Duration::seconds(1));
    let report = service.sweep_now().unwrap();
    assert_eq!(report.cleared, vec![MachineId::new(7)]);
    assert!(lease_of(store.as_ref(), 7).is_none());

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_sweeper_revokes_expired_lease() {
    let clock = ManualClock::new(t0());
    let store = seeded_store();
    let service = LeaseService::new(
        store.clone(),
        Arc::new(clock.clone()),
        fast_settings(),
        Handle::current(),
    );
    let mut events = service.subscribe();

    service.assign(MachineId::new(7), OperatorId::new(3)).unwrap();
    assert!(service.supervisor().is_running());

    // Several sweeps go by without touching the live lease
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(lease_of(store.as_ref(), 7).is_some());

    clock.advance(Duration::from_secs(8 * 3600 + 1));
    wait_until(|| lease_of(store.as_ref(), 7).is_none()).await;

    // Assigned, then expired
    events.recv().await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        shopfloor_core::LeaseEvent::Expired { machine_id, .. } if machine_id == MachineId::new(7)
    ));

    service.shutdown().await;
    assert!(!service.supervisor().is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sweeper_survives_scan_failures() {
    let clock = ManualClock::new(t0());
    let inner = seeded_store();
    let store = Arc::new(FaultyStore::new(inner.clone()));
    let service = LeaseService::new(
        store.clone(),
        Arc::new(clock.clone()),
        fast_settings(),
        Handle::current(),
    );

    store.set_fail_scans(true);
    service.assign(MachineId::new(7), OperatorId::new(3)).unwrap();
    let instance = service.supervisor().current_instance();
    clock.advance(Duration::from_secs(9 * 3600));

    wait_until(|| store.scan_attempts() >= 3).await;
    assert!(service.supervisor().is_running());
    assert_eq!(service.supervisor().current_instance(), instance);
    assert!(lease_of(inner.as_ref(), 7).is_some());

    let audits = inner.get_recent_audits(50).unwrap();
    assert!(audits
        .iter()
        .any(|a| matches!(a.event, AuditEventType::SweepFailed { .. })));

    // Store recovers; the same sweeper instance finishes the job
    store.set_fail_scans(false);
    wait_until(|| lease_of(inner.as_ref(), 7).is_none()).await;
    assert_eq!(service.supervisor().current_instance(), instance);

    service.shutdown().await;
}

#[tokio::test]
async fn test_start_guard_keeps_single_instance() {
    let clock = ManualClock::new(t0());
    let service = LeaseService::new(
        seeded_store(),
        Arc::new(clock.clone()),
        LeaseSettings::default(),
        Handle::current(),
    );

    // Startup call, then the redundant calls from assignments
    let first = service.supervisor().ensure_running();
    let second = service.supervisor().ensure_running();
    service.assign(MachineId::new(7), OperatorId::new(3)).unwrap();

    assert_eq!(first, second);
    assert_eq!(service.supervisor().current_instance(), Some(first));

    assert_eq!(service.supervisor().shutdown().await, Some(first));
    let restarted = service.supervisor().ensure_running();
    assert!(restarted > first);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_backed_store_sweeps_across_reconnects() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("shopfloor.db");
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    seed(store.as_ref());

    let clock = ManualClock::new(t0());
    let service = LeaseService::new(
        store.clone(),
        Arc::new(clock.clone()),
        fast_settings(),
        Handle::current(),
    );
    service.assign(MachineId::new(7), OperatorId::new(3)).unwrap();

    // A second handle, like the admin CLI, sees the lease
    let other = SqliteStore::open(&db_path).unwrap();
    assert!(lease_of(&other, 7).is_some());

    clock.advance(Duration::from_secs(8 * 3600));
    wait_until(|| lease_of(&other, 7).is_none()).await;

    service.shutdown().await;
}

/// Store that re-assigns machine 7 right after each expiry scan reads it,
/// as a concurrent request would.
struct RacingStore {
    inner: Arc<SqliteStore>,
    fresh_lease: Lease,
    raced: AtomicBool,
}

impl Store for RacingStore {
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
        self.inner.set_lease(id, lease)
    }

    fn clear_lease(&self, id: MachineId) -> StoreResult<bool> {
        self.inner.clear_lease(id)
    }

    fn expired_leases(&self, now: DateTime<Utc>) -> StoreResult<Vec<ExpiredLease>> {
        let expired = self.inner.expired_leases(now)?;
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.set_lease(MachineId::new(7), &self.fresh_lease)?;
        }
        Ok(expired)
    }

    fn clear_lease_if_expires_at(
        &self,
        id: MachineId,
        auto_remove_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner.clear_lease_if_expires_at(id, auto_remove_at)
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

#[tokio::test]
async fn test_reassignment_during_sweep_is_not_revoked() {
    let inner = seeded_store();
    let stale = Lease {
        operator: OperatorId::new(3),
        assigned_at: t0(),
        auto_remove_at: t0() + chrono::Duration::hours(8),
    };
    inner.set_lease(MachineId::new(7), &stale).unwrap();

    let now = t0() + chrono::Duration::hours(9);
    let fresh = Lease {
        operator: OperatorId::new(3),
        assigned_at: now,
        auto_remove_at: now + chrono::Duration::hours(8),
    };
    let store = Arc::new(RacingStore {
        inner: inner.clone(),
        fresh_lease: fresh.clone(),
        raced: AtomicBool::new(false),
    });

    let service = LeaseService::new(
        store,
        Arc::new(ManualClock::new(now)),
        LeaseSettings::default(),
        Handle::current(),
    );

    let report = service.sweep_now().unwrap();
    assert_eq!(report.found, 1);
    assert_eq!(report.skipped, 1);
    assert!(report.cleared.is_empty());
    assert_eq!(lease_of(inner.as_ref(), 7), Some(fresh));
}
