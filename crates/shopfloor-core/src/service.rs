//! Lease store operations: assign and clear operator leases on machines

use chrono::SubsecRound;
use shopfloor_config::LeaseSettings;
use shopfloor_store::{AuditEvent, AuditEventType, Lease, Machine, Store, StoreResult};
use shopfloor_util::{add_duration, Clock, MachineId, OperatorId};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{LeaseError, LeaseEvent, LeaseResult, SweepReport, Sweeper, SweeperSupervisor};

const EVENT_CAPACITY: usize = 64;

/// Grants and revokes operator leases, and owns the expiry sweeper
pub struct LeaseService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    lease_duration: Duration,
    supervisor: SweeperSupervisor,
    events: broadcast::Sender<LeaseEvent>,
}

impl LeaseService {
    /// Create the service. The sweeper is spawned on `runtime` when first needed.
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        settings: LeaseSettings,
        runtime: Handle,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let sweeper = Sweeper::new(
            store.clone(),
            clock.clone(),
            settings.sweep_interval,
            events.clone(),
        );

        info!(
            lease_secs = settings.duration.as_secs(),
            sweep_interval_secs = settings.sweep_interval.as_secs(),
            "Lease service initialized"
        );

        Self {
            store,
            clock,
            lease_duration: settings.duration,
            supervisor: SweeperSupervisor::new(Arc::new(sweeper), runtime),
            events,
        }
    }

    /// Subscribe to lease events
    pub fn subscribe(&self) -> broadcast::Receiver<LeaseEvent> {
        self.events.subscribe()
    }

    /// The sweeper start-guard
    pub fn supervisor(&self) -> &SweeperSupervisor {
        &self.supervisor
    }

    /// Look up a machine with its current lease
    pub fn machine(&self, id: MachineId) -> LeaseResult<Machine> {
        self.store
            .get_machine(id)?
            .ok_or(LeaseError::MachineNotFound(id))
    }

    /// Assign `operator` to `machine_id` for one lease duration.
    ///
    /// Any existing lease on the machine is replaced. The operator may hold
    /// leases on other machines at the same time.
    pub fn assign(&self, machine_id: MachineId, operator: OperatorId) -> LeaseResult<Machine> {
        let previous = self.machine(machine_id)?;
        if self.store.get_operator(operator)?.is_none() {
            return Err(LeaseError::OperatorNotFound(operator));
        }

        // Timestamps persist at microsecond precision
        let now = self.clock.now().trunc_subsecs(6);
        let lease = Lease {
            operator,
            assigned_at: now,
            auto_remove_at: add_duration(now, self.lease_duration),
        };

        if !self.store.set_lease(machine_id, &lease)? {
            return Err(LeaseError::MachineNotFound(machine_id));
        }

        self.supervisor.ensure_running();

        let replaced = previous.operator().filter(|prev| *prev != operator);
        if let Some(prev) = replaced {
            debug!(machine_id = %machine_id, previous_operator = %prev, "Displacing previous operator");
        }

        self.audit(AuditEvent::at(
            now,
            AuditEventType::LeaseAssigned {
                machine_id,
                operator,
                replaced,
                auto_remove_at: lease.auto_remove_at,
            },
        ));
        let _ = self.events.send(LeaseEvent::Assigned {
            machine_id,
            operator,
            replaced,
            auto_remove_at: lease.auto_remove_at,
        });

        info!(
            machine_id = %machine_id,
            operator_id = %operator,
            auto_remove_at = %lease.auto_remove_at,
            "Operator assigned to machine"
        );

        self.machine(machine_id)
    }

    /// Remove any lease from `machine_id`. Clearing an unassigned machine is a no-op.
    pub fn clear(&self, machine_id: MachineId) -> LeaseResult<Machine> {
        let previous = self.machine(machine_id)?;

        if !self.store.clear_lease(machine_id)? {
            return Err(LeaseError::MachineNotFound(machine_id));
        }

        if let Some(operator) = previous.operator() {
            self.audit(AuditEvent::at(
                self.clock.now(),
                AuditEventType::LeaseCleared {
                    machine_id,
                    operator,
                },
            ));
            let _ = self.events.send(LeaseEvent::Cleared {
                machine_id,
                operator,
            });
        }

        info!(machine_id = %machine_id, "Cleared operator from machine");

        self.machine(machine_id)
    }

    /// Run one sweep on the calling thread, outside the background schedule
    pub fn sweep_now(&self) -> StoreResult<SweepReport> {
        self.supervisor.sweeper().sweep_once()
    }

    /// Stop the sweeper and wait for it
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }

    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.store.append_audit(event) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}
