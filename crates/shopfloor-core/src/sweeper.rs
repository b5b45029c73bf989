//! Expiry sweeper: periodically revokes leases whose `auto_remove_at` has passed.
//!
//! The sweeper has two states. It is idle while waiting on its interval timer
//! and scanning while a sweep runs; every sweep returns it to idle whatever the
//! outcome. A failed sweep is logged and retried on the next tick, so the loop
//! only ends when its cancellation token fires.

use shopfloor_store::{AuditEvent, AuditEventType, Store, StoreResult};
use shopfloor_util::{Clock, MachineId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::LeaseEvent;

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Leases found past their expiry
    pub found: usize,

    /// Machines whose lease was revoked
    pub cleared: Vec<MachineId>,

    /// Leases reassigned or cleared between the scan and the revoke
    pub skipped: usize,
}

/// Scans the store for expired leases and clears them
pub struct Sweeper {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    events: broadcast::Sender<LeaseEvent>,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        events: broadcast::Sender<LeaseEvent>,
    ) -> Self {
        Self {
            store,
            clock,
            interval,
            events,
        }
    }

    /// Run a single sweep at the clock's current time.
    pub fn sweep_once(&self) -> StoreResult<SweepReport> {
        // The sweeper outlives any single request, so never trust the previous handle
        self.store.refresh_connection()?;

        let now = self.clock.now();
        let expired = self.store.expired_leases(now)?;

        let mut report = SweepReport {
            found: expired.len(),
            ..Default::default()
        };

        if report.found > 0 {
            info!(count = report.found, "Found machines with expired operator assignments");
        }

        for entry in expired {
            // Only clear the exact lease we read; a concurrent re-assignment wins
            if !self
                .store
                .clear_lease_if_expires_at(entry.machine_id, entry.lease.auto_remove_at)?
            {
                debug!(
                    machine_id = %entry.machine_id,
                    "Lease changed since scan, leaving it in place"
                );
                report.skipped += 1;
                continue;
            }

            info!(
                machine_id = %entry.machine_id,
                operator_id = %entry.lease.operator,
                auto_remove_at = %entry.lease.auto_remove_at,
                "Cleared expired operator from machine"
            );

            if let Err(e) = self.store.append_audit(AuditEvent::at(
                now,
                AuditEventType::LeaseExpired {
                    machine_id: entry.machine_id,
                    operator: entry.lease.operator,
                    auto_remove_at: entry.lease.auto_remove_at,
                },
            )) {
                warn!(error = %e, machine_id = %entry.machine_id, "Failed to audit lease expiry");
            }

            let _ = self.events.send(LeaseEvent::Expired {
                machine_id: entry.machine_id,
                operator: entry.lease.operator,
                auto_remove_at: entry.lease.auto_remove_at,
            });

            report.cleared.push(entry.machine_id);
        }

        Ok(report)
    }

    /// Record a failed sweep. Never propagates.
    fn report_failure(&self, message: String) {
        error!(error = %message, "Error checking expired operators");

        if let Err(e) = self.store.append_audit(AuditEvent::at(
            self.clock.now(),
            AuditEventType::SweepFailed {
                error: message.clone(),
            },
        )) {
            debug!(error = %e, "Failed to audit sweep failure");
        }

        let _ = self.events.send(LeaseEvent::SweepFailed { error: message });
    }

    /// Sweep every interval until `cancel` fires. The first sweep runs immediately.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            "Starting operator lease sweeper"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Operator lease sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let sweeper = Arc::clone(&self);
                    // rusqlite is blocking; keep it off the async workers
                    match tokio::task::spawn_blocking(move || sweeper.sweep_once()).await {
                        Ok(Ok(report)) => {
                            debug!(
                                found = report.found,
                                cleared = report.cleared.len(),
                                skipped = report.skipped,
                                "Sweep complete"
                            );
                        }
                        Ok(Err(e)) => self.report_failure(e.to_string()),
                        Err(e) => self.report_failure(format!("sweep task failed: {}", e)),
                    }
                }
            }
        }
    }
}
