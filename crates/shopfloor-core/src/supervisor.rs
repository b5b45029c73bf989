//! Keeps exactly one sweeper task alive per process.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Sweeper;

/// Identity of one spawned sweeper task. Increases with every (re)start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SweeperInstance(u64);

impl fmt::Display for SweeperInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sweeper-{}", self.0)
    }
}

struct RunningSweeper {
    instance: SweeperInstance,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningSweeper {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Start-guard and owner of the sweeper task.
///
/// `ensure_running` is idempotent and can be called from synchronous code:
/// the task is spawned on the runtime handle captured at construction.
pub struct SweeperSupervisor {
    sweeper: Arc<Sweeper>,
    runtime: Handle,
    current: Mutex<Option<RunningSweeper>>,
    next_instance: AtomicU64,
}

impl SweeperSupervisor {
    pub fn new(sweeper: Arc<Sweeper>, runtime: Handle) -> Self {
        Self {
            sweeper,
            runtime,
            current: Mutex::new(None),
            next_instance: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<RunningSweeper>> {
        // The guarded state is a handle; it stays meaningful after a panic elsewhere
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start the sweeper unless a live instance already exists.
    pub fn ensure_running(&self) -> SweeperInstance {
        let mut current = self.lock();

        if let Some(running) = current.as_ref()
            && running.is_alive()
        {
            return running.instance;
        }

        let instance = SweeperInstance(self.next_instance.fetch_add(1, Ordering::SeqCst));
        let cancel = CancellationToken::new();
        let handle = self
            .runtime
            .spawn(Arc::clone(&self.sweeper).run(cancel.clone()));

        info!(%instance, "Started operator lease sweeper");

        *current = Some(RunningSweeper {
            instance,
            cancel,
            handle,
        });
        instance
    }

    /// The sweeper this supervisor runs
    pub fn sweeper(&self) -> &Arc<Sweeper> {
        &self.sweeper
    }

    /// Whether a sweeper task is currently alive
    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(RunningSweeper::is_alive)
    }

    /// The live instance, if any
    pub fn current_instance(&self) -> Option<SweeperInstance> {
        self.lock()
            .as_ref()
            .filter(|running| running.is_alive())
            .map(|running| running.instance)
    }

    /// Cancel the sweeper and wait for it to finish.
    ///
    /// Returns the instance that was stopped, if one was running.
    pub async fn shutdown(&self) -> Option<SweeperInstance> {
        let running = self.lock().take()?;
        running.cancel.cancel();

        if let Err(e) = running.handle.await {
            warn!(instance = %running.instance, error = %e, "Sweeper task ended abnormally");
        }

        info!(instance = %running.instance, "Operator lease sweeper stopped");
        Some(running.instance)
    }
}

impl Drop for SweeperSupervisor {
    fn drop(&mut self) {
        if let Some(running) = self.lock().take() {
            running.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfloor_store::SqliteStore;
    use shopfloor_util::SystemClock;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn supervisor() -> SweeperSupervisor {
        let (events, _) = broadcast::channel(16);
        let sweeper = Sweeper::new(
            Arc::new(SqliteStore::in_memory().unwrap()),
            Arc::new(SystemClock),
            Duration::from_secs(300),
            events,
        );
        SweeperSupervisor::new(Arc::new(sweeper), Handle::current())
    }

    #[tokio::test]
    async fn test_ensure_running_is_idempotent() {
        let supervisor = supervisor();
        assert!(!supervisor.is_running());

        let first = supervisor.ensure_running();
        let second = supervisor.ensure_running();

        assert_eq!(first, second);
        assert!(supervisor.is_running());
        assert_eq!(supervisor.current_instance(), Some(first));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_then_restart() {
        let supervisor = supervisor();
        let first = supervisor.ensure_running();

        assert_eq!(supervisor.shutdown().await, Some(first));
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.current_instance(), None);
        assert_eq!(supervisor.shutdown().await, None);

        let second = supervisor.ensure_running();
        assert!(second > first);
        assert!(supervisor.is_running());

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_dead_task_is_replaced() {
        let supervisor = supervisor();
        let first = supervisor.ensure_running();

        // Stop the task behind the supervisor's back
        let cancel = supervisor.lock().as_ref().unwrap().cancel.clone();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), async {
            while supervisor.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let second = supervisor.ensure_running();
        assert_ne!(first, second);
        assert!(supervisor.is_running());

        supervisor.shutdown().await;
    }
}
