//! shopfloord - The shopfloor lease service
//!
//! This is the main entry point for the shopfloor service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Lease service and expiry sweeper
//! - Administrative subcommands for the machine registry and leases

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shopfloor_config::{load_config_or_default, ServiceConfig};
use shopfloor_core::{LeaseEvent, LeaseService};
use shopfloor_store::{
    AuditEvent, AuditEventType, MachineStatus, NewMachine, Operator, SqliteStore, Store,
};
use shopfloor_util::{default_config_path, MachineId, OperatorId, SystemClock, DATABASE_FILENAME};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// shopfloord - Machine operator lease service
#[derive(Parser, Debug)]
#[command(name = "shopfloord")]
#[command(about = "Machine operator lease service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/shopfloor/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set SHOPFLOOR_DATA_DIR env var)
    #[arg(short, long, env = "SHOPFLOOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (overrides the config file; RUST_LOG wins over both)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the expiry sweeper until a termination signal arrives
    Serve,

    /// Assign an operator to a machine for one lease duration
    Assign {
        #[arg(long)]
        machine: MachineId,
        #[arg(long)]
        operator: OperatorId,
    },

    /// Clear the operator assignment on a machine
    Clear {
        #[arg(long)]
        machine: MachineId,
    },

    /// Show one machine and its lease
    Show {
        #[arg(long)]
        machine: MachineId,
    },

    /// List all machines
    List,

    /// Run a single expiry sweep now
    Sweep,

    /// Register a machine
    AddMachine {
        #[arg(long)]
        id: MachineId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        workshop: String,
        #[arg(long)]
        model_number: Option<String>,
        #[arg(long, default_value_t = MachineStatus::Idle)]
        status: MachineStatus,
    },

    /// Register an operator
    AddOperator {
        #[arg(long)]
        id: OperatorId,
        #[arg(long)]
        username: String,
    },

    /// Print recent audit events
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Main service state
struct Service {
    leases: LeaseService,
    store: Arc<dyn Store>,
}

impl Service {
    fn new(args: &Args, config: &ServiceConfig) -> Result<Self> {
        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join(DATABASE_FILENAME);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        debug!(db_path = %db_path.display(), "Store initialized");

        let leases = LeaseService::new(
            store.clone(),
            Arc::new(SystemClock),
            config.leases,
            Handle::current(),
        );

        Ok(Self { leases, store })
    }

    /// Run until SIGTERM, SIGINT or SIGHUP, then stop the sweeper cleanly
    async fn serve(&self) -> Result<()> {
        self.store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let mut events = self.leases.subscribe();
        let instance = self.leases.supervisor().ensure_running();

        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        info!(%instance, "Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => Self::handle_lease_event(event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Lease event subscriber fell behind");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!("Shutting down shopfloord");
        self.leases.shutdown().await;

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    fn handle_lease_event(event: LeaseEvent) {
        match event {
            LeaseEvent::Expired {
                machine_id,
                operator,
                auto_remove_at,
            } => {
                debug!(%machine_id, %operator, %auto_remove_at, "Lease expired");
            }
            LeaseEvent::SweepFailed { error } => {
                warn!(%error, "Sweep failed, retrying next interval");
            }
            other => debug!(event = ?other, "Lease event"),
        }
    }

    /// Serve, or run one administrative command and print its result as JSON
    async fn run(&self, command: Cmd) -> Result<()> {
        if let Cmd::Serve = command {
            return self.serve().await;
        }

        let result = self.execute(command);

        // `assign` starts a sweeper; it must not outlive this one-shot process
        self.leases.shutdown().await;

        println!("{}", result?);
        Ok(())
    }

    fn execute(&self, command: Cmd) -> Result<String> {
        let output = match command {
            Cmd::Serve => anyhow::bail!("serve is not a one-shot command"),
            Cmd::Assign { machine, operator } => {
                serde_json::to_string_pretty(&self.leases.assign(machine, operator)?)?
            }
            Cmd::Clear { machine } => serde_json::to_string_pretty(&self.leases.clear(machine)?)?,
            Cmd::Show { machine } => serde_json::to_string_pretty(&self.leases.machine(machine)?)?,
            Cmd::List => serde_json::to_string_pretty(&self.store.list_machines()?)?,
            Cmd::Sweep => {
                let report = self.leases.sweep_now()?;
                let cleared: Vec<i64> = report.cleared.iter().map(MachineId::get).collect();
                serde_json::to_string_pretty(&serde_json::json!({
                    "found": report.found,
                    "cleared": cleared,
                    "skipped": report.skipped,
                }))?
            }
            Cmd::AddMachine {
                id,
                name,
                workshop,
                model_number,
                status,
            } => {
                let machine = self.store.insert_machine(&NewMachine {
                    id,
                    name,
                    model_number,
                    workshop,
                    status,
                })?;
                serde_json::to_string_pretty(&machine)?
            }
            Cmd::AddOperator { id, username } => {
                let operator = Operator { id, username };
                self.store.insert_operator(&operator)?;
                serde_json::to_string_pretty(&operator)?
            }
            Cmd::Audit { limit } => {
                serde_json::to_string_pretty(&self.store.get_recent_audits(limit)?)?
            }
        };

        Ok(output)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging; stdout is reserved for command output
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.service.log_level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "shopfloord starting");

    let service = Service::new(&args, &config)?;
    service.run(args.command).await
}
