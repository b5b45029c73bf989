//! SQLite-based store implementation

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use shopfloor_util::{MachineId, OperatorId};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    AuditEvent, ExpiredLease, Lease, Machine, MachineStatus, NewMachine, Operator, Store,
    StoreError, StoreResult,
};

/// How long a writer waits on a lock held by another process (e.g. the admin CLI)
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MACHINE_COLUMNS: &str = "id, name, model_number, workshop, status, \
     operator_id, operator_assigned_at, operator_auto_remove_at";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// Backing file; `None` for in-memory stores
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = connect(Some(&path))?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = connect(None)?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Operators (users who can run machines)
            CREATE TABLE IF NOT EXISTS operators (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE
            );

            -- Machines with their embedded operator lease
            CREATE TABLE IF NOT EXISTS machines (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                model_number TEXT,
                workshop TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'IDLE',
                operator_id INTEGER REFERENCES operators(id),
                operator_assigned_at INTEGER,
                operator_auto_remove_at INTEGER,
                CHECK (
                    (operator_id IS NULL) = (operator_assigned_at IS NULL)
                    AND (operator_id IS NULL) = (operator_auto_remove_at IS NULL)
                )
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_machines_auto_remove
                ON machines(operator_auto_remove_at)
                WHERE operator_auto_remove_at IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn connect(path: Option<&Path>) -> StoreResult<Connection> {
    let conn = match path {
        Some(path) => Connection::open(path)?,
        None => Connection::open_in_memory()?,
    };
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

fn to_micros(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_micros()
}

fn conversion_error(idx: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(StoreError::Database(msg)))
}

fn from_micros(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| conversion_error(idx, Type::Integer, format!("timestamp out of range: {}", micros)))
}

/// Decode the three lease columns starting at `first`
fn lease_from_row(row: &Row<'_>, first: usize) -> rusqlite::Result<Option<Lease>> {
    let operator: Option<i64> = row.get(first)?;
    let assigned_at: Option<i64> = row.get(first + 1)?;
    let auto_remove_at: Option<i64> = row.get(first + 2)?;

    match (operator, assigned_at, auto_remove_at) {
        (Some(operator), Some(assigned_at), Some(auto_remove_at)) => Ok(Some(Lease {
            operator: OperatorId::new(operator),
            assigned_at: from_micros(first + 1, assigned_at)?,
            auto_remove_at: from_micros(first + 2, auto_remove_at)?,
        })),
        (None, None, None) => Ok(None),
        _ => Err(conversion_error(
            first,
            Type::Integer,
            "partially populated lease".into(),
        )),
    }
}

fn machine_from_row(row: &Row<'_>) -> rusqlite::Result<Machine> {
    let status: String = row.get(4)?;
    let status = status
        .parse::<MachineStatus>()
        .map_err(|e| conversion_error(4, Type::Text, e))?;

    Ok(Machine {
        id: MachineId::new(row.get(0)?),
        name: row.get(1)?,
        model_number: row.get(2)?,
        workshop: row.get(3)?,
        status,
        lease: lease_from_row(row, 5)?,
    })
}

impl Store for SqliteStore {
    fn insert_operator(&self, operator: &Operator) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO operators (id, username) VALUES (?, ?)",
            params![operator.id.get(), operator.username],
        )?;

        debug!(operator_id = %operator.id, username = %operator.username, "Operator registered");
        Ok(())
    }

    fn get_operator(&self, id: OperatorId) -> StoreResult<Option<Operator>> {
        let conn = self.conn()?;
        let operator = conn
            .query_row(
                "SELECT id, username FROM operators WHERE id = ?",
                [id.get()],
                |row| {
                    Ok(Operator {
                        id: OperatorId::new(row.get(0)?),
                        username: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(operator)
    }

    fn insert_machine(&self, machine: &NewMachine) -> StoreResult<Machine> {
        {
            let conn = self.conn()?;
            conn.execute(
                r#"
                INSERT INTO machines (id, name, model_number, workshop, status)
                VALUES (?, ?, ?, ?, ?)
                "#,
                params![
                    machine.id.get(),
                    machine.name,
                    machine.model_number,
                    machine.workshop,
                    machine.status.as_str(),
                ],
            )?;
        }

        debug!(machine_id = %machine.id, name = %machine.name, "Machine registered");
        self.get_machine(machine.id)?
            .ok_or_else(|| StoreError::NotFound(format!("machine {}", machine.id)))
    }

    fn get_machine(&self, id: MachineId) -> StoreResult<Option<Machine>> {
        let conn = self.conn()?;
        let machine = conn
            .query_row(
                &format!("SELECT {} FROM machines WHERE id = ?", MACHINE_COLUMNS),
                [id.get()],
                machine_from_row,
            )
            .optional()?;

        Ok(machine)
    }

    fn list_machines(&self) -> StoreResult<Vec<Machine>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM machines ORDER BY workshop, name",
            MACHINE_COLUMNS
        ))?;

        let machines = stmt
            .query_map([], machine_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(machines)
    }

    fn set_lease(&self, id: MachineId, lease: &Lease) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE machines
            SET operator_id = ?, operator_assigned_at = ?, operator_auto_remove_at = ?
            WHERE id = ?
            "#,
            params![
                lease.operator.get(),
                to_micros(lease.assigned_at),
                to_micros(lease.auto_remove_at),
                id.get(),
            ],
        )?;

        debug!(machine_id = %id, operator_id = %lease.operator, "Lease written");
        Ok(changed == 1)
    }

    fn clear_lease(&self, id: MachineId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE machines
            SET operator_id = NULL, operator_assigned_at = NULL, operator_auto_remove_at = NULL
            WHERE id = ?
            "#,
            [id.get()],
        )?;

        Ok(changed == 1)
    }

    fn expired_leases(&self, now: DateTime<Utc>) -> StoreResult<Vec<ExpiredLease>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, operator_id, operator_assigned_at, operator_auto_remove_at
            FROM machines
            WHERE operator_id IS NOT NULL
              AND operator_auto_remove_at IS NOT NULL
              AND operator_auto_remove_at <= ?
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([to_micros(now)], |row| {
            let machine_id = MachineId::new(row.get(0)?);
            Ok((machine_id, lease_from_row(row, 1)?))
        })?;

        let mut expired = Vec::new();
        for row in rows {
            if let (machine_id, Some(lease)) = row? {
                expired.push(ExpiredLease { machine_id, lease });
            }
        }

        Ok(expired)
    }

    fn clear_lease_if_expires_at(
        &self,
        id: MachineId,
        auto_remove_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE machines
            SET operator_id = NULL, operator_assigned_at = NULL, operator_auto_remove_at = NULL
            WHERE id = ? AND operator_auto_remove_at = ?
            "#,
            params![id.get(), to_micros(auto_remove_at)],
        )?;

        Ok(changed == 1)
    }

    fn refresh_connection(&self) -> StoreResult<()> {
        let mut conn = self.conn()?;

        match &self.path {
            Some(path) => {
                *conn = connect(Some(path))?;
                debug!(path = %path.display(), "Store connection reopened");
            }
            // Reopening an in-memory database would discard it
            None => {
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
            }
        }

        Ok(())
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    StoreError::Serialization(format!(
                        "audit event {} has invalid timestamp '{}': {}",
                        id, timestamp_str, e
                    ))
                })?;
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
