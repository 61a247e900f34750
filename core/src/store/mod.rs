//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database. Domain modules and the
//! engine call typed store methods — they never execute SQL directly.

mod batch;
mod clawback;
mod disbursement;
mod rates;
mod statement;
mod suspense;

use crate::batch::BatchStatus;
use crate::calculator::CommissionType;
use crate::clawback::{ClawbackStatus, ClawbackTrigger, RecoveryStatus};
use crate::disbursement::DisbursementStatus;
use crate::error::PayoutResult;
use crate::event::{EventLogEntry, PayoutEvent};
use crate::statement::{FinalStatementStatus, TrialStatementStatus};
use crate::suspense::{SuspensePriority, SuspenseReason, SuspenseStatus};
use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ToSql};

pub struct PayoutStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl PayoutStore {
    pub fn open(path: &str) -> PayoutResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PayoutResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database. In-memory stores get a
    /// fresh isolated database.
    pub fn reopen(&self) -> PayoutResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PayoutResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/002_batches.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/003_statements.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/004_disbursements.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/005_clawbacks.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/006_suspense.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(
        &self,
        entity_id: &str,
        event: &PayoutEvent,
        occurred_at: NaiveDateTime,
    ) -> PayoutResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (entity_id, event_type, payload, occurred_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entity_id,
                event.type_name(),
                serde_json::to_string(event)?,
                occurred_at,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_entity(&self, entity_id: &str) -> PayoutResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity_id, event_type, payload, occurred_at
             FROM event_log WHERE entity_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![entity_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    entity_id: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: row.get(3)?,
                    occurred_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, event_type: &str) -> PayoutResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
                params![event_type],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}

// ── SQL mapping for status enums ───────────────────────────────
// Every status is stored as its canonical TEXT form.

macro_rules! sql_text_enum {
    ($($ty:ty),+ $(,)?) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                <$ty>::parse(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    )+};
}

sql_text_enum!(
    BatchStatus,
    CommissionType,
    TrialStatementStatus,
    FinalStatementStatus,
    DisbursementStatus,
    ClawbackStatus,
    ClawbackTrigger,
    RecoveryStatus,
    SuspenseReason,
    SuspensePriority,
    SuspenseStatus,
);
