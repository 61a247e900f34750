use super::PayoutStore;
use crate::error::PayoutResult;
use crate::suspense::SuspenseAccount;
use rusqlite::{params, OptionalExtension, Row};

fn suspense_from_row(row: &Row<'_>) -> rusqlite::Result<SuspenseAccount> {
    Ok(SuspenseAccount {
        suspense_id: row.get(0)?,
        policy_no: row.get(1)?,
        agent_id: row.get(2)?,
        amount: row.get(3)?,
        reason: row.get(4)?,
        priority: row.get(5)?,
        suspense_date: row.get(6)?,
        resolution_deadline: row.get(7)?,
        status: row.get(8)?,
        workflow_id: row.get(9)?,
        description: row.get(10)?,
        resolved_at: row.get(11)?,
        resolution_remarks: row.get(12)?,
    })
}

const SUSPENSE_COLUMNS: &str = "suspense_id, policy_no, agent_id, amount, reason, priority,
    suspense_date, resolution_deadline, status, workflow_id, description, resolved_at,
    resolution_remarks";

impl PayoutStore {
    pub fn insert_suspense(&self, suspense: &SuspenseAccount) -> PayoutResult<()> {
        self.conn.execute(
            "INSERT INTO suspense_account (
                suspense_id, policy_no, agent_id, amount, reason, priority,
                suspense_date, resolution_deadline, status, workflow_id,
                description, resolved_at, resolution_remarks
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                suspense.suspense_id,
                suspense.policy_no,
                suspense.agent_id,
                suspense.amount,
                suspense.reason,
                suspense.priority,
                suspense.suspense_date,
                suspense.resolution_deadline,
                suspense.status,
                suspense.workflow_id,
                suspense.description,
                suspense.resolved_at,
                suspense.resolution_remarks,
            ],
        )?;
        Ok(())
    }

    pub fn get_suspense(&self, suspense_id: &str) -> PayoutResult<SuspenseAccount> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SUSPENSE_COLUMNS} FROM suspense_account WHERE suspense_id = ?1"
                ),
                params![suspense_id],
                suspense_from_row,
            )
            .map_err(Into::into)
    }

    /// Replay probe: suspense creation deduplicates on the workflow id.
    pub fn suspense_for_workflow(
        &self,
        workflow_id: &str,
    ) -> PayoutResult<Option<SuspenseAccount>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SUSPENSE_COLUMNS} FROM suspense_account WHERE workflow_id = ?1"
                ),
                params![workflow_id],
                suspense_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn open_suspense_entries(&self) -> PayoutResult<Vec<SuspenseAccount>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUSPENSE_COLUMNS} FROM suspense_account
             WHERE status = 'OPEN' ORDER BY suspense_date ASC"
        ))?;
        let entries = stmt
            .query_map([], suspense_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn update_suspense(&self, suspense: &SuspenseAccount) -> PayoutResult<()> {
        self.conn.execute(
            "UPDATE suspense_account
             SET status = ?1, resolved_at = ?2, resolution_remarks = ?3
             WHERE suspense_id = ?4",
            params![
                suspense.status,
                suspense.resolved_at,
                suspense.resolution_remarks,
                suspense.suspense_id,
            ],
        )?;
        Ok(())
    }

    pub fn open_suspense_count(&self) -> PayoutResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM suspense_account WHERE status = 'OPEN'",
                [],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
