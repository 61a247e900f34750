use super::PayoutStore;
use crate::batch::{CommissionBatch, CommissionTransaction};
use crate::calculator::CommissionType;
use crate::error::PayoutResult;
use rusqlite::{params, OptionalExtension, Row};

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<CommissionBatch> {
    Ok(CommissionBatch {
        batch_id: row.get(0)?,
        month: row.get(1)?,
        year: row.get(2)?,
        status: row.get(3)?,
        total_policies: row.get(4)?,
        processed_records: row.get(5)?,
        failed_records: row.get(6)?,
        started_at: row.get(7)?,
        sla_deadline: row.get(8)?,
        completed_at: row.get(9)?,
        workflow_id: row.get(10)?,
    })
}

const BATCH_COLUMNS: &str = "batch_id, month, year, status, total_policies,
    processed_records, failed_records, started_at, sla_deadline, completed_at, workflow_id";

fn txn_from_row(row: &Row<'_>) -> rusqlite::Result<CommissionTransaction> {
    Ok(CommissionTransaction {
        txn_id: row.get(0)?,
        batch_id: row.get(1)?,
        policy_no: row.get(2)?,
        agent_id: row.get(3)?,
        commission_type: row.get(4)?,
        premium: row.get(5)?,
        applied_rate: row.get(6)?,
        tds_rate: row.get(7)?,
        gross_amount: row.get(8)?,
        tds_amount: row.get(9)?,
        net_amount: row.get(10)?,
        trial_statement_id: row.get(11)?,
        final_statement_id: row.get(12)?,
        disbursement_id: row.get(13)?,
        calculated_at: row.get(14)?,
    })
}

const TXN_COLUMNS: &str = "txn_id, batch_id, policy_no, agent_id, commission_type,
    premium, applied_rate, tds_rate, gross_amount, tds_amount, net_amount,
    trial_statement_id, final_statement_id, disbursement_id, calculated_at";

impl PayoutStore {
    // ── Batch ──────────────────────────────────────────────────

    pub fn insert_batch(&self, batch: &CommissionBatch) -> PayoutResult<()> {
        self.conn.execute(
            "INSERT INTO commission_batch (
                batch_id, month, year, status, total_policies,
                processed_records, failed_records, started_at, sla_deadline,
                completed_at, workflow_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                batch.batch_id,
                batch.month,
                batch.year,
                batch.status,
                batch.total_policies,
                batch.processed_records,
                batch.failed_records,
                batch.started_at,
                batch.sla_deadline,
                batch.completed_at,
                batch.workflow_id,
            ],
        )?;
        Ok(())
    }

    pub fn get_batch(&self, batch_id: &str) -> PayoutResult<CommissionBatch> {
        self.conn
            .query_row(
                &format!("SELECT {BATCH_COLUMNS} FROM commission_batch WHERE batch_id = ?1"),
                params![batch_id],
                batch_from_row,
            )
            .map_err(Into::into)
    }

    /// The non-terminal batch for a period, if any. At most one can exist.
    pub fn find_open_batch(&self, month: u32, year: i32) -> PayoutResult<Option<CommissionBatch>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {BATCH_COLUMNS} FROM commission_batch
                     WHERE month = ?1 AND year = ?2
                       AND status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')
                     LIMIT 1"
                ),
                params![month, year],
                batch_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn update_batch(&self, batch: &CommissionBatch) -> PayoutResult<()> {
        self.conn.execute(
            "UPDATE commission_batch
             SET status = ?1, processed_records = ?2, failed_records = ?3, completed_at = ?4
             WHERE batch_id = ?5",
            params![
                batch.status,
                batch.processed_records,
                batch.failed_records,
                batch.completed_at,
                batch.batch_id,
            ],
        )?;
        Ok(())
    }

    // ── Commission transactions ────────────────────────────────

    pub fn insert_transaction(&self, txn: &CommissionTransaction) -> PayoutResult<()> {
        self.conn.execute(
            "INSERT INTO commission_transaction (
                txn_id, batch_id, policy_no, agent_id, commission_type,
                premium, applied_rate, tds_rate, gross_amount, tds_amount,
                net_amount, trial_statement_id, final_statement_id,
                disbursement_id, calculated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                txn.txn_id,
                txn.batch_id,
                txn.policy_no,
                txn.agent_id,
                txn.commission_type,
                txn.premium,
                txn.applied_rate,
                txn.tds_rate,
                txn.gross_amount,
                txn.tds_amount,
                txn.net_amount,
                txn.trial_statement_id,
                txn.final_statement_id,
                txn.disbursement_id,
                txn.calculated_at,
            ],
        )?;
        Ok(())
    }

    /// The idempotency probe for commission calculation: one row per
    /// (batch, policy, commission type).
    pub fn find_transaction(
        &self,
        batch_id: &str,
        policy_no: &str,
        commission_type: CommissionType,
    ) -> PayoutResult<Option<CommissionTransaction>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {TXN_COLUMNS} FROM commission_transaction
                     WHERE batch_id = ?1 AND policy_no = ?2 AND commission_type = ?3"
                ),
                params![batch_id, policy_no, commission_type],
                txn_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn transactions_for_batch(&self, batch_id: &str) -> PayoutResult<Vec<CommissionTransaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TXN_COLUMNS} FROM commission_transaction
             WHERE batch_id = ?1 ORDER BY agent_id, policy_no"
        ))?;
        let txns = stmt
            .query_map(params![batch_id], txn_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(txns)
    }

    /// Transactions not yet rolled into a trial statement.
    pub fn unassigned_transactions(&self, batch_id: &str) -> PayoutResult<Vec<CommissionTransaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TXN_COLUMNS} FROM commission_transaction
             WHERE batch_id = ?1 AND trial_statement_id IS NULL
             ORDER BY agent_id, policy_no"
        ))?;
        let txns = stmt
            .query_map(params![batch_id], txn_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(txns)
    }

    pub fn transactions_for_statement(&self, statement_id: &str) -> PayoutResult<Vec<CommissionTransaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TXN_COLUMNS} FROM commission_transaction
             WHERE trial_statement_id = ?1 ORDER BY policy_no"
        ))?;
        let txns = stmt
            .query_map(params![statement_id], txn_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(txns)
    }

    pub fn assign_transactions_to_trial(
        &self,
        batch_id: &str,
        agent_id: &str,
        statement_id: &str,
    ) -> PayoutResult<usize> {
        let updated = self.conn.execute(
            "UPDATE commission_transaction SET trial_statement_id = ?1
             WHERE batch_id = ?2 AND agent_id = ?3 AND trial_statement_id IS NULL",
            params![statement_id, batch_id, agent_id],
        )?;
        Ok(updated)
    }

    /// Link a full (non-partial) final statement back onto the transactions.
    pub fn assign_transactions_to_final(
        &self,
        trial_statement_id: &str,
        final_statement_id: &str,
    ) -> PayoutResult<usize> {
        let updated = self.conn.execute(
            "UPDATE commission_transaction SET final_statement_id = ?1
             WHERE trial_statement_id = ?2 AND final_statement_id IS NULL",
            params![final_statement_id, trial_statement_id],
        )?;
        Ok(updated)
    }

    pub fn link_disbursement_to_transactions(
        &self,
        final_statement_id: &str,
        disbursement_id: &str,
    ) -> PayoutResult<usize> {
        let updated = self.conn.execute(
            "UPDATE commission_transaction SET disbursement_id = ?1
             WHERE final_statement_id = ?2",
            params![disbursement_id, final_statement_id],
        )?;
        Ok(updated)
    }

    /// Net commission ever calculated for a policy, across all batches.
    /// This is the clawback base.
    pub fn total_net_for_policy(&self, policy_no: &str) -> PayoutResult<f64> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(net_amount), 0.0)
                 FROM commission_transaction WHERE policy_no = ?1",
                params![policy_no],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
