use super::PayoutStore;
use crate::clawback::{Clawback, ClawbackRecovery};
use crate::error::PayoutResult;
use rusqlite::{params, OptionalExtension, Row};

fn clawback_from_row(row: &Row<'_>) -> rusqlite::Result<Clawback> {
    Ok(Clawback {
        clawback_id: row.get(0)?,
        policy_no: row.get(1)?,
        agent_id: row.get(2)?,
        trigger: row.get(3)?,
        policy_inception_date: row.get(4)?,
        policy_age_months: row.get(5)?,
        original_commission: row.get(6)?,
        clawback_percentage: row.get(7)?,
        clawback_amount: row.get(8)?,
        recovered_amount: row.get(9)?,
        pending_amount: row.get(10)?,
        status: row.get(11)?,
        recovery_start_date: row.get(12)?,
        recovery_end_date: row.get(13)?,
        remarks: row.get(14)?,
        created_at: row.get(15)?,
    })
}

const CLAWBACK_COLUMNS: &str = "clawback_id, policy_no, agent_id, trigger_status,
    policy_inception_date, policy_age_months, original_commission, clawback_percentage,
    clawback_amount, recovered_amount, pending_amount, status, recovery_start_date,
    recovery_end_date, remarks, created_at";

fn recovery_from_row(row: &Row<'_>) -> rusqlite::Result<ClawbackRecovery> {
    Ok(ClawbackRecovery {
        clawback_id: row.get(0)?,
        installment_number: row.get(1)?,
        amount: row.get(2)?,
        status: row.get(3)?,
        due_date: row.get(4)?,
        collected_at: row.get(5)?,
        next_retry_date: row.get(6)?,
    })
}

const RECOVERY_COLUMNS: &str =
    "clawback_id, installment_number, amount, status, due_date, collected_at, next_retry_date";

impl PayoutStore {
    // ── Clawback ───────────────────────────────────────────────

    pub fn insert_clawback(&self, clawback: &Clawback) -> PayoutResult<()> {
        self.conn.execute(
            "INSERT INTO clawback (
                clawback_id, policy_no, agent_id, trigger_status,
                policy_inception_date, policy_age_months, original_commission,
                clawback_percentage, clawback_amount, recovered_amount,
                pending_amount, status, recovery_start_date, recovery_end_date,
                remarks, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                clawback.clawback_id,
                clawback.policy_no,
                clawback.agent_id,
                clawback.trigger,
                clawback.policy_inception_date,
                clawback.policy_age_months,
                clawback.original_commission,
                clawback.clawback_percentage,
                clawback.clawback_amount,
                clawback.recovered_amount,
                clawback.pending_amount,
                clawback.status,
                clawback.recovery_start_date,
                clawback.recovery_end_date,
                clawback.remarks,
                clawback.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_clawback(&self, clawback_id: &str) -> PayoutResult<Clawback> {
        self.conn
            .query_row(
                &format!("SELECT {CLAWBACK_COLUMNS} FROM clawback WHERE clawback_id = ?1"),
                params![clawback_id],
                clawback_from_row,
            )
            .map_err(Into::into)
    }

    /// The open clawback for a policy, if one exists — the replay probe for
    /// `create_clawback`.
    pub fn open_clawback_for_policy(&self, policy_no: &str) -> PayoutResult<Option<Clawback>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {CLAWBACK_COLUMNS} FROM clawback
                     WHERE policy_no = ?1 AND status IN ('PENDING', 'IN_PROGRESS')
                     LIMIT 1"
                ),
                params![policy_no],
                clawback_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn update_clawback(&self, clawback: &Clawback) -> PayoutResult<()> {
        self.conn.execute(
            "UPDATE clawback
             SET recovered_amount = ?1, pending_amount = ?2, status = ?3,
                 recovery_start_date = ?4, recovery_end_date = ?5, remarks = ?6
             WHERE clawback_id = ?7",
            params![
                clawback.recovered_amount,
                clawback.pending_amount,
                clawback.status,
                clawback.recovery_start_date,
                clawback.recovery_end_date,
                clawback.remarks,
                clawback.clawback_id,
            ],
        )?;
        Ok(())
    }

    // ── Recovery ledger ────────────────────────────────────────

    pub fn find_recovery(
        &self,
        clawback_id: &str,
        installment_number: u32,
    ) -> PayoutResult<Option<ClawbackRecovery>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {RECOVERY_COLUMNS} FROM clawback_recovery
                     WHERE clawback_id = ?1 AND installment_number = ?2"
                ),
                params![clawback_id, installment_number],
                recovery_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn recoveries_for(&self, clawback_id: &str) -> PayoutResult<Vec<ClawbackRecovery>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECOVERY_COLUMNS} FROM clawback_recovery
             WHERE clawback_id = ?1 ORDER BY installment_number"
        ))?;
        let rows = stmt
            .query_map(params![clawback_id], recovery_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Insert a scheduled installment plan. Already-present installments are
    /// left untouched so a replayed scheduling step is harmless.
    pub fn insert_recovery_plan(&self, plan: &[ClawbackRecovery]) -> PayoutResult<usize> {
        let mut inserted = 0;
        for recovery in plan {
            inserted += self.conn.execute(
                "INSERT INTO clawback_recovery (
                    clawback_id, installment_number, amount, status, due_date,
                    collected_at, next_retry_date
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (clawback_id, installment_number) DO NOTHING",
                params![
                    recovery.clawback_id,
                    recovery.installment_number,
                    recovery.amount,
                    recovery.status,
                    recovery.due_date,
                    recovery.collected_at,
                    recovery.next_retry_date,
                ],
            )?;
        }
        Ok(inserted)
    }

    /// Persist one collected installment and the clawback's new balance in a
    /// single transaction, so a crash can never leave the ledger and the
    /// running balance disagreeing.
    pub fn apply_recovery(
        &self,
        clawback: &Clawback,
        recovery: &ClawbackRecovery,
    ) -> PayoutResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO clawback_recovery (
                clawback_id, installment_number, amount, status, due_date,
                collected_at, next_retry_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (clawback_id, installment_number) DO UPDATE SET
                amount = excluded.amount,
                status = excluded.status,
                collected_at = excluded.collected_at,
                next_retry_date = excluded.next_retry_date",
            params![
                recovery.clawback_id,
                recovery.installment_number,
                recovery.amount,
                recovery.status,
                recovery.due_date,
                recovery.collected_at,
                recovery.next_retry_date,
            ],
        )?;
        tx.execute(
            "UPDATE clawback
             SET recovered_amount = ?1, pending_amount = ?2, status = ?3,
                 recovery_start_date = ?4, recovery_end_date = ?5
             WHERE clawback_id = ?6",
            params![
                clawback.recovered_amount,
                clawback.pending_amount,
                clawback.status,
                clawback.recovery_start_date,
                clawback.recovery_end_date,
                clawback.clawback_id,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn mark_recovery_failed(
        &self,
        clawback_id: &str,
        installment_number: u32,
        next_retry_date: chrono::NaiveDate,
    ) -> PayoutResult<()> {
        self.conn.execute(
            "UPDATE clawback_recovery
             SET status = 'FAILED', next_retry_date = ?1
             WHERE clawback_id = ?2 AND installment_number = ?3",
            params![next_retry_date, clawback_id, installment_number],
        )?;
        Ok(())
    }

    /// Sum of collected installments — must always equal the clawback's
    /// `recovered_amount`.
    pub fn collected_total(&self, clawback_id: &str) -> PayoutResult<f64> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(amount), 0.0) FROM clawback_recovery
                 WHERE clawback_id = ?1 AND status = 'COLLECTED'",
                params![clawback_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
