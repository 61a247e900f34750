use super::PayoutStore;
use crate::error::PayoutResult;
use crate::statement::{FinalStatement, TrialStatement};
use rusqlite::{params, OptionalExtension, Row};

fn trial_from_row(row: &Row<'_>) -> rusqlite::Result<TrialStatement> {
    Ok(TrialStatement {
        statement_id: row.get(0)?,
        batch_id: row.get(1)?,
        agent_id: row.get(2)?,
        period_month: row.get(3)?,
        period_year: row.get(4)?,
        policy_count: row.get(5)?,
        gross_amount: row.get(6)?,
        tds_amount: row.get(7)?,
        net_amount: row.get(8)?,
        disbursed_amount: row.get(9)?,
        status: row.get(10)?,
        reviewed_by: row.get(11)?,
        reviewed_at: row.get(12)?,
        remarks: row.get(13)?,
        created_at: row.get(14)?,
    })
}

const TRIAL_COLUMNS: &str = "statement_id, batch_id, agent_id, period_month, period_year,
    policy_count, gross_amount, tds_amount, net_amount, disbursed_amount, status,
    reviewed_by, reviewed_at, remarks, created_at";

fn final_from_row(row: &Row<'_>) -> rusqlite::Result<FinalStatement> {
    Ok(FinalStatement {
        final_statement_id: row.get(0)?,
        trial_statement_id: row.get(1)?,
        agent_id: row.get(2)?,
        gross_amount: row.get(3)?,
        tds_amount: row.get(4)?,
        net_amount: row.get(5)?,
        partial: row.get::<_, i32>(6)? != 0,
        status: row.get(7)?,
        created_at: row.get(8)?,
        disbursed_at: row.get(9)?,
    })
}

const FINAL_COLUMNS: &str = "final_statement_id, trial_statement_id, agent_id,
    gross_amount, tds_amount, net_amount, partial, status, created_at, disbursed_at";

impl PayoutStore {
    // ── Trial statements ───────────────────────────────────────

    pub fn insert_trial_statement(&self, statement: &TrialStatement) -> PayoutResult<()> {
        self.conn.execute(
            "INSERT INTO trial_statement (
                statement_id, batch_id, agent_id, period_month, period_year,
                policy_count, gross_amount, tds_amount, net_amount,
                disbursed_amount, status, reviewed_by, reviewed_at, remarks,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                statement.statement_id,
                statement.batch_id,
                statement.agent_id,
                statement.period_month,
                statement.period_year,
                statement.policy_count,
                statement.gross_amount,
                statement.tds_amount,
                statement.net_amount,
                statement.disbursed_amount,
                statement.status,
                statement.reviewed_by,
                statement.reviewed_at,
                statement.remarks,
                statement.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_trial_statement(&self, statement_id: &str) -> PayoutResult<TrialStatement> {
        self.conn
            .query_row(
                &format!("SELECT {TRIAL_COLUMNS} FROM trial_statement WHERE statement_id = ?1"),
                params![statement_id],
                trial_from_row,
            )
            .map_err(Into::into)
    }

    pub fn trial_statements_for_batch(&self, batch_id: &str) -> PayoutResult<Vec<TrialStatement>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRIAL_COLUMNS} FROM trial_statement
             WHERE batch_id = ?1 ORDER BY agent_id"
        ))?;
        let statements = stmt
            .query_map(params![batch_id], trial_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(statements)
    }

    pub fn update_trial_statement(&self, statement: &TrialStatement) -> PayoutResult<()> {
        self.conn.execute(
            "UPDATE trial_statement
             SET status = ?1, reviewed_by = ?2, reviewed_at = ?3, remarks = ?4,
                 disbursed_amount = ?5
             WHERE statement_id = ?6",
            params![
                statement.status,
                statement.reviewed_by,
                statement.reviewed_at,
                statement.remarks,
                statement.disbursed_amount,
                statement.statement_id,
            ],
        )?;
        Ok(())
    }

    // ── Final statements ───────────────────────────────────────

    pub fn insert_final_statement(&self, statement: &FinalStatement) -> PayoutResult<()> {
        self.conn.execute(
            "INSERT INTO final_statement (
                final_statement_id, trial_statement_id, agent_id,
                gross_amount, tds_amount, net_amount, partial, status,
                created_at, disbursed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                statement.final_statement_id,
                statement.trial_statement_id,
                statement.agent_id,
                statement.gross_amount,
                statement.tds_amount,
                statement.net_amount,
                if statement.partial { 1i32 } else { 0i32 },
                statement.status,
                statement.created_at,
                statement.disbursed_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_final_statement(&self, final_statement_id: &str) -> PayoutResult<FinalStatement> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {FINAL_COLUMNS} FROM final_statement WHERE final_statement_id = ?1"
                ),
                params![final_statement_id],
                final_from_row,
            )
            .map_err(Into::into)
    }

    pub fn final_statements_for_trial(
        &self,
        trial_statement_id: &str,
    ) -> PayoutResult<Vec<FinalStatement>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FINAL_COLUMNS} FROM final_statement
             WHERE trial_statement_id = ?1 ORDER BY created_at"
        ))?;
        let statements = stmt
            .query_map(params![trial_statement_id], final_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(statements)
    }

    /// The full (non-partial) final statement for a trial, if one exists.
    /// Used as the idempotency probe for full finalization replays.
    pub fn full_final_for_trial(
        &self,
        trial_statement_id: &str,
    ) -> PayoutResult<Option<FinalStatement>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {FINAL_COLUMNS} FROM final_statement
                     WHERE trial_statement_id = ?1 AND partial = 0 LIMIT 1"
                ),
                params![trial_statement_id],
                final_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn update_final_statement(&self, statement: &FinalStatement) -> PayoutResult<()> {
        self.conn.execute(
            "UPDATE final_statement
             SET status = ?1, disbursed_at = ?2
             WHERE final_statement_id = ?3",
            params![
                statement.status,
                statement.disbursed_at,
                statement.final_statement_id,
            ],
        )?;
        Ok(())
    }
}
