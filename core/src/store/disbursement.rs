use super::PayoutStore;
use crate::disbursement::Disbursement;
use crate::error::{PayoutError, PayoutResult};
use rusqlite::{params, OptionalExtension, Row};

fn disbursement_from_row(row: &Row<'_>) -> rusqlite::Result<Disbursement> {
    let instrument_json: String = row.get(4)?;
    let instrument = serde_json::from_str(&instrument_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Disbursement {
        disbursement_id: row.get(0)?,
        final_statement_id: row.get(1)?,
        agent_id: row.get(2)?,
        amount: row.get(3)?,
        instrument,
        status: row.get(5)?,
        idempotency_key: row.get(6)?,
        utr_number: row.get(7)?,
        failure_code: row.get(8)?,
        retry_count: row.get(9)?,
        version: row.get(10)?,
        initiated_at: row.get(11)?,
        sla_deadline: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

const DISBURSEMENT_COLUMNS: &str = "disbursement_id, final_statement_id, agent_id, amount,
    instrument_json, status, idempotency_key, utr_number, failure_code, retry_count,
    version, initiated_at, sla_deadline, completed_at";

impl PayoutStore {
    pub fn insert_disbursement(&self, d: &Disbursement) -> PayoutResult<()> {
        self.conn.execute(
            "INSERT INTO disbursement (
                disbursement_id, final_statement_id, agent_id, amount, mode,
                instrument_json, status, idempotency_key, utr_number,
                failure_code, retry_count, version, initiated_at, sla_deadline,
                completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                d.disbursement_id,
                d.final_statement_id,
                d.agent_id,
                d.amount,
                d.instrument.mode_str(),
                serde_json::to_string(&d.instrument)?,
                d.status,
                d.idempotency_key,
                d.utr_number,
                d.failure_code,
                d.retry_count,
                d.version,
                d.initiated_at,
                d.sla_deadline,
                d.completed_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_disbursement(&self, disbursement_id: &str) -> PayoutResult<Disbursement> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {DISBURSEMENT_COLUMNS} FROM disbursement WHERE disbursement_id = ?1"
                ),
                params![disbursement_id],
                disbursement_from_row,
            )
            .map_err(Into::into)
    }

    pub fn disbursement_for_final(
        &self,
        final_statement_id: &str,
    ) -> PayoutResult<Option<Disbursement>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {DISBURSEMENT_COLUMNS} FROM disbursement
                     WHERE final_statement_id = ?1
                     ORDER BY initiated_at DESC LIMIT 1"
                ),
                params![final_statement_id],
                disbursement_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Persist a mutated disbursement, guarded by the version the caller
    /// read. A stale version writes nothing and fails closed with
    /// `OptimisticLock`; the caller must re-read and re-decide.
    ///
    /// On success the row's version is bumped and the new value returned.
    pub fn update_disbursement(
        &self,
        d: &Disbursement,
        expected_version: i64,
    ) -> PayoutResult<i64> {
        let updated = self.conn.execute(
            "UPDATE disbursement
             SET status = ?1, idempotency_key = ?2, utr_number = ?3,
                 failure_code = ?4, retry_count = ?5, completed_at = ?6,
                 version = version + 1
             WHERE disbursement_id = ?7 AND version = ?8",
            params![
                d.status,
                d.idempotency_key,
                d.utr_number,
                d.failure_code,
                d.retry_count,
                d.completed_at,
                d.disbursement_id,
                expected_version,
            ],
        )?;
        if updated == 0 {
            let actual: i64 = self.conn.query_row(
                "SELECT version FROM disbursement WHERE disbursement_id = ?1",
                params![d.disbursement_id],
                |row| row.get(0),
            )?;
            return Err(PayoutError::OptimisticLock {
                id: d.disbursement_id.clone(),
                expected: expected_version,
                actual,
            });
        }
        Ok(expected_version + 1)
    }
}
