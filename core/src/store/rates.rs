use super::PayoutStore;
use crate::error::PayoutResult;
use crate::rates::CommissionRate;
use rusqlite::params;

impl PayoutStore {
    /// Seed a rate row. Re-seeding the same natural key is a no-op so the
    /// startup path can run unconditionally.
    pub fn insert_rate(&self, rate: &CommissionRate) -> PayoutResult<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO commission_rate (
                rate_id, product_type, agent_type, plan_code, policy_term_years,
                rate_percent, effective_from, effective_to, active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (product_type, agent_type, plan_code, policy_term_years, effective_from)
            DO NOTHING",
            params![
                rate.rate_id,
                rate.product_type,
                rate.agent_type,
                rate.plan_code,
                rate.policy_term_years,
                rate.rate_percent,
                rate.effective_from,
                rate.effective_to,
                if rate.active { 1i32 } else { 0i32 },
            ],
        )?;
        Ok(inserted > 0)
    }

    /// All rate rows for one (product, agent, plan, term) key; the resolver
    /// applies the validity-window and recency rules.
    pub fn candidate_rates(
        &self,
        product_type: &str,
        agent_type: &str,
        plan_code: &str,
        policy_term_years: u32,
    ) -> PayoutResult<Vec<CommissionRate>> {
        let mut stmt = self.conn.prepare(
            "SELECT rate_id, product_type, agent_type, plan_code, policy_term_years,
                    rate_percent, effective_from, effective_to, active
             FROM commission_rate
             WHERE product_type = ?1 AND agent_type = ?2
               AND plan_code = ?3 AND policy_term_years = ?4",
        )?;
        let rates = stmt
            .query_map(
                params![product_type, agent_type, plan_code, policy_term_years],
                |row| {
                    Ok(CommissionRate {
                        rate_id: row.get(0)?,
                        product_type: row.get(1)?,
                        agent_type: row.get(2)?,
                        plan_code: row.get(3)?,
                        policy_term_years: row.get(4)?,
                        rate_percent: row.get(5)?,
                        effective_from: row.get(6)?,
                        effective_to: row.get(7)?,
                        active: row.get::<_, i32>(8)? != 0,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rates)
    }

    pub fn rate_count(&self) -> PayoutResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM commission_rate", [], |row| row.get(0))
            .map_err(Into::into)
    }
}
