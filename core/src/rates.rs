//! Commission rate master and rate resolution.
//!
//! A rate row is keyed by (product type, agent type, plan code, policy term)
//! and carries a `[effective_from, effective_to)` validity window. Resolution
//! never falls back to a default: a miss is a `RateNotFound` error and the
//! caller routes the policy to suspense.

use crate::error::{PayoutError, PayoutResult};
use crate::types::EntityId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionRate {
    pub rate_id: EntityId,
    pub product_type: String,
    pub agent_type: String,
    pub plan_code: String,
    pub policy_term_years: u32,
    pub rate_percent: f64,
    pub effective_from: NaiveDate,
    /// `None` means open-ended.
    pub effective_to: Option<NaiveDate>,
    pub active: bool,
}

impl CommissionRate {
    /// Whether this rate is applicable on `as_of`. The window is half-open:
    /// effective on `effective_from`, expired on `effective_to`.
    pub fn covers(&self, as_of: NaiveDate) -> bool {
        self.active
            && self.effective_from <= as_of
            && self.effective_to.map_or(true, |to| as_of < to)
    }
}

/// The lookup key for one policy's rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateQuery {
    pub product_type: String,
    pub agent_type: String,
    pub plan_code: String,
    pub policy_term_years: u32,
    pub as_of: NaiveDate,
}

impl RateQuery {
    fn matches(&self, rate: &CommissionRate) -> bool {
        rate.product_type == self.product_type
            && rate.agent_type == self.agent_type
            && rate.plan_code == self.plan_code
            && rate.policy_term_years == self.policy_term_years
            && rate.covers(self.as_of)
    }
}

/// Select the applicable rate from `candidates`. If more than one row
/// qualifies (bad master data), the most recently effective one wins.
pub fn resolve<'a>(
    candidates: &'a [CommissionRate],
    query: &RateQuery,
) -> PayoutResult<&'a CommissionRate> {
    candidates
        .iter()
        .filter(|r| query.matches(r))
        .max_by_key(|r| r.effective_from)
        .ok_or_else(|| PayoutError::RateNotFound {
            product_type: query.product_type.clone(),
            agent_type: query.agent_type.clone(),
            plan_code: query.plan_code.clone(),
            policy_term_years: query.policy_term_years,
            as_of: query.as_of,
        })
}
