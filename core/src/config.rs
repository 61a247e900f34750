//! Rate-table configuration loading.
//!
//! The commission rate master ships as a JSON file and is seeded into the
//! store at startup; resolution then runs against the persisted rows.

use crate::rates::CommissionRate;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    pub product_type: String,
    pub agent_type: String,
    pub plan_code: String,
    pub policy_term_years: u32,
    pub rate_percent: f64,
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
struct RateTableFile {
    rates: Vec<RateConfig>,
}

#[derive(Debug, Clone)]
pub struct RateTable {
    pub rates: Vec<RateConfig>,
}

impl RateTable {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read rate table {path}: {e}"))?;
        let file: RateTableFile = serde_json::from_str(&content)?;
        Ok(Self { rates: file.rates })
    }

    /// A small fixed table for tests and the demo runner.
    pub fn default_test() -> Self {
        let from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default();
        let mk = |product: &str, agent: &str, plan: &str, term: u32, rate: f64| RateConfig {
            product_type: product.to_string(),
            agent_type: agent.to_string(),
            plan_code: plan.to_string(),
            policy_term_years: term,
            rate_percent: rate,
            effective_from: from,
            effective_to: None,
        };
        Self {
            rates: vec![
                mk("TERM_LIFE", "INDIVIDUAL", "TL-10", 10, 25.0),
                mk("TERM_LIFE", "INDIVIDUAL", "TL-20", 20, 30.0),
                mk("TERM_LIFE", "CORPORATE", "TL-10", 10, 18.0),
                mk("TERM_LIFE", "CORPORATE", "TL-20", 20, 22.0),
                mk("ENDOWMENT", "INDIVIDUAL", "EN-15", 15, 35.0),
                mk("ENDOWMENT", "CORPORATE", "EN-15", 15, 28.0),
                mk("ULIP", "INDIVIDUAL", "UL-10", 10, 8.0),
                mk("ULIP", "CORPORATE", "UL-10", 10, 6.5),
            ],
        }
    }
}

impl RateConfig {
    pub fn into_rate(self, rate_id: String) -> CommissionRate {
        CommissionRate {
            rate_id,
            product_type: self.product_type,
            agent_type: self.agent_type,
            plan_code: self.plan_code,
            policy_term_years: self.policy_term_years,
            rate_percent: self.rate_percent,
            effective_from: self.effective_from,
            effective_to: self.effective_to,
            active: true,
        }
    }
}
