//! Commission calculation for a single policy.
//!
//! Pure and deterministic: the same inputs always produce the same amounts,
//! so a retried activity recomputes identical figures.

use crate::error::{PayoutError, PayoutResult};
use serde::{Deserialize, Serialize};

/// TDS withheld when the agent has a verified PAN on file.
pub const TDS_RATE_WITH_PAN: f64 = 5.0;
/// Statutory default TDS when no verified PAN exists.
pub const TDS_RATE_WITHOUT_PAN: f64 = 10.0;
/// Renewal commissions earn 30% of the first-year rate.
pub const RENEWAL_RATE_FACTOR: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    FirstYear,
    Renewal,
}

impl CommissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionType::FirstYear => "FIRST_YEAR",
            CommissionType::Renewal => "RENEWAL",
        }
    }

    pub fn parse(s: &str) -> PayoutResult<Self> {
        match s {
            "FIRST_YEAR" => Ok(CommissionType::FirstYear),
            "RENEWAL" => Ok(CommissionType::Renewal),
            other => Err(PayoutError::Validation {
                reason: format!("unknown commission type '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionInput {
    pub premium: f64,
    /// The resolved first-year rate percentage from the rate master.
    pub rate_percent: f64,
    pub commission_type: CommissionType,
    pub pan_verified: bool,
}

/// The computed amounts for one commission transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionAmounts {
    /// Rate actually applied (reduced for renewals).
    pub applied_rate: f64,
    pub tds_rate: f64,
    pub gross: f64,
    pub tds: f64,
    pub net: f64,
}

pub fn tds_rate(pan_verified: bool) -> f64 {
    if pan_verified {
        TDS_RATE_WITH_PAN
    } else {
        TDS_RATE_WITHOUT_PAN
    }
}

/// `gross = premium * rate/100`, `tds = gross * tds_rate/100`,
/// `net = gross - tds`. Renewal commissions reduce the rate to 30% of the
/// first-year rate before TDS.
pub fn calculate(input: &CommissionInput) -> PayoutResult<CommissionAmounts> {
    if input.premium <= 0.0 {
        return Err(PayoutError::Validation {
            reason: format!("premium must be positive, got {}", input.premium),
        });
    }
    if input.rate_percent < 0.0 {
        return Err(PayoutError::Validation {
            reason: format!("rate must not be negative, got {}", input.rate_percent),
        });
    }

    let applied_rate = match input.commission_type {
        CommissionType::FirstYear => input.rate_percent,
        CommissionType::Renewal => input.rate_percent * RENEWAL_RATE_FACTOR,
    };
    let tds_rate = tds_rate(input.pan_verified);

    let gross = input.premium * applied_rate / 100.0;
    let tds = gross * tds_rate / 100.0;
    let net = gross - tds;

    Ok(CommissionAmounts {
        applied_rate,
        tds_rate,
        gross,
        tds,
        net,
    })
}
