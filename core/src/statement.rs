//! Trial and final statement state machines.
//!
//! A trial statement aggregates one agent's commission transactions for a
//! batch period and waits for finance approval. Approval creates exactly one
//! final statement carrying the approved totals — or a subset for partial
//! disbursement, in which case the remainder stays attributed to the trial
//! statement and can be drawn down later.

use crate::batch::{CommissionBatch, CommissionTransaction};
use crate::error::{PayoutError, PayoutResult};
use crate::types::EntityId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One paisa — the tolerance for all monetary comparisons.
pub const AMOUNT_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrialStatementStatus {
    PendingApproval,
    Approved,
    Rejected,
    CorrectionNeeded,
}

impl TrialStatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatementStatus::PendingApproval => "PENDING_APPROVAL",
            TrialStatementStatus::Approved => "APPROVED",
            TrialStatementStatus::Rejected => "REJECTED",
            TrialStatementStatus::CorrectionNeeded => "CORRECTION_NEEDED",
        }
    }

    pub fn parse(s: &str) -> PayoutResult<Self> {
        match s {
            "PENDING_APPROVAL" => Ok(TrialStatementStatus::PendingApproval),
            "APPROVED" => Ok(TrialStatementStatus::Approved),
            "REJECTED" => Ok(TrialStatementStatus::Rejected),
            "CORRECTION_NEEDED" => Ok(TrialStatementStatus::CorrectionNeeded),
            other => Err(PayoutError::Validation {
                reason: format!("unknown trial statement status '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialStatement {
    pub statement_id: EntityId,
    pub batch_id: EntityId,
    pub agent_id: EntityId,
    pub period_month: u32,
    pub period_year: i32,
    pub policy_count: i64,
    pub gross_amount: f64,
    pub tds_amount: f64,
    pub net_amount: f64,
    /// Net already carried onto final statements (partial disbursement).
    pub disbursed_amount: f64,
    pub status: TrialStatementStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub remarks: Option<String>,
    pub created_at: NaiveDateTime,
}

impl TrialStatement {
    /// Aggregate one agent's transactions for the batch period. Totals are
    /// always the sum over the underlying transactions.
    pub fn from_transactions(
        batch: &CommissionBatch,
        agent_id: &str,
        txns: &[&CommissionTransaction],
        now: NaiveDateTime,
    ) -> PayoutResult<Self> {
        if txns.is_empty() {
            return Err(PayoutError::Validation {
                reason: format!("no transactions for agent {agent_id} in batch {}", batch.batch_id),
            });
        }
        if let Some(t) = txns.iter().find(|t| t.agent_id != agent_id) {
            return Err(PayoutError::Validation {
                reason: format!(
                    "transaction {} belongs to agent {}, not {agent_id}",
                    t.txn_id, t.agent_id
                ),
            });
        }

        Ok(Self {
            statement_id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch.batch_id.clone(),
            agent_id: agent_id.to_string(),
            period_month: batch.month,
            period_year: batch.year,
            policy_count: txns.len() as i64,
            gross_amount: txns.iter().map(|t| t.gross_amount).sum(),
            tds_amount: txns.iter().map(|t| t.tds_amount).sum(),
            net_amount: txns.iter().map(|t| t.net_amount).sum(),
            disbursed_amount: 0.0,
            status: TrialStatementStatus::PendingApproval,
            reviewed_by: None,
            reviewed_at: None,
            remarks: None,
            created_at: now,
        })
    }

    fn review(
        &mut self,
        next: TrialStatementStatus,
        by: &str,
        remarks: Option<String>,
        now: NaiveDateTime,
        action: &'static str,
    ) -> PayoutResult<()> {
        if self.status != TrialStatementStatus::PendingApproval {
            return Err(PayoutError::InvalidState {
                entity: "trial statement",
                id: self.statement_id.clone(),
                current: self.status.as_str().to_string(),
                action,
            });
        }
        self.status = next;
        self.reviewed_by = Some(by.to_string());
        self.reviewed_at = Some(now);
        self.remarks = remarks;
        Ok(())
    }

    pub fn approve(
        &mut self,
        approved_by: &str,
        remarks: Option<String>,
        now: NaiveDateTime,
    ) -> PayoutResult<()> {
        self.review(TrialStatementStatus::Approved, approved_by, remarks, now, "approve")
    }

    pub fn reject(
        &mut self,
        rejected_by: &str,
        remarks: Option<String>,
        now: NaiveDateTime,
    ) -> PayoutResult<()> {
        self.review(TrialStatementStatus::Rejected, rejected_by, remarks, now, "reject")
    }

    pub fn request_correction(
        &mut self,
        requested_by: &str,
        remarks: Option<String>,
        now: NaiveDateTime,
    ) -> PayoutResult<()> {
        self.review(
            TrialStatementStatus::CorrectionNeeded,
            requested_by,
            remarks,
            now,
            "request correction",
        )
    }

    /// Net amount not yet carried onto a final statement.
    pub fn undisbursed_amount(&self) -> f64 {
        self.net_amount - self.disbursed_amount
    }

    /// Reserve `amount` of the approved net for a final statement.
    pub fn draw_down(&mut self, amount: f64) -> PayoutResult<()> {
        if self.status != TrialStatementStatus::Approved {
            return Err(PayoutError::InvalidState {
                entity: "trial statement",
                id: self.statement_id.clone(),
                current: self.status.as_str().to_string(),
                action: "draw down",
            });
        }
        if amount <= 0.0 {
            return Err(PayoutError::Validation {
                reason: format!("draw-down amount must be positive, got {amount}"),
            });
        }
        if amount > self.undisbursed_amount() + AMOUNT_EPSILON {
            return Err(PayoutError::Validation {
                reason: format!(
                    "draw-down {amount} exceeds undisbursed remainder {} on statement {}",
                    self.undisbursed_amount(),
                    self.statement_id
                ),
            });
        }
        self.disbursed_amount += amount;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatementStatus {
    Finalized,
    ReadyForDisbursement,
    Disbursed,
}

impl FinalStatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatementStatus::Finalized => "FINALIZED",
            FinalStatementStatus::ReadyForDisbursement => "READY_FOR_DISBURSEMENT",
            FinalStatementStatus::Disbursed => "DISBURSED",
        }
    }

    pub fn parse(s: &str) -> PayoutResult<Self> {
        match s {
            "FINALIZED" => Ok(FinalStatementStatus::Finalized),
            "READY_FOR_DISBURSEMENT" => Ok(FinalStatementStatus::ReadyForDisbursement),
            "DISBURSED" => Ok(FinalStatementStatus::Disbursed),
            other => Err(PayoutError::Validation {
                reason: format!("unknown final statement status '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalStatement {
    pub final_statement_id: EntityId,
    pub trial_statement_id: EntityId,
    pub agent_id: EntityId,
    pub gross_amount: f64,
    pub tds_amount: f64,
    pub net_amount: f64,
    /// True when this statement carries a subset of the trial totals.
    pub partial: bool,
    pub status: FinalStatementStatus,
    pub created_at: NaiveDateTime,
    pub disbursed_at: Option<NaiveDateTime>,
}

impl FinalStatement {
    /// Create from an approved trial statement. `subset_net` carries a
    /// partial amount; gross and TDS scale proportionally so the
    /// `net = gross - tds` invariant survives the split.
    pub fn from_trial(
        trial: &TrialStatement,
        subset_net: Option<f64>,
        now: NaiveDateTime,
    ) -> PayoutResult<Self> {
        if trial.status != TrialStatementStatus::Approved {
            return Err(PayoutError::InvalidState {
                entity: "trial statement",
                id: trial.statement_id.clone(),
                current: trial.status.as_str().to_string(),
                action: "create final statement",
            });
        }

        let (gross, tds, net, partial) = match subset_net {
            None => (
                trial.gross_amount,
                trial.tds_amount,
                trial.net_amount,
                false,
            ),
            Some(subset) => {
                if subset <= 0.0 {
                    return Err(PayoutError::Validation {
                        reason: format!("partial amount must be positive, got {subset}"),
                    });
                }
                if trial.net_amount <= 0.0 {
                    return Err(PayoutError::Validation {
                        reason: format!(
                            "trial statement {} has no net amount to disburse",
                            trial.statement_id
                        ),
                    });
                }
                let factor = subset / trial.net_amount;
                (
                    trial.gross_amount * factor,
                    trial.tds_amount * factor,
                    subset,
                    // a subset equal to the full net is not a partial
                    (trial.net_amount - subset).abs() > AMOUNT_EPSILON,
                )
            }
        };

        Ok(Self {
            final_statement_id: uuid::Uuid::new_v4().to_string(),
            trial_statement_id: trial.statement_id.clone(),
            agent_id: trial.agent_id.clone(),
            gross_amount: gross,
            tds_amount: tds,
            net_amount: net,
            partial,
            status: FinalStatementStatus::Finalized,
            created_at: now,
            disbursed_at: None,
        })
    }

    pub fn mark_ready(&mut self) -> PayoutResult<()> {
        if self.status != FinalStatementStatus::Finalized {
            return Err(PayoutError::InvalidState {
                entity: "final statement",
                id: self.final_statement_id.clone(),
                current: self.status.as_str().to_string(),
                action: "mark ready for disbursement",
            });
        }
        self.status = FinalStatementStatus::ReadyForDisbursement;
        Ok(())
    }

    /// Set only once the linked disbursement reaches COMPLETED.
    pub fn mark_disbursed(&mut self, now: NaiveDateTime) -> PayoutResult<()> {
        if self.status != FinalStatementStatus::ReadyForDisbursement {
            return Err(PayoutError::InvalidState {
                entity: "final statement",
                id: self.final_statement_id.clone(),
                current: self.status.as_str().to_string(),
                action: "mark disbursed",
            });
        }
        self.status = FinalStatementStatus::Disbursed;
        self.disbursed_at = Some(now);
        Ok(())
    }
}
