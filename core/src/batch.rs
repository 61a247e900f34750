//! Monthly commission batch lifecycle.
//!
//! One batch per (month, year). The batch owns its commission transactions
//! and tracks calculation progress against a 6-hour SLA.

use crate::calculator::CommissionType;
use crate::error::{PayoutError, PayoutResult};
use crate::types::{EntityId, WorkflowId};
use crate::workday;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Initiated,
    Calculating,
    TrialGenerated,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Initiated => "INITIATED",
            BatchStatus::Calculating => "CALCULATING",
            BatchStatus::TrialGenerated => "TRIAL_GENERATED",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> PayoutResult<Self> {
        match s {
            "INITIATED" => Ok(BatchStatus::Initiated),
            "CALCULATING" => Ok(BatchStatus::Calculating),
            "TRIAL_GENERATED" => Ok(BatchStatus::TrialGenerated),
            "COMPLETED" => Ok(BatchStatus::Completed),
            "FAILED" => Ok(BatchStatus::Failed),
            "CANCELLED" => Ok(BatchStatus::Cancelled),
            other => Err(PayoutError::Validation {
                reason: format!("unknown batch status '{other}'"),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionBatch {
    pub batch_id: EntityId,
    pub month: u32,
    pub year: i32,
    pub status: BatchStatus,
    pub total_policies: i64,
    pub processed_records: i64,
    pub failed_records: i64,
    pub started_at: NaiveDateTime,
    pub sla_deadline: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub workflow_id: WorkflowId,
}

impl CommissionBatch {
    pub fn new(
        month: u32,
        year: i32,
        total_policies: i64,
        workflow_id: WorkflowId,
        now: NaiveDateTime,
    ) -> PayoutResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(PayoutError::Validation {
                reason: format!("month must be 1-12, got {month}"),
            });
        }
        if total_policies < 0 {
            return Err(PayoutError::Validation {
                reason: format!("total policies must not be negative, got {total_policies}"),
            });
        }
        Ok(Self {
            batch_id: uuid::Uuid::new_v4().to_string(),
            month,
            year,
            status: BatchStatus::Initiated,
            total_policies,
            processed_records: 0,
            failed_records: 0,
            started_at: now,
            sla_deadline: workday::batch_sla_deadline(now),
            completed_at: None,
            workflow_id,
        })
    }

    fn transition(
        &mut self,
        allowed: &[BatchStatus],
        next: BatchStatus,
        action: &'static str,
    ) -> PayoutResult<()> {
        if !allowed.contains(&self.status) {
            return Err(PayoutError::InvalidState {
                entity: "batch",
                id: self.batch_id.clone(),
                current: self.status.as_str().to_string(),
                action,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn begin_calculation(&mut self) -> PayoutResult<()> {
        self.transition(
            &[BatchStatus::Initiated],
            BatchStatus::Calculating,
            "begin calculation",
        )
    }

    pub fn mark_trial_generated(&mut self) -> PayoutResult<()> {
        self.transition(
            &[BatchStatus::Calculating],
            BatchStatus::TrialGenerated,
            "mark trial generated",
        )
    }

    pub fn complete(&mut self, now: NaiveDateTime) -> PayoutResult<()> {
        self.transition(
            &[BatchStatus::TrialGenerated],
            BatchStatus::Completed,
            "complete",
        )?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, now: NaiveDateTime) -> PayoutResult<()> {
        if self.status.is_terminal() {
            return Err(PayoutError::InvalidState {
                entity: "batch",
                id: self.batch_id.clone(),
                current: self.status.as_str().to_string(),
                action: "fail",
            });
        }
        self.status = BatchStatus::Failed;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, now: NaiveDateTime) -> PayoutResult<()> {
        if self.status.is_terminal() {
            return Err(PayoutError::InvalidState {
                entity: "batch",
                id: self.batch_id.clone(),
                current: self.status.as_str().to_string(),
                action: "cancel",
            });
        }
        self.status = BatchStatus::Cancelled;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Count one more policy as processed. `failed` records count toward
    /// progress too — a policy routed to suspense is handled, not pending.
    pub fn record_processed(&mut self, failed: bool) {
        self.processed_records += 1;
        if failed {
            self.failed_records += 1;
        }
    }

    /// Progress percentage, monotonically non-decreasing.
    pub fn progress_percent(&self) -> f64 {
        if self.total_policies == 0 {
            return 100.0;
        }
        (self.processed_records as f64 / self.total_policies as f64) * 100.0
    }

    pub fn is_sla_breached(&self, now: NaiveDateTime) -> bool {
        now > self.sla_deadline
    }
}

/// One calculated commission row: one per (policy, commission type) within
/// a batch. Statement and disbursement links are filled as the lifecycle
/// advances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionTransaction {
    pub txn_id: EntityId,
    pub batch_id: EntityId,
    pub policy_no: String,
    pub agent_id: EntityId,
    pub commission_type: CommissionType,
    pub premium: f64,
    pub applied_rate: f64,
    pub tds_rate: f64,
    pub gross_amount: f64,
    pub tds_amount: f64,
    pub net_amount: f64,
    pub trial_statement_id: Option<EntityId>,
    pub final_statement_id: Option<EntityId>,
    pub disbursement_id: Option<EntityId>,
    pub calculated_at: NaiveDateTime,
}

impl CommissionTransaction {
    /// `net = gross - tds` and `tds = gross * rate/100`, within one paisa.
    pub fn amounts_consistent(&self) -> bool {
        let expected_tds = self.gross_amount * self.tds_rate / 100.0;
        (self.tds_amount - expected_tds).abs() <= 0.01
            && (self.net_amount - (self.gross_amount - self.tds_amount)).abs() <= 0.01
    }
}
