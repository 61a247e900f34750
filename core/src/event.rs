//! The audit event log — every state transition is recorded here.
//!
//! RULE: Operations that mutate persisted state append an event.
//! Pure reads never log. Variants are added as the lifecycle grows —
//! never removed or reordered.

use crate::types::EntityId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Every event emitted by the payout lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutEvent {
    // ── Batch ──────────────────────────────────────
    BatchCreated {
        batch_id: EntityId,
        month: u32,
        year: i32,
        total_policies: i64,
    },
    BatchStatusChanged {
        batch_id: EntityId,
        old_status: String,
        new_status: String,
    },
    CommissionCalculated {
        batch_id: EntityId,
        txn_id: EntityId,
        policy_no: String,
        net_amount: f64,
    },
    PolicyRoutedToSuspense {
        batch_id: EntityId,
        policy_no: String,
        suspense_id: EntityId,
        reason: String,
    },

    // ── Statements ─────────────────────────────────
    TrialStatementGenerated {
        statement_id: EntityId,
        agent_id: EntityId,
        policy_count: i64,
        net_amount: f64,
    },
    StatementApproved {
        statement_id: EntityId,
        approved_by: String,
    },
    StatementRejected {
        statement_id: EntityId,
        rejected_by: String,
    },
    StatementCorrectionRequested {
        statement_id: EntityId,
        requested_by: String,
    },
    FinalStatementCreated {
        final_statement_id: EntityId,
        trial_statement_id: EntityId,
        net_amount: f64,
        partial: bool,
    },
    FinalStatementReady {
        final_statement_id: EntityId,
    },

    // ── Disbursement ───────────────────────────────
    DisbursementCreated {
        disbursement_id: EntityId,
        final_statement_id: EntityId,
        mode: String,
        amount: f64,
    },
    DisbursementStatusChanged {
        disbursement_id: EntityId,
        old_status: String,
        new_status: String,
    },
    PaymentConfirmed {
        disbursement_id: EntityId,
        utr_number: Option<String>,
    },
    DisbursementRetried {
        disbursement_id: EntityId,
        retry_count: u32,
        idempotency_key: String,
    },

    // ── Clawback ───────────────────────────────────
    ClawbackCreated {
        clawback_id: EntityId,
        policy_no: String,
        percentage: f64,
        amount: f64,
    },
    RecoveryRecorded {
        clawback_id: EntityId,
        installment_number: u32,
        amount: f64,
        pending_after: f64,
    },
    ClawbackClosed {
        clawback_id: EntityId,
        outcome: String,
    },

    // ── Suspense ───────────────────────────────────
    SuspenseCreated {
        suspense_id: EntityId,
        amount: f64,
        priority: String,
        reason: String,
    },
    SuspenseResolved {
        suspense_id: EntityId,
        resolution: String,
    },
}

impl PayoutEvent {
    /// Stable name used for the `event_type` column and log lines.
    pub fn type_name(&self) -> &'static str {
        match self {
            PayoutEvent::BatchCreated { .. } => "batch_created",
            PayoutEvent::BatchStatusChanged { .. } => "batch_status_changed",
            PayoutEvent::CommissionCalculated { .. } => "commission_calculated",
            PayoutEvent::PolicyRoutedToSuspense { .. } => "policy_routed_to_suspense",
            PayoutEvent::TrialStatementGenerated { .. } => "trial_statement_generated",
            PayoutEvent::StatementApproved { .. } => "statement_approved",
            PayoutEvent::StatementRejected { .. } => "statement_rejected",
            PayoutEvent::StatementCorrectionRequested { .. } => "statement_correction_requested",
            PayoutEvent::FinalStatementCreated { .. } => "final_statement_created",
            PayoutEvent::FinalStatementReady { .. } => "final_statement_ready",
            PayoutEvent::DisbursementCreated { .. } => "disbursement_created",
            PayoutEvent::DisbursementStatusChanged { .. } => "disbursement_status_changed",
            PayoutEvent::PaymentConfirmed { .. } => "payment_confirmed",
            PayoutEvent::DisbursementRetried { .. } => "disbursement_retried",
            PayoutEvent::ClawbackCreated { .. } => "clawback_created",
            PayoutEvent::RecoveryRecorded { .. } => "recovery_recorded",
            PayoutEvent::ClawbackClosed { .. } => "clawback_closed",
            PayoutEvent::SuspenseCreated { .. } => "suspense_created",
            PayoutEvent::SuspenseResolved { .. } => "suspense_resolved",
        }
    }
}

/// A persisted row of the append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub entity_id: EntityId,
    pub event_type: String,
    pub payload: String,
    pub occurred_at: NaiveDateTime,
}
