//! The serializable activity surface for the durable-task executor.
//!
//! RULE: every activity input and outcome round-trips through JSON, and
//! every activity is safe to re-execute — the engine deduplicates replays
//! on natural keys or fails closed on stale versions. Timestamps travel in
//! the inputs so a replay recomputes the same result.

use crate::batch::CommissionBatch;
use crate::calculator::CommissionType;
use crate::clawback::{Clawback, ClawbackRecovery, ClawbackTrigger};
use crate::disbursement::{Disbursement, PaymentInstrument};
use crate::engine::{CommissionOutcome, PayoutEngine};
use crate::error::PayoutResult;
use crate::statement::{FinalStatement, TrialStatement};
use crate::suspense::{AgingReport, SuspenseAccount, SuspenseReason};
use crate::types::{EntityId, WorkflowId};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBatchInput {
    pub month: u32,
    pub year: i32,
    pub total_policies: i64,
    pub workflow_id: WorkflowId,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCommissionInput {
    pub batch_id: EntityId,
    pub policy_no: String,
    pub agent_id: EntityId,
    pub product_type: String,
    pub agent_type: String,
    pub plan_code: String,
    pub policy_term_years: u32,
    pub premium: f64,
    pub commission_type: CommissionType,
    pub pan_verified: bool,
    /// Rate-effective date, normally the policy's premium due date.
    pub as_of: NaiveDate,
    pub workflow_id: WorkflowId,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateTrialStatementsInput {
    pub batch_id: EntityId,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewStatementInput {
    pub statement_id: EntityId,
    pub reviewed_by: String,
    pub remarks: Option<String>,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFinalStatementInput {
    pub trial_statement_id: EntityId,
    /// `None` carries the full approved totals; `Some` carries a net subset
    /// for partial disbursement, leaving the remainder on the trial
    /// statement.
    pub partial_amount: Option<f64>,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDisbursementInput {
    pub final_statement_id: EntityId,
    pub instrument: PaymentInstrument,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisbursementTransitionInput {
    pub disbursement_id: EntityId,
    /// The version the caller last read; stale versions fail closed.
    pub version: i64,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmPaymentInput {
    pub disbursement_id: EntityId,
    pub utr_number: Option<String>,
    pub success: bool,
    pub failure_code: Option<String>,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClawbackInput {
    pub policy_no: String,
    pub agent_id: EntityId,
    pub trigger: ClawbackTrigger,
    pub policy_inception_date: NaiveDate,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRecoveryPlanInput {
    pub clawback_id: EntityId,
    pub installments: u32,
    pub first_due: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRecoveryInput {
    pub clawback_id: EntityId,
    pub installment_number: u32,
    pub amount: f64,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseClawbackInput {
    pub clawback_id: EntityId,
    pub remarks: String,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSuspenseInput {
    pub policy_no: Option<String>,
    pub agent_id: Option<EntityId>,
    pub amount: f64,
    pub reason: SuspenseReason,
    pub description: String,
    pub workflow_id: WorkflowId,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseSuspenseInput {
    pub suspense_id: EntityId,
    pub remarks: String,
    pub now: NaiveDateTime,
}

/// Every activity the executor can invoke, as one tagged enum so a task
/// queue host can hand the core plain JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum Activity {
    ValidateInput(PolicyCommissionInput),
    CreateBatch(CreateBatchInput),
    CalculateCommission(PolicyCommissionInput),
    GenerateTrialStatements(GenerateTrialStatementsInput),
    ApproveStatement(ReviewStatementInput),
    RejectStatement(ReviewStatementInput),
    RequestCorrection(ReviewStatementInput),
    CreateFinalStatement(CreateFinalStatementInput),
    MarkReadyForDisbursement { final_statement_id: EntityId },
    CreateDisbursement(CreateDisbursementInput),
    BeginProcessing(DisbursementTransitionInput),
    MarkSentToBank(DisbursementTransitionInput),
    ConfirmPayment(ConfirmPaymentInput),
    RetryDisbursement(DisbursementTransitionInput),
    CancelDisbursement(DisbursementTransitionInput),
    CompleteBatch { batch_id: EntityId, now: NaiveDateTime },
    FailBatch { batch_id: EntityId, now: NaiveDateTime },
    CancelBatch { batch_id: EntityId, now: NaiveDateTime },
    CreateClawback(CreateClawbackInput),
    ScheduleRecoveryPlan(ScheduleRecoveryPlanInput),
    RecordRecovery(RecordRecoveryInput),
    WaiveClawback(CloseClawbackInput),
    WriteOffClawback(CloseClawbackInput),
    CreateSuspense(CreateSuspenseInput),
    ResolveSuspense(CloseSuspenseInput),
    WriteOffSuspense(CloseSuspenseInput),
    AgingReport { as_of: NaiveDate },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum ActivityOutcome {
    Validated,
    Batch(CommissionBatch),
    Commission(CommissionOutcome),
    TrialStatements(Vec<TrialStatement>),
    TrialStatement(TrialStatement),
    FinalStatement(FinalStatement),
    Disbursement(Disbursement),
    Clawback(Clawback),
    RecoveryPlan(Vec<ClawbackRecovery>),
    Suspense(SuspenseAccount),
    Aging(AgingReport),
}

/// Route one activity to the engine. The executor serializes the outcome
/// back into its history; a typed failure propagates as the activity error.
pub fn dispatch(engine: &PayoutEngine, activity: Activity) -> PayoutResult<ActivityOutcome> {
    match activity {
        Activity::ValidateInput(input) => {
            engine.validate_policy_input(&input)?;
            Ok(ActivityOutcome::Validated)
        }
        Activity::CreateBatch(input) => engine.create_batch(&input).map(ActivityOutcome::Batch),
        Activity::CalculateCommission(input) => engine
            .calculate_commission(&input)
            .map(ActivityOutcome::Commission),
        Activity::GenerateTrialStatements(input) => engine
            .generate_trial_statements(&input)
            .map(ActivityOutcome::TrialStatements),
        Activity::ApproveStatement(input) => engine
            .approve_statement(&input)
            .map(ActivityOutcome::TrialStatement),
        Activity::RejectStatement(input) => engine
            .reject_statement(&input)
            .map(ActivityOutcome::TrialStatement),
        Activity::RequestCorrection(input) => engine
            .request_correction(&input)
            .map(ActivityOutcome::TrialStatement),
        Activity::CreateFinalStatement(input) => engine
            .create_final_statement(&input)
            .map(ActivityOutcome::FinalStatement),
        Activity::MarkReadyForDisbursement { final_statement_id } => engine
            .mark_ready_for_disbursement(&final_statement_id)
            .map(ActivityOutcome::FinalStatement),
        Activity::CreateDisbursement(input) => engine
            .create_disbursement(&input)
            .map(ActivityOutcome::Disbursement),
        Activity::BeginProcessing(input) => engine
            .begin_processing(&input)
            .map(ActivityOutcome::Disbursement),
        Activity::MarkSentToBank(input) => engine
            .mark_sent_to_bank(&input)
            .map(ActivityOutcome::Disbursement),
        Activity::ConfirmPayment(input) => engine
            .confirm_payment(&input)
            .map(ActivityOutcome::Disbursement),
        Activity::RetryDisbursement(input) => engine
            .retry_disbursement(&input)
            .map(ActivityOutcome::Disbursement),
        Activity::CancelDisbursement(input) => engine
            .cancel_disbursement(&input)
            .map(ActivityOutcome::Disbursement),
        Activity::CompleteBatch { batch_id, now } => engine
            .complete_batch(&batch_id, now)
            .map(ActivityOutcome::Batch),
        Activity::FailBatch { batch_id, now } => engine
            .fail_batch(&batch_id, now)
            .map(ActivityOutcome::Batch),
        Activity::CancelBatch { batch_id, now } => engine
            .cancel_batch(&batch_id, now)
            .map(ActivityOutcome::Batch),
        Activity::CreateClawback(input) => engine
            .create_clawback(&input)
            .map(ActivityOutcome::Clawback),
        Activity::ScheduleRecoveryPlan(input) => engine
            .schedule_recovery_plan(&input)
            .map(ActivityOutcome::RecoveryPlan),
        Activity::RecordRecovery(input) => engine
            .record_recovery(&input)
            .map(ActivityOutcome::Clawback),
        Activity::WaiveClawback(input) => engine
            .waive_clawback(&input)
            .map(ActivityOutcome::Clawback),
        Activity::WriteOffClawback(input) => engine
            .write_off_clawback(&input)
            .map(ActivityOutcome::Clawback),
        Activity::CreateSuspense(input) => engine
            .create_suspense(&input)
            .map(ActivityOutcome::Suspense),
        Activity::ResolveSuspense(input) => engine
            .resolve_suspense(&input)
            .map(ActivityOutcome::Suspense),
        Activity::WriteOffSuspense(input) => engine
            .write_off_suspense(&input)
            .map(ActivityOutcome::Suspense),
        Activity::AgingReport { as_of } => engine.aging_report(as_of).map(ActivityOutcome::Aging),
    }
}
