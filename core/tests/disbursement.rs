//! Integration tests for the disbursement state machine.
//!
//! Covers the optimistic lock, the retry cap, cheque vs EFT paths,
//! cancellation rules and webhook confirmation semantics.

use chrono::{NaiveDate, NaiveDateTime};
use payout_core::{
    activity::{
        ConfirmPaymentInput, CreateBatchInput, CreateDisbursementInput,
        CreateFinalStatementInput, DisbursementTransitionInput, GenerateTrialStatementsInput,
        PolicyCommissionInput, ReviewStatementInput,
    },
    calculator::CommissionType,
    disbursement::{Disbursement, DisbursementStatus, PaymentInstrument, MAX_RETRIES},
    error::PayoutError,
    statement::FinalStatementStatus,
    PayoutEngine,
};

fn build() -> PayoutEngine {
    PayoutEngine::build_test().expect("build_test failed")
}

fn dt(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, day)
        .expect("valid date")
        .and_hms_opt(hour, 0, 0)
        .expect("valid time")
}

fn eft() -> PaymentInstrument {
    PaymentInstrument::Eft {
        account_no: "910012345678".to_string(),
        ifsc_code: "HDFC0001234".to_string(),
        account_holder: "AGT-001".to_string(),
    }
}

fn cheque() -> PaymentInstrument {
    PaymentInstrument::Cheque {
        cheque_no: "CHQ-000101".to_string(),
        payee_name: "AGT-001".to_string(),
        payable_at_branch: "Mumbai Fort".to_string(),
    }
}

/// Drive a one-policy batch all the way to a disbursement in PENDING.
fn create_disbursement(engine: &PayoutEngine, instrument: PaymentInstrument) -> Disbursement {
    let batch = engine
        .create_batch(&CreateBatchInput {
            month: 1,
            year: 2025,
            total_policies: 1,
            workflow_id: "wf-disb".to_string(),
            now: dt(3, 9),
        })
        .expect("create_batch failed");
    engine
        .calculate_commission(&PolicyCommissionInput {
            batch_id: batch.batch_id.clone(),
            policy_no: "POL-1".to_string(),
            agent_id: "AGT-001".to_string(),
            product_type: "TERM_LIFE".to_string(),
            agent_type: "INDIVIDUAL".to_string(),
            plan_code: "TL-10".to_string(),
            policy_term_years: 10,
            premium: 10_000.0,
            commission_type: CommissionType::FirstYear,
            pan_verified: true,
            as_of: NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date"),
            workflow_id: "wf-disb".to_string(),
            now: dt(3, 9),
        })
        .expect("calculate failed");
    let trials = engine
        .generate_trial_statements(&GenerateTrialStatementsInput {
            batch_id: batch.batch_id.clone(),
            now: dt(3, 9),
        })
        .expect("generate failed");
    let approved = engine
        .approve_statement(&ReviewStatementInput {
            statement_id: trials[0].statement_id.clone(),
            reviewed_by: "finance.head".to_string(),
            remarks: None,
            now: dt(3, 9),
        })
        .expect("approve failed");
    let final_statement = engine
        .create_final_statement(&CreateFinalStatementInput {
            trial_statement_id: approved.statement_id.clone(),
            partial_amount: None,
            now: dt(3, 9),
        })
        .expect("finalize failed");
    engine
        .mark_ready_for_disbursement(&final_statement.final_statement_id)
        .expect("mark ready failed");
    engine
        .create_disbursement(&CreateDisbursementInput {
            final_statement_id: final_statement.final_statement_id.clone(),
            instrument,
            // Friday 2025-01-03: the 10-working-day SLA spans two weekends.
            now: dt(3, 10),
        })
        .expect("create_disbursement failed")
}

fn transition(d: &Disbursement, day: u32) -> DisbursementTransitionInput {
    DisbursementTransitionInput {
        disbursement_id: d.disbursement_id.clone(),
        version: d.version,
        now: dt(day, 11),
    }
}

fn confirm(d: &Disbursement, success: bool, day: u32) -> ConfirmPaymentInput {
    ConfirmPaymentInput {
        disbursement_id: d.disbursement_id.clone(),
        utr_number: success.then(|| "UTR000000000001".to_string()),
        success,
        failure_code: (!success).then(|| "ACCOUNT_CLOSED".to_string()),
        now: dt(day, 12),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Creation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn creation_requires_ready_final_statement_and_is_one_to_one() {
    let engine = build();
    let d = create_disbursement(&engine, eft());
    assert_eq!(d.status, DisbursementStatus::Pending);
    assert_eq!(d.version, 1);
    assert_eq!(d.retry_count, 0);

    // Replay returns the same disbursement, not a second one.
    let replay = engine
        .create_disbursement(&CreateDisbursementInput {
            final_statement_id: d.final_statement_id.clone(),
            instrument: eft(),
            now: dt(3, 11),
        })
        .expect("replay failed");
    assert_eq!(replay.disbursement_id, d.disbursement_id);
}

#[test]
fn sla_deadline_skips_weekends() {
    let engine = build();
    let d = create_disbursement(&engine, eft());
    // Friday Jan 3 + 10 working days = Friday Jan 17 (two weekends skipped).
    assert_eq!(
        d.sla_deadline.date(),
        NaiveDate::from_ymd_opt(2025, 1, 17).expect("valid date")
    );
    assert!(!d.is_sla_breached(d.sla_deadline));
    assert!(d.is_sla_breached(d.sla_deadline + chrono::Duration::minutes(1)));
}

#[test]
fn eft_instrument_with_missing_fields_is_rejected() {
    let engine = build();
    let d = create_disbursement(&engine, eft());
    // Build a second final statement path is heavyweight; validate directly.
    let incomplete = PaymentInstrument::Eft {
        account_no: String::new(),
        ifsc_code: "HDFC0001234".to_string(),
        account_holder: "AGT-001".to_string(),
    };
    assert!(matches!(
        incomplete.validate(),
        Err(PayoutError::Validation { .. })
    ));
    assert!(d.instrument.validate().is_ok());
}

// ─────────────────────────────────────────────────────────────────────────────
// Optimistic locking
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn two_writers_holding_same_version_exactly_one_wins() {
    let engine = build();
    let d = create_disbursement(&engine, eft());
    assert_eq!(d.version, 1);

    // Both callers read version 1; the first write bumps it.
    let winner = engine
        .begin_processing(&transition(&d, 6))
        .expect("first writer failed");
    assert_eq!(winner.version, 2);

    let loser = engine.begin_processing(&transition(&d, 6));
    match loser {
        Err(PayoutError::OptimisticLock { expected: 1, actual: 2, .. }) => {}
        other => panic!("expected OptimisticLock, got {other:?}"),
    }

    // The row reflects exactly one transition.
    let reread = engine
        .store
        .get_disbursement(&d.disbursement_id)
        .expect("get failed");
    assert_eq!(reread.status, DisbursementStatus::Processing);
    assert_eq!(reread.version, 2);
}

#[test]
fn every_transition_bumps_the_version() {
    let engine = build();
    let d = create_disbursement(&engine, eft());
    let d = engine.begin_processing(&transition(&d, 6)).expect("processing failed");
    assert_eq!(d.version, 2);
    let d = engine.mark_sent_to_bank(&transition(&d, 6)).expect("sent failed");
    assert_eq!(d.version, 3);
    let d = engine.confirm_payment(&confirm(&d, true, 7)).expect("confirm failed");
    assert_eq!(d.version, 4);
}

// ─────────────────────────────────────────────────────────────────────────────
// EFT and cheque paths
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn eft_walks_through_sent_to_bank() {
    let engine = build();
    let d = create_disbursement(&engine, eft());
    let d = engine.begin_processing(&transition(&d, 6)).expect("processing failed");
    let d = engine.mark_sent_to_bank(&transition(&d, 6)).expect("sent failed");
    assert_eq!(d.status, DisbursementStatus::SentToBank);

    let d = engine.confirm_payment(&confirm(&d, true, 7)).expect("confirm failed");
    assert_eq!(d.status, DisbursementStatus::Completed);
    assert_eq!(d.utr_number.as_deref(), Some("UTR000000000001"));
    assert!(d.completed_at.is_some());

    // Completion flips the final statement to DISBURSED.
    let statement = engine
        .store
        .get_final_statement(&d.final_statement_id)
        .expect("get final failed");
    assert_eq!(statement.status, FinalStatementStatus::Disbursed);
}

#[test]
fn cheque_completes_from_processing_and_has_no_bank_leg() {
    let engine = build();
    let d = create_disbursement(&engine, cheque());
    let d = engine.begin_processing(&transition(&d, 6)).expect("processing failed");

    let bank_leg = engine.mark_sent_to_bank(&transition(&d, 6));
    assert!(matches!(bank_leg, Err(PayoutError::Validation { .. })));

    let d = engine.confirm_payment(&confirm(&d, true, 7)).expect("confirm failed");
    assert_eq!(d.status, DisbursementStatus::Completed);
}

#[test]
fn duplicate_success_webhook_is_acknowledged_idempotently() {
    let engine = build();
    let d = create_disbursement(&engine, eft());
    let d = engine.begin_processing(&transition(&d, 6)).expect("processing failed");
    let d = engine.mark_sent_to_bank(&transition(&d, 6)).expect("sent failed");
    let first = engine.confirm_payment(&confirm(&d, true, 7)).expect("confirm failed");
    let second = engine.confirm_payment(&confirm(&d, true, 7)).expect("duplicate failed");
    assert_eq!(first.version, second.version);
    assert_eq!(second.status, DisbursementStatus::Completed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure, retry cap, cancellation
// ─────────────────────────────────────────────────────────────────────────────

fn fail_once(engine: &PayoutEngine, d: &Disbursement, day: u32) -> Disbursement {
    let d = engine.begin_processing(&transition(d, day)).expect("processing failed");
    let d = engine.mark_sent_to_bank(&transition(&d, day)).expect("sent failed");
    engine.confirm_payment(&confirm(&d, false, day)).expect("fail confirm failed")
}

#[test]
fn failed_disbursement_retries_with_fresh_idempotency_key() {
    let engine = build();
    let d = create_disbursement(&engine, eft());
    let original_key = d.idempotency_key.clone();
    let failed = fail_once(&engine, &d, 6);
    assert_eq!(failed.status, DisbursementStatus::Failed);
    assert_eq!(failed.failure_code.as_deref(), Some("ACCOUNT_CLOSED"));
    assert!(failed.can_retry());

    let retried = engine
        .retry_disbursement(&transition(&failed, 7))
        .expect("retry failed");
    assert_eq!(retried.status, DisbursementStatus::Pending);
    assert_eq!(retried.retry_count, 1);
    assert_eq!(retried.disbursement_id, d.disbursement_id);
    assert_ne!(retried.idempotency_key, original_key);
    assert!(retried.failure_code.is_none());
}

#[test]
fn retries_are_capped_at_three() {
    let engine = build();
    let mut d = create_disbursement(&engine, eft());
    for day in [6, 7, 8] {
        let failed = fail_once(&engine, &d, day);
        d = engine
            .retry_disbursement(&transition(&failed, day))
            .expect("retry failed");
    }
    assert_eq!(d.retry_count, MAX_RETRIES);

    let failed = fail_once(&engine, &d, 9);
    assert!(!failed.can_retry());
    let exhausted = engine.retry_disbursement(&transition(&failed, 9));
    assert!(matches!(exhausted, Err(PayoutError::InvalidState { .. })));
}

#[test]
fn sent_to_bank_cannot_be_cancelled() {
    let engine = build();
    let d = create_disbursement(&engine, eft());
    let d = engine.begin_processing(&transition(&d, 6)).expect("processing failed");
    let d = engine.mark_sent_to_bank(&transition(&d, 6)).expect("sent failed");

    // Money already left for the bank: reconcile via webhook, never cancel.
    let result = engine.cancel_disbursement(&transition(&d, 6));
    assert!(matches!(result, Err(PayoutError::InvalidState { .. })));
}

#[test]
fn pending_disbursement_can_be_cancelled() {
    let engine = build();
    let d = create_disbursement(&engine, eft());
    let cancelled = engine
        .cancel_disbursement(&transition(&d, 6))
        .expect("cancel failed");
    assert_eq!(cancelled.status, DisbursementStatus::Cancelled);
}
