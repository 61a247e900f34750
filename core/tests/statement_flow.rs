//! Integration tests for trial → final statement flow.
//!
//! Covers aggregation totals, approval gating, partial disbursement
//! draw-down, and the READY_FOR_DISBURSEMENT gate.

use chrono::{NaiveDate, NaiveDateTime};
use payout_core::{
    activity::{
        CreateBatchInput, CreateFinalStatementInput, GenerateTrialStatementsInput,
        PolicyCommissionInput, ReviewStatementInput,
    },
    calculator::CommissionType,
    error::PayoutError,
    statement::{FinalStatementStatus, TrialStatement, TrialStatementStatus},
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

/// Run a two-agent batch through calculation and trial generation.
/// Agent AGT-001 gets two policies, AGT-002 one.
fn generate_trials(engine: &PayoutEngine) -> Vec<TrialStatement> {
    let batch = engine
        .create_batch(&CreateBatchInput {
            month: 1,
            year: 2025,
            total_policies: 3,
            workflow_id: "wf-stmt".to_string(),
            now: dt(31, 9),
        })
        .expect("create_batch failed");
    for (policy_no, agent_id, plan, term) in [
        ("POL-1", "AGT-001", "TL-10", 10u32),
        ("POL-2", "AGT-001", "TL-20", 20),
        ("POL-3", "AGT-002", "TL-10", 10),
    ] {
        engine
            .calculate_commission(&PolicyCommissionInput {
                batch_id: batch.batch_id.clone(),
                policy_no: policy_no.to_string(),
                agent_id: agent_id.to_string(),
                product_type: "TERM_LIFE".to_string(),
                agent_type: "INDIVIDUAL".to_string(),
                plan_code: plan.to_string(),
                policy_term_years: term,
                premium: 10_000.0,
                commission_type: CommissionType::FirstYear,
                pan_verified: true,
                as_of: NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date"),
                workflow_id: "wf-stmt".to_string(),
                now: dt(31, 10),
            })
            .expect("calculate failed");
    }
    engine
        .generate_trial_statements(&GenerateTrialStatementsInput {
            batch_id: batch.batch_id.clone(),
            now: dt(31, 11),
        })
        .expect("generate failed")
}

fn approve(engine: &PayoutEngine, statement_id: &str) -> TrialStatement {
    engine
        .approve_statement(&ReviewStatementInput {
            statement_id: statement_id.to_string(),
            reviewed_by: "finance.head".to_string(),
            remarks: Some("verified".to_string()),
            now: dt(31, 12),
        })
        .expect("approve failed")
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn one_statement_per_agent_with_summed_totals() {
    let engine = build();
    let trials = generate_trials(&engine);
    assert_eq!(trials.len(), 2);

    for trial in &trials {
        let txns = engine
            .store
            .transactions_for_statement(&trial.statement_id)
            .expect("transactions failed");
        assert_eq!(txns.len() as i64, trial.policy_count);
        let gross: f64 = txns.iter().map(|t| t.gross_amount).sum();
        let tds: f64 = txns.iter().map(|t| t.tds_amount).sum();
        let net: f64 = txns.iter().map(|t| t.net_amount).sum();
        assert!((trial.gross_amount - gross).abs() < 0.001);
        assert!((trial.tds_amount - tds).abs() < 0.001);
        assert!((trial.net_amount - net).abs() < 0.001);
        assert_eq!(trial.status, TrialStatementStatus::PendingApproval);
    }

    // AGT-001: TL-10 at 25% plus TL-20 at 30% of 10k premium, 5% TDS.
    let agent_one = trials.iter().find(|t| t.agent_id == "AGT-001").expect("missing agent");
    assert_eq!(agent_one.policy_count, 2);
    assert!((agent_one.gross_amount - 5500.0).abs() < 0.001);
    assert!((agent_one.net_amount - 5225.0).abs() < 0.001);
}

#[test]
fn regenerating_after_advance_returns_existing_statements() {
    let engine = build();
    let trials = generate_trials(&engine);
    let replay = engine
        .generate_trial_statements(&GenerateTrialStatementsInput {
            batch_id: trials[0].batch_id.clone(),
            now: dt(31, 12),
        })
        .expect("replay failed");
    assert_eq!(replay.len(), trials.len());
}

// ─────────────────────────────────────────────────────────────────────────────
// Approval gate
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn approve_stamps_reviewer_and_timestamp() {
    let engine = build();
    let trials = generate_trials(&engine);
    let approved = approve(&engine, &trials[0].statement_id);
    assert_eq!(approved.status, TrialStatementStatus::Approved);
    assert_eq!(approved.reviewed_by.as_deref(), Some("finance.head"));
    assert!(approved.reviewed_at.is_some());
}

#[test]
fn reject_after_approve_is_invalid_state() {
    let engine = build();
    let trials = generate_trials(&engine);
    approve(&engine, &trials[0].statement_id);
    let result = engine.reject_statement(&ReviewStatementInput {
        statement_id: trials[0].statement_id.clone(),
        reviewed_by: "finance.head".to_string(),
        remarks: None,
        now: dt(31, 13),
    });
    assert!(matches!(result, Err(PayoutError::InvalidState { .. })));
}

#[test]
fn replayed_approval_by_same_reviewer_is_acknowledged() {
    let engine = build();
    let trials = generate_trials(&engine);
    let first = approve(&engine, &trials[0].statement_id);
    let replay = approve(&engine, &trials[0].statement_id);
    assert_eq!(first.reviewed_at, replay.reviewed_at);
}

#[test]
fn final_statement_requires_approval_first() {
    let engine = build();
    let trials = generate_trials(&engine);
    let result = engine.create_final_statement(&CreateFinalStatementInput {
        trial_statement_id: trials[0].statement_id.clone(),
        partial_amount: None,
        now: dt(31, 13),
    });
    assert!(matches!(result, Err(PayoutError::InvalidState { .. })));
}

// ─────────────────────────────────────────────────────────────────────────────
// Finalization: full and partial
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn full_final_statement_carries_approved_totals() {
    let engine = build();
    let trials = generate_trials(&engine);
    let approved = approve(&engine, &trials[0].statement_id);

    let final_statement = engine
        .create_final_statement(&CreateFinalStatementInput {
            trial_statement_id: approved.statement_id.clone(),
            partial_amount: None,
            now: dt(31, 13),
        })
        .expect("finalize failed");
    assert_eq!(final_statement.status, FinalStatementStatus::Finalized);
    assert!(!final_statement.partial);
    assert!((final_statement.net_amount - approved.net_amount).abs() < 0.001);

    // Transactions now carry the final statement link.
    let txns = engine
        .store
        .transactions_for_statement(&approved.statement_id)
        .expect("transactions failed");
    assert!(txns
        .iter()
        .all(|t| t.final_statement_id.as_deref() == Some(final_statement.final_statement_id.as_str())));

    // Replay returns the same statement.
    let replay = engine
        .create_final_statement(&CreateFinalStatementInput {
            trial_statement_id: approved.statement_id.clone(),
            partial_amount: None,
            now: dt(31, 14),
        })
        .expect("replay failed");
    assert_eq!(replay.final_statement_id, final_statement.final_statement_id);
}

#[test]
fn partial_final_statement_leaves_remainder_on_trial() {
    let engine = build();
    let trials = generate_trials(&engine);
    let approved = approve(&engine, &trials[0].statement_id);
    let partial_net = 2000.0;

    let partial = engine
        .create_final_statement(&CreateFinalStatementInput {
            trial_statement_id: approved.statement_id.clone(),
            partial_amount: Some(partial_net),
            now: dt(31, 13),
        })
        .expect("partial finalize failed");
    assert!(partial.partial);
    assert!((partial.net_amount - partial_net).abs() < 0.001);
    // Gross and TDS scale with the net subset, keeping net = gross - tds.
    assert!((partial.net_amount - (partial.gross_amount - partial.tds_amount)).abs() < 0.001);

    let trial = engine
        .store
        .get_trial_statement(&approved.statement_id)
        .expect("get trial failed");
    assert!((trial.disbursed_amount - partial_net).abs() < 0.001);
    assert!((trial.undisbursed_amount() - (approved.net_amount - partial_net)).abs() < 0.001);

    // The remainder can be drawn by a second partial, but no more than that.
    let remainder = trial.undisbursed_amount();
    engine
        .create_final_statement(&CreateFinalStatementInput {
            trial_statement_id: approved.statement_id.clone(),
            partial_amount: Some(remainder),
            now: dt(31, 14),
        })
        .expect("remainder finalize failed");
    let exhausted = engine.create_final_statement(&CreateFinalStatementInput {
        trial_statement_id: approved.statement_id.clone(),
        partial_amount: Some(100.0),
        now: dt(31, 15),
    });
    assert!(matches!(exhausted, Err(PayoutError::Validation { .. })));
}

#[test]
fn partial_exceeding_net_is_rejected() {
    let engine = build();
    let trials = generate_trials(&engine);
    let approved = approve(&engine, &trials[0].statement_id);
    let result = engine.create_final_statement(&CreateFinalStatementInput {
        trial_statement_id: approved.statement_id.clone(),
        partial_amount: Some(approved.net_amount + 1.0),
        now: dt(31, 13),
    });
    assert!(matches!(result, Err(PayoutError::Validation { .. })));
}

// ─────────────────────────────────────────────────────────────────────────────
// Ready gate
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn ready_gate_walks_finalized_to_ready() {
    let engine = build();
    let trials = generate_trials(&engine);
    let approved = approve(&engine, &trials[0].statement_id);
    let final_statement = engine
        .create_final_statement(&CreateFinalStatementInput {
            trial_statement_id: approved.statement_id.clone(),
            partial_amount: None,
            now: dt(31, 13),
        })
        .expect("finalize failed");

    let ready = engine
        .mark_ready_for_disbursement(&final_statement.final_statement_id)
        .expect("mark ready failed");
    assert_eq!(ready.status, FinalStatementStatus::ReadyForDisbursement);

    // Idempotent re-mark.
    let again = engine
        .mark_ready_for_disbursement(&final_statement.final_statement_id)
        .expect("re-mark failed");
    assert_eq!(again.status, FinalStatementStatus::ReadyForDisbursement);
}
