//! Integration tests for suspense accounts.
//!
//! Covers the priority matrix, resolution deadlines, aging buckets, the
//! aging report, workflow-id de-duplication and terminal closes.

use chrono::{NaiveDate, NaiveDateTime};
use payout_core::{
    activity::{CloseSuspenseInput, CreateSuspenseInput},
    error::PayoutError,
    suspense::{
        aging_bucket, priority_for, resolution_deadline, AgingBucket, SuspensePriority,
        SuspenseReason, SuspenseStatus,
    },
    PayoutEngine,
};

fn build() -> PayoutEngine {
    PayoutEngine::build_test().expect("build_test failed")
}

fn dt(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .expect("valid date")
        .and_hms_opt(10, 0, 0)
        .expect("valid time")
}

fn suspense_input(workflow_id: &str, amount: f64, reason: SuspenseReason) -> CreateSuspenseInput {
    CreateSuspenseInput {
        policy_no: Some("POL-1".to_string()),
        agent_id: Some("AGT-001".to_string()),
        amount,
        reason,
        description: "undeliverable payout".to_string(),
        workflow_id: workflow_id.to_string(),
        now: dt(2025, 1, 1),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Priority matrix
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn priority_matrix() {
    use SuspensePriority::*;
    use SuspenseReason::*;
    // Amount threshold dominates for ordinary reasons.
    assert_eq!(priority_for(60_000.0, Other), High);
    assert_eq!(priority_for(50_000.0, Other), High);
    assert_eq!(priority_for(49_999.99, Other), Medium);
    assert_eq!(priority_for(10_000.0, Other), Medium);
    assert_eq!(priority_for(9_999.99, Other), Low);
    assert_eq!(priority_for(500.0, InvalidAccountDetails), Low);
    // Sensitive reasons are HIGH regardless of amount.
    assert_eq!(priority_for(100.0, DuplicatePayment), High);
    assert_eq!(priority_for(100.0, DisputeUnderReview), High);
}

#[test]
fn resolution_deadlines_by_priority() {
    let opened = NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date");
    assert_eq!(
        resolution_deadline(opened, SuspensePriority::High),
        NaiveDate::from_ymd_opt(2025, 1, 8).expect("valid date")
    );
    assert_eq!(
        resolution_deadline(opened, SuspensePriority::Medium),
        NaiveDate::from_ymd_opt(2025, 1, 16).expect("valid date")
    );
    assert_eq!(
        resolution_deadline(opened, SuspensePriority::Low),
        NaiveDate::from_ymd_opt(2025, 1, 31).expect("valid date")
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Aging buckets
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn bucket_boundaries_are_inclusive_upper_bounds() {
    assert_eq!(aging_bucket(0), AgingBucket::UpTo30);
    assert_eq!(aging_bucket(30), AgingBucket::UpTo30);
    assert_eq!(aging_bucket(31), AgingBucket::Days31To60);
    assert_eq!(aging_bucket(45), AgingBucket::Days31To60);
    assert_eq!(aging_bucket(60), AgingBucket::Days31To60);
    assert_eq!(aging_bucket(61), AgingBucket::Days61To90);
    assert_eq!(aging_bucket(90), AgingBucket::Days61To90);
    assert_eq!(aging_bucket(91), AgingBucket::Days91To180);
    assert_eq!(aging_bucket(180), AgingBucket::Days91To180);
    assert_eq!(aging_bucket(181), AgingBucket::Over180);
    assert_eq!(aging_bucket(365), AgingBucket::Over180);
}

// ─────────────────────────────────────────────────────────────────────────────
// High-value OTHER entry aging past its deadline
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn high_value_entry_ages_into_the_31_to_60_bucket() {
    let engine = build();
    let suspense = engine
        .create_suspense(&suspense_input("wf-s1", 60_000.0, SuspenseReason::Other))
        .expect("create failed");

    assert_eq!(suspense.priority, SuspensePriority::High);
    assert_eq!(
        suspense.resolution_deadline,
        NaiveDate::from_ymd_opt(2025, 1, 8).expect("valid date")
    );

    let day_45 = NaiveDate::from_ymd_opt(2025, 2, 15).expect("valid date");
    assert_eq!(suspense.aging_days(day_45), 45);
    assert_eq!(suspense.bucket(day_45), AgingBucket::Days31To60);
    assert!(suspense.is_overdue(day_45));
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflow de-duplication
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn replayed_creation_returns_the_existing_entry() {
    let engine = build();
    let first = engine
        .create_suspense(&suspense_input("wf-dup", 5_000.0, SuspenseReason::BankRejected))
        .expect("create failed");
    let replay = engine
        .create_suspense(&suspense_input("wf-dup", 5_000.0, SuspenseReason::BankRejected))
        .expect("replay failed");
    assert_eq!(first.suspense_id, replay.suspense_id);
    assert_eq!(engine.store.open_suspense_count().expect("count failed"), 1);
}

#[test]
fn different_workflows_create_separate_entries() {
    let engine = build();
    engine
        .create_suspense(&suspense_input("wf-a", 5_000.0, SuspenseReason::Other))
        .expect("create failed");
    engine
        .create_suspense(&suspense_input("wf-b", 5_000.0, SuspenseReason::Other))
        .expect("create failed");
    assert_eq!(engine.store.open_suspense_count().expect("count failed"), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Aging report
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn report_aggregates_open_entries_per_bucket() {
    let engine = build();
    // Three entries opened on Jan 1; one resolved before the report.
    for (wf, amount) in [("wf-1", 60_000.0), ("wf-2", 12_000.0), ("wf-3", 2_000.0)] {
        engine
            .create_suspense(&suspense_input(wf, amount, SuspenseReason::Other))
            .expect("create failed");
    }
    let resolved = engine
        .create_suspense(&suspense_input("wf-4", 9_000.0, SuspenseReason::Other))
        .expect("create failed");
    engine
        .resolve_suspense(&CloseSuspenseInput {
            suspense_id: resolved.suspense_id.clone(),
            remarks: "bank details corrected".to_string(),
            now: dt(2025, 1, 5),
        })
        .expect("resolve failed");

    let report = engine
        .aging_report(NaiveDate::from_ymd_opt(2025, 2, 15).expect("valid date"))
        .expect("report failed");

    assert_eq!(report.open_count, 3);
    assert!((report.open_amount - 74_000.0).abs() < 0.001);

    let bucket = report
        .buckets
        .iter()
        .find(|l| l.bucket == AgingBucket::Days31To60)
        .expect("bucket missing");
    assert_eq!(bucket.label, "31-60 days");
    assert_eq!(bucket.count, 3);
    assert!((bucket.amount - 74_000.0).abs() < 0.001);

    // All three open entries are past even the LOW 30-day deadline.
    assert_eq!(report.overdue_count, 3);
    assert!((report.overdue_amount - 74_000.0).abs() < 0.001);
}

// ─────────────────────────────────────────────────────────────────────────────
// Terminal closes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn resolve_stamps_remarks_and_timestamp() {
    let engine = build();
    let suspense = engine
        .create_suspense(&suspense_input("wf-r", 5_000.0, SuspenseReason::MissingPanDetails))
        .expect("create failed");
    let resolved = engine
        .resolve_suspense(&CloseSuspenseInput {
            suspense_id: suspense.suspense_id.clone(),
            remarks: "PAN received".to_string(),
            now: dt(2025, 1, 10),
        })
        .expect("resolve failed");
    assert_eq!(resolved.status, SuspenseStatus::Resolved);
    assert_eq!(resolved.resolution_remarks.as_deref(), Some("PAN received"));
    assert!(resolved.resolved_at.is_some());
}

#[test]
fn closed_entry_cannot_be_closed_again() {
    let engine = build();
    let suspense = engine
        .create_suspense(&suspense_input("wf-w", 5_000.0, SuspenseReason::Other))
        .expect("create failed");
    engine
        .write_off_suspense(&CloseSuspenseInput {
            suspense_id: suspense.suspense_id.clone(),
            remarks: "unrecoverable".to_string(),
            now: dt(2025, 1, 10),
        })
        .expect("write off failed");
    let again = engine.resolve_suspense(&CloseSuspenseInput {
        suspense_id: suspense.suspense_id.clone(),
        remarks: "oops".to_string(),
        now: dt(2025, 1, 11),
    });
    assert!(matches!(again, Err(PayoutError::InvalidState { .. })));
}
