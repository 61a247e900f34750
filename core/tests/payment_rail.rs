//! Tests for payment rail contracts and GL voucher builders.

use chrono::NaiveDate;
use payout_core::{
    clawback::{Clawback, ClawbackTrigger},
    disbursement::{Disbursement, PaymentInstrument},
    error::PayoutError,
    payment_rail::{
        parse_payment_confirmation, sign_payload, verify_signature, EftPaymentRequest,
        PaymentWebhookStatus,
    },
    statement::{FinalStatement, FinalStatementStatus},
    voucher,
};

const SECRET: &[u8] = b"test-webhook-secret";

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).expect("valid date")
}

fn final_statement() -> FinalStatement {
    FinalStatement {
        final_statement_id: "FS-1".to_string(),
        trial_statement_id: "TS-1".to_string(),
        agent_id: "AGT-001".to_string(),
        gross_amount: 2_500.0,
        tds_amount: 125.0,
        net_amount: 2_375.0,
        partial: false,
        status: FinalStatementStatus::ReadyForDisbursement,
        created_at: date(3).and_hms_opt(10, 0, 0).expect("valid time"),
        disbursed_at: None,
    }
}

fn eft_disbursement() -> Disbursement {
    Disbursement::new(
        &final_statement(),
        PaymentInstrument::Eft {
            account_no: "910012345678".to_string(),
            ifsc_code: "HDFC0001234".to_string(),
            account_holder: "AGT-001".to_string(),
        },
        date(3).and_hms_opt(10, 0, 0).expect("valid time"),
    )
    .expect("disbursement build failed")
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook signature
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn valid_signature_round_trips() {
    let payload = br#"{"disbursement_id":"D-1","utr_number":"UTR1","status":"SUCCESS"}"#;
    let signature = sign_payload(SECRET, payload).expect("sign failed");
    assert!(verify_signature(SECRET, payload, &signature).is_ok());

    let confirmation =
        parse_payment_confirmation(SECRET, payload, &signature).expect("parse failed");
    assert_eq!(confirmation.disbursement_id, "D-1");
    assert_eq!(confirmation.utr_number.as_deref(), Some("UTR1"));
    assert_eq!(confirmation.status, PaymentWebhookStatus::Success);
    assert!(confirmation.failure_code.is_none());
}

#[test]
fn tampered_payload_is_rejected_before_parsing() {
    let payload = br#"{"disbursement_id":"D-1","utr_number":"UTR1","status":"SUCCESS"}"#;
    let signature = sign_payload(SECRET, payload).expect("sign failed");
    let tampered = br#"{"disbursement_id":"D-2","utr_number":"UTR1","status":"SUCCESS"}"#;
    assert!(matches!(
        parse_payment_confirmation(SECRET, tampered, &signature),
        Err(PayoutError::BadSignature)
    ));
}

#[test]
fn wrong_secret_is_rejected() {
    let payload = br#"{"disbursement_id":"D-1","status":"FAILED","failure_code":"ACCOUNT_CLOSED"}"#;
    let signature = sign_payload(SECRET, payload).expect("sign failed");
    assert!(matches!(
        verify_signature(b"other-secret", payload, &signature),
        Err(PayoutError::BadSignature)
    ));
}

#[test]
fn garbage_signature_hex_is_rejected() {
    let payload = br#"{"disbursement_id":"D-1","status":"SUCCESS"}"#;
    assert!(matches!(
        verify_signature(SECRET, payload, "not-hex!"),
        Err(PayoutError::BadSignature)
    ));
}

#[test]
fn failure_webhook_carries_the_failure_code() {
    let payload =
        br#"{"disbursement_id":"D-1","utr_number":null,"status":"FAILED","failure_code":"NRE_ACCOUNT"}"#;
    let signature = sign_payload(SECRET, payload).expect("sign failed");
    let confirmation =
        parse_payment_confirmation(SECRET, payload, &signature).expect("parse failed");
    assert_eq!(confirmation.status, PaymentWebhookStatus::Failed);
    assert_eq!(confirmation.failure_code.as_deref(), Some("NRE_ACCOUNT"));
}

// ─────────────────────────────────────────────────────────────────────────────
// EFT request construction
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn eft_request_carries_the_idempotency_key() {
    let disbursement = eft_disbursement();
    let request = EftPaymentRequest::for_disbursement(&disbursement).expect("request failed");
    assert_eq!(request.idempotency_key, disbursement.idempotency_key);
    assert_eq!(request.disbursement_id, disbursement.disbursement_id);
    assert_eq!(request.amount, disbursement.amount);
    assert_eq!(request.ifsc_code, "HDFC0001234");
}

#[test]
fn cheque_disbursement_has_no_eft_request() {
    let disbursement = Disbursement::new(
        &final_statement(),
        PaymentInstrument::Cheque {
            cheque_no: "CHQ-1".to_string(),
            payee_name: "AGT-001".to_string(),
            payable_at_branch: "Mumbai Fort".to_string(),
        },
        date(3).and_hms_opt(10, 0, 0).expect("valid time"),
    )
    .expect("disbursement build failed");
    assert!(matches!(
        EftPaymentRequest::for_disbursement(&disbursement),
        Err(PayoutError::Validation { .. })
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Voucher builders
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn commission_payment_voucher_balances_gross_against_tds_and_net() {
    let statement = final_statement();
    let disbursement = eft_disbursement();
    let voucher = voucher::commission_payment_voucher(&statement, &disbursement, date(6))
        .expect("voucher failed");
    assert!(voucher.is_balanced());
    assert_eq!(voucher.entries.len(), 3);
    assert!((voucher.total_debit() - statement.gross_amount).abs() < 0.001);
    assert!((voucher.total_credit() - (statement.tds_amount + statement.net_amount)).abs() < 0.001);
}

#[test]
fn recovery_and_suspense_vouchers_balance() {
    let now = date(6).and_hms_opt(10, 0, 0).expect("valid time");
    let clawback = Clawback::new(
        "POL-1",
        "AGT-001",
        ClawbackTrigger::Lapsed,
        date(1),
        2_375.0,
        now,
    )
    .expect("clawback build failed");
    let recovery_voucher =
        voucher::clawback_recovery_voucher(&clawback, 500.0, date(6)).expect("voucher failed");
    assert!(recovery_voucher.is_balanced());

    let suspense = payout_core::suspense::SuspenseAccount::new(
        Some("POL-1".to_string()),
        Some("AGT-001".to_string()),
        60_000.0,
        payout_core::suspense::SuspenseReason::Other,
        "undeliverable",
        "wf-v".to_string(),
        now,
    )
    .expect("suspense build failed");
    let parking = voucher::suspense_parking_voucher(&suspense, date(6)).expect("voucher failed");
    assert!(parking.is_balanced());
    let release =
        voucher::suspense_resolution_voucher(&suspense, date(10)).expect("voucher failed");
    assert!(release.is_balanced());
}
