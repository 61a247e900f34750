//! Tests for commission calculation and rate resolution.

use chrono::NaiveDate;
use payout_core::{
    calculator::{
        calculate, tds_rate, CommissionInput, CommissionType, RENEWAL_RATE_FACTOR,
        TDS_RATE_WITHOUT_PAN, TDS_RATE_WITH_PAN,
    },
    error::PayoutError,
    rates::{resolve, CommissionRate, RateQuery},
};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn input(commission_type: CommissionType, pan_verified: bool) -> CommissionInput {
    CommissionInput {
        premium: 10_000.0,
        rate_percent: 25.0,
        commission_type,
        pan_verified,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Calculator
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn first_year_with_pan() {
    let amounts = calculate(&input(CommissionType::FirstYear, true)).expect("calculate failed");
    assert_eq!(amounts.applied_rate, 25.0);
    assert_eq!(amounts.tds_rate, TDS_RATE_WITH_PAN);
    assert!((amounts.gross - 2_500.0).abs() < 1e-9);
    assert!((amounts.tds - 125.0).abs() < 1e-9);
    assert!((amounts.net - 2_375.0).abs() < 1e-9);
}

#[test]
fn missing_pan_doubles_the_withholding() {
    let amounts = calculate(&input(CommissionType::FirstYear, false)).expect("calculate failed");
    assert_eq!(amounts.tds_rate, TDS_RATE_WITHOUT_PAN);
    assert!((amounts.tds - 250.0).abs() < 1e-9);
    assert!((amounts.net - 2_250.0).abs() < 1e-9);
}

#[test]
fn renewal_applies_thirty_percent_of_first_year_rate_before_tds() {
    let amounts = calculate(&input(CommissionType::Renewal, true)).expect("calculate failed");
    assert!((amounts.applied_rate - 25.0 * RENEWAL_RATE_FACTOR).abs() < 1e-9);
    assert!((amounts.gross - 750.0).abs() < 1e-9);
    assert!((amounts.tds - 37.5).abs() < 1e-9);
    assert!((amounts.net - 712.5).abs() < 1e-9);
}

#[test]
fn arithmetic_invariants_hold_across_inputs() {
    for premium in [1.0, 999.99, 10_000.0, 5_000_000.0] {
        for rate in [0.0, 2.5, 25.0, 40.0] {
            for pan in [true, false] {
                for kind in [CommissionType::FirstYear, CommissionType::Renewal] {
                    let amounts = calculate(&CommissionInput {
                        premium,
                        rate_percent: rate,
                        commission_type: kind,
                        pan_verified: pan,
                    })
                    .expect("calculate failed");
                    assert!(
                        (amounts.net - (amounts.gross - amounts.tds)).abs() < 1e-6,
                        "net != gross - tds for premium={premium} rate={rate}"
                    );
                    assert!(
                        (amounts.tds - amounts.gross * tds_rate(pan) / 100.0).abs() < 1e-6,
                        "tds formula broken for premium={premium} rate={rate}"
                    );
                }
            }
        }
    }
}

#[test]
fn determinism_across_repeated_calls() {
    let first = calculate(&input(CommissionType::FirstYear, true)).expect("calculate failed");
    for _ in 0..10 {
        let again = calculate(&input(CommissionType::FirstYear, true)).expect("calculate failed");
        assert_eq!(first.gross, again.gross);
        assert_eq!(first.tds, again.tds);
        assert_eq!(first.net, again.net);
    }
}

#[test]
fn non_positive_premium_is_rejected() {
    let mut bad = input(CommissionType::FirstYear, true);
    bad.premium = 0.0;
    assert!(matches!(calculate(&bad), Err(PayoutError::Validation { .. })));
    bad.premium = -5.0;
    assert!(matches!(calculate(&bad), Err(PayoutError::Validation { .. })));
}

// ─────────────────────────────────────────────────────────────────────────────
// Rate resolution
// ─────────────────────────────────────────────────────────────────────────────

fn rate(rate_id: &str, percent: f64, from: NaiveDate, to: Option<NaiveDate>) -> CommissionRate {
    CommissionRate {
        rate_id: rate_id.to_string(),
        product_type: "TERM_LIFE".to_string(),
        agent_type: "INDIVIDUAL".to_string(),
        plan_code: "TL-10".to_string(),
        policy_term_years: 10,
        rate_percent: percent,
        effective_from: from,
        effective_to: to,
        active: true,
    }
}

fn query(as_of: NaiveDate) -> RateQuery {
    RateQuery {
        product_type: "TERM_LIFE".to_string(),
        agent_type: "INDIVIDUAL".to_string(),
        plan_code: "TL-10".to_string(),
        policy_term_years: 10,
        as_of,
    }
}

#[test]
fn window_is_effective_from_inclusive_effective_to_exclusive() {
    let rates = [rate("r1", 25.0, date(2024, 1, 1), Some(date(2025, 1, 1)))];
    assert!(resolve(&rates, &query(date(2024, 1, 1))).is_ok());
    assert!(resolve(&rates, &query(date(2024, 12, 31))).is_ok());
    assert!(resolve(&rates, &query(date(2025, 1, 1))).is_err());
    assert!(resolve(&rates, &query(date(2023, 12, 31))).is_err());
}

#[test]
fn most_recently_effective_wins_on_overlap() {
    let rates = [
        rate("old", 20.0, date(2023, 1, 1), None),
        rate("new", 25.0, date(2024, 6, 1), None),
    ];
    let resolved = resolve(&rates, &query(date(2024, 7, 1))).expect("resolve failed");
    assert_eq!(resolved.rate_id, "new");

    // Before the newer rate takes effect, the older row still applies.
    let earlier = resolve(&rates, &query(date(2024, 1, 1))).expect("resolve failed");
    assert_eq!(earlier.rate_id, "old");
}

#[test]
fn inactive_rates_never_match() {
    let mut inactive = rate("r1", 25.0, date(2024, 1, 1), None);
    inactive.active = false;
    let inactive_rates = [inactive];
    let result = resolve(&inactive_rates, &query(date(2024, 6, 1)));
    assert!(matches!(result, Err(PayoutError::RateNotFound { .. })));
}

#[test]
fn mismatched_key_fields_do_not_match() {
    let rates = [rate("r1", 25.0, date(2024, 1, 1), None)];
    let mut wrong_term = query(date(2024, 6, 1));
    wrong_term.policy_term_years = 20;
    assert!(resolve(&rates, &wrong_term).is_err());

    let mut wrong_plan = query(date(2024, 6, 1));
    wrong_plan.plan_code = "TL-99".to_string();
    assert!(resolve(&rates, &wrong_plan).is_err());
}

#[test]
fn miss_reports_the_full_lookup_key() {
    let result = resolve(&[], &query(date(2024, 6, 1)));
    match result {
        Err(PayoutError::RateNotFound {
            product_type,
            plan_code,
            policy_term_years,
            ..
        }) => {
            assert_eq!(product_type, "TERM_LIFE");
            assert_eq!(plan_code, "TL-10");
            assert_eq!(policy_term_years, 10);
        }
        other => panic!("expected RateNotFound, got {other:?}"),
    }
}
