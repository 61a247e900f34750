//! payout-runner: headless lifecycle driver for the payout core.
//!
//! Stands in for the durable-task executor in local runs: seeds the rate
//! master, generates a seeded demo policy book, and drives a full monthly
//! cycle — batch, calculation, trial statements, approval, finalization,
//! disbursement and webhook confirmation — then prints the suspense aging
//! report.
//!
//! Usage:
//!   payout-runner --seed 42 --policies 200 --month 1 --year 2025 --db run.db
//!   payout-runner --rates data/rate_table.json

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use payout_core::{
    activity::{
        ConfirmPaymentInput, CreateBatchInput, CreateClawbackInput, CreateDisbursementInput,
        CreateFinalStatementInput, DisbursementTransitionInput, GenerateTrialStatementsInput,
        PolicyCommissionInput, RecordRecoveryInput, ReviewStatementInput,
        ScheduleRecoveryPlanInput,
    },
    calculator::CommissionType,
    clawback::ClawbackTrigger,
    config::RateTable,
    disbursement::PaymentInstrument,
    engine::CommissionOutcome,
    payment_rail, PayoutEngine,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::env;

const WEBHOOK_SECRET: &[u8] = b"demo-webhook-secret";

struct DemoPolicy {
    policy_no: String,
    agent_id: String,
    product_type: String,
    agent_type: String,
    plan_code: String,
    policy_term_years: u32,
    premium: f64,
    pan_verified: bool,
}

fn generate_policies(rng: &mut Pcg64, count: usize) -> Vec<DemoPolicy> {
    // (product, plan, term) combinations; the last one has no rate row and
    // exercises the suspense routing path.
    let plans = [
        ("TERM_LIFE", "TL-10", 10u32),
        ("TERM_LIFE", "TL-20", 20),
        ("ENDOWMENT", "EN-15", 15),
        ("ULIP", "UL-10", 10),
        ("ANNUITY", "AN-99", 25),
    ];
    (0..count)
        .map(|i| {
            let pick = if rng.gen_range(0.0..1.0) < 0.05 { 4 } else { rng.gen_range(0..4) };
            let (product, plan, term) = plans[pick];
            DemoPolicy {
                policy_no: format!("POL-{:06}", i + 1),
                agent_id: format!("AGT-{:03}", rng.gen_range(1..=8)),
                product_type: product.to_string(),
                agent_type: if rng.gen_range(0.0..1.0) < 0.8 {
                    "INDIVIDUAL".to_string()
                } else {
                    "CORPORATE".to_string()
                },
                plan_code: plan.to_string(),
                policy_term_years: term,
                premium: rng.gen_range(50..=2_000) as f64 * 50.0,
                pan_verified: rng.gen_range(0.0..1.0) < 0.85,
            }
        })
        .collect()
}

fn parse_arg<T: std::str::FromStr>(args: &[String], name: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == name)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let policies = parse_arg(&args, "--policies", 100usize);
    let month = parse_arg(&args, "--month", 1u32);
    let year = parse_arg(&args, "--year", 2025i32);
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let rates_path = args.windows(2).find(|w| w[0] == "--rates").map(|w| w[1].clone());

    let engine = PayoutEngine::open(db)?;
    let table = match rates_path {
        Some(path) => RateTable::load(&path)?,
        None => RateTable::default_test(),
    };
    engine.seed_rates(&table)?;

    let mut rng = Pcg64::seed_from_u64(seed);
    let book = generate_policies(&mut rng, policies);
    let now = Utc::now().naive_utc();
    let as_of = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(now.date());
    // Unique per invocation so re-runs against a file database behave like
    // fresh workflows rather than replays of the previous run.
    let workflow_id = format!("run-{seed}-{month}-{year}-{}", now.and_utc().timestamp());

    // 1. Batch
    let batch = engine.create_batch(&CreateBatchInput {
        month,
        year,
        total_policies: book.len() as i64,
        workflow_id: workflow_id.clone(),
        now,
    })?;
    println!(
        "batch {} for {}/{} — {} policies, SLA {}",
        batch.batch_id, month, year, batch.total_policies, batch.sla_deadline
    );

    // 2. Calculate
    let mut calculated = 0usize;
    let mut suspended = 0usize;
    for policy in &book {
        let outcome = engine.calculate_commission(&PolicyCommissionInput {
            batch_id: batch.batch_id.clone(),
            policy_no: policy.policy_no.clone(),
            agent_id: policy.agent_id.clone(),
            product_type: policy.product_type.clone(),
            agent_type: policy.agent_type.clone(),
            plan_code: policy.plan_code.clone(),
            policy_term_years: policy.policy_term_years,
            premium: policy.premium,
            commission_type: CommissionType::FirstYear,
            pan_verified: policy.pan_verified,
            as_of,
            workflow_id: workflow_id.clone(),
            now,
        })?;
        match outcome {
            CommissionOutcome::Calculated(_) => calculated += 1,
            CommissionOutcome::RoutedToSuspense { .. } => suspended += 1,
        }
    }
    println!("calculated {calculated} commissions, {suspended} routed to suspense");

    // 3. Trial statements + approval
    let trials = engine.generate_trial_statements(&GenerateTrialStatementsInput {
        batch_id: batch.batch_id.clone(),
        now,
    })?;
    println!("{} trial statements generated", trials.len());

    for trial in &trials {
        let approved = engine.approve_statement(&ReviewStatementInput {
            statement_id: trial.statement_id.clone(),
            reviewed_by: "ops.runner".to_string(),
            remarks: None,
            now,
        })?;

        // 4. Final statement → disbursement → bank confirmation
        let final_statement = engine.create_final_statement(&CreateFinalStatementInput {
            trial_statement_id: approved.statement_id.clone(),
            partial_amount: None,
            now,
        })?;
        engine.mark_ready_for_disbursement(&final_statement.final_statement_id)?;
        let disbursement = engine.create_disbursement(&CreateDisbursementInput {
            final_statement_id: final_statement.final_statement_id.clone(),
            instrument: PaymentInstrument::Eft {
                account_no: format!("9100{:08}", rng.gen_range(0..100_000_000u64)),
                ifsc_code: "HDFC0001234".to_string(),
                account_holder: approved.agent_id.clone(),
            },
            now,
        })?;
        let disbursement = engine.begin_processing(&DisbursementTransitionInput {
            disbursement_id: disbursement.disbursement_id.clone(),
            version: disbursement.version,
            now,
        })?;
        let disbursement = engine.mark_sent_to_bank(&DisbursementTransitionInput {
            disbursement_id: disbursement.disbursement_id.clone(),
            version: disbursement.version,
            now,
        })?;

        // Forge the bank's confirmation webhook, signature and all.
        let payload = serde_json::json!({
            "disbursement_id": disbursement.disbursement_id,
            "utr_number": format!("UTR{:012}", rng.gen_range(0..1_000_000_000u64)),
            "status": "SUCCESS",
            "failure_code": null,
        });
        let raw = serde_json::to_vec(&payload)?;
        let signature = payment_rail::sign_payload(WEBHOOK_SECRET, &raw)?;
        let confirmation = payment_rail::parse_payment_confirmation(WEBHOOK_SECRET, &raw, &signature)?;
        engine.confirm_payment(&ConfirmPaymentInput {
            disbursement_id: confirmation.disbursement_id.clone(),
            utr_number: confirmation.utr_number.clone(),
            success: true,
            failure_code: None,
            now,
        })?;
        log::info!(
            "agent {} paid {:.2} via {}",
            approved.agent_id,
            disbursement.amount,
            disbursement.instrument.mode_str()
        );
    }
    let batch = engine.complete_batch(&batch.batch_id, now)?;
    println!("batch {} completed ({:.1}% processed)", batch.batch_id, batch.progress_percent());

    // 5. Claw one policy back on an installment plan.
    if let Some(policy) = book.iter().find(|p| p.plan_code != "AN-99") {
        let inception = NaiveDate::from_ymd_opt(year - 1, month, 1).unwrap_or(as_of);
        let clawback = engine.create_clawback(&CreateClawbackInput {
            policy_no: policy.policy_no.clone(),
            agent_id: policy.agent_id.clone(),
            trigger: ClawbackTrigger::Surrendered,
            policy_inception_date: inception,
            now,
        })?;
        println!(
            "clawback {} on {}: {}% of {:.2} = {:.2}",
            clawback.clawback_id,
            clawback.policy_no,
            clawback.clawback_percentage,
            clawback.original_commission,
            clawback.clawback_amount
        );
        let plan = engine.schedule_recovery_plan(&ScheduleRecoveryPlanInput {
            clawback_id: clawback.clawback_id.clone(),
            installments: 3,
            first_due: as_of,
        })?;
        for installment in &plan {
            engine.record_recovery(&RecordRecoveryInput {
                clawback_id: clawback.clawback_id.clone(),
                installment_number: installment.installment_number,
                amount: installment.amount,
                now,
            })?;
        }
        let recovered = engine.store.get_clawback(&clawback.clawback_id)?;
        println!(
            "clawback {} now {} (recovered {:.2}, pending {:.2})",
            recovered.clawback_id,
            recovered.status.as_str(),
            recovered.recovered_amount,
            recovered.pending_amount
        );
    }

    // 6. Suspense aging report
    let report = engine.aging_report(now.date())?;
    println!(
        "suspense: {} open entries totalling {:.2}, {} overdue ({:.2})",
        report.open_count, report.open_amount, report.overdue_count, report.overdue_amount
    );
    for line in &report.buckets {
        if line.count > 0 {
            println!("  {:>12}: {:3} entries, {:.2}", line.label, line.count, line.amount);
        }
    }

    Ok(())
}
