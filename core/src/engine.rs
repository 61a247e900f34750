//! The payout engine — every operation the durable-task executor drives.
//!
//! RULES:
//!   - Operations re-read persisted state; they never trust caller snapshots.
//!   - Every operation is idempotent (natural-key probe) or fails closed on
//!     a stale version. The executor may replay any step after a crash.
//!   - `now` always arrives from the caller so replays are deterministic.
//!   - Every state mutation appends to the event log.

use crate::activity::{
    CloseClawbackInput, CloseSuspenseInput, ConfirmPaymentInput, CreateBatchInput,
    CreateClawbackInput, CreateDisbursementInput, CreateFinalStatementInput,
    CreateSuspenseInput, DisbursementTransitionInput, GenerateTrialStatementsInput,
    PolicyCommissionInput, RecordRecoveryInput, ReviewStatementInput, ScheduleRecoveryPlanInput,
};
use crate::batch::{BatchStatus, CommissionBatch, CommissionTransaction};
use crate::calculator::{self, CommissionInput};
use crate::clawback::{
    Clawback, ClawbackRecovery, ClawbackStatus, PolicyStatusChange, RecoveryStatus,
    installment_plan,
};
use crate::config::RateTable;
use crate::disbursement::Disbursement;
use crate::error::{PayoutError, PayoutResult};
use crate::event::PayoutEvent;
use crate::rates::{self, RateQuery};
use crate::statement::{
    FinalStatement, FinalStatementStatus, TrialStatement, TrialStatementStatus, AMOUNT_EPSILON,
};
use crate::store::PayoutStore;
use crate::suspense::{self, AgingReport, SuspenseAccount, SuspenseReason};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub struct PayoutEngine {
    pub store: PayoutStore,
}

/// Result of calculating one policy's commission: either a transaction row
/// or a suspense entry when the policy could not be processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommissionOutcome {
    Calculated(CommissionTransaction),
    RoutedToSuspense {
        suspense_id: String,
        reason: String,
    },
}

impl PayoutEngine {
    pub fn new(store: PayoutStore) -> Self {
        Self { store }
    }

    pub fn open(path: &str) -> PayoutResult<Self> {
        let store = PayoutStore::open(path)?;
        store.migrate()?;
        Ok(Self { store })
    }

    /// In-memory engine with the default rate table. Used in tests.
    pub fn build_test() -> PayoutResult<Self> {
        let store = PayoutStore::in_memory()?;
        store.migrate()?;
        let engine = Self { store };
        engine.seed_rates(&RateTable::default_test())?;
        Ok(engine)
    }

    /// Seed the rate master. Rows already present are left untouched, so
    /// this runs unconditionally at startup.
    pub fn seed_rates(&self, table: &RateTable) -> PayoutResult<usize> {
        let mut seeded = 0;
        for config in &table.rates {
            let rate = config.clone().into_rate(uuid::Uuid::new_v4().to_string());
            if self.store.insert_rate(&rate)? {
                seeded += 1;
            }
        }
        log::info!("rates: seeded {seeded} of {} configured rows", table.rates.len());
        Ok(seeded)
    }

    fn emit(&self, entity_id: &str, event: PayoutEvent, now: NaiveDateTime) -> PayoutResult<()> {
        self.store.append_event(entity_id, &event, now)
    }

    // ── Input validation ───────────────────────────────────────

    /// Synchronous validation of a calculation input. Failures here are
    /// never retried — the record is bad, not the infrastructure.
    pub fn validate_policy_input(&self, input: &PolicyCommissionInput) -> PayoutResult<()> {
        let mandatory = [
            ("policy_no", &input.policy_no),
            ("agent_id", &input.agent_id),
            ("product_type", &input.product_type),
            ("agent_type", &input.agent_type),
            ("plan_code", &input.plan_code),
        ];
        if let Some((field, _)) = mandatory.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(PayoutError::Validation {
                reason: format!("{field} is mandatory"),
            });
        }
        if input.premium <= 0.0 {
            return Err(PayoutError::Validation {
                reason: format!("premium must be positive, got {}", input.premium),
            });
        }
        if input.policy_term_years == 0 {
            return Err(PayoutError::Validation {
                reason: "policy term must be at least 1 year".to_string(),
            });
        }
        Ok(())
    }

    // ── Batch lifecycle ────────────────────────────────────────

    /// Create the monthly batch. A replay under the same workflow id returns
    /// the existing batch; a second workflow for the same open period is a
    /// duplicate-batch error, not a retry target.
    pub fn create_batch(&self, input: &CreateBatchInput) -> PayoutResult<CommissionBatch> {
        if let Some(existing) = self.store.find_open_batch(input.month, input.year)? {
            if existing.workflow_id == input.workflow_id {
                log::info!(
                    "batch={} period={}/{} replay: returning existing",
                    existing.batch_id,
                    input.month,
                    input.year
                );
                return Ok(existing);
            }
            return Err(PayoutError::DuplicateBatch {
                month: input.month,
                year: input.year,
            });
        }

        let batch = CommissionBatch::new(
            input.month,
            input.year,
            input.total_policies,
            input.workflow_id.clone(),
            input.now,
        )?;
        self.store.insert_batch(&batch)?;
        self.emit(
            &batch.batch_id,
            PayoutEvent::BatchCreated {
                batch_id: batch.batch_id.clone(),
                month: batch.month,
                year: batch.year,
                total_policies: batch.total_policies,
            },
            input.now,
        )?;
        log::info!(
            "batch={} period={}/{} created with {} policies, SLA {}",
            batch.batch_id,
            batch.month,
            batch.year,
            batch.total_policies,
            batch.sla_deadline
        );
        Ok(batch)
    }

    fn batch_status_changed(
        &self,
        batch: &CommissionBatch,
        old: BatchStatus,
        now: NaiveDateTime,
    ) -> PayoutResult<()> {
        self.emit(
            &batch.batch_id,
            PayoutEvent::BatchStatusChanged {
                batch_id: batch.batch_id.clone(),
                old_status: old.as_str().to_string(),
                new_status: batch.status.as_str().to_string(),
            },
            now,
        )
    }

    /// Calculate one policy's commission inside a batch. Replays return the
    /// stored transaction; a rate miss routes the policy to suspense instead
    /// of failing the batch.
    pub fn calculate_commission(
        &self,
        input: &PolicyCommissionInput,
    ) -> PayoutResult<CommissionOutcome> {
        self.validate_policy_input(input)?;

        let mut batch = self.store.get_batch(&input.batch_id)?;
        // First calculation moves the batch out of INITIATED.
        if batch.status == BatchStatus::Initiated {
            let old = batch.status;
            batch.begin_calculation()?;
            self.store.update_batch(&batch)?;
            self.batch_status_changed(&batch, old, input.now)?;
        } else if batch.status != BatchStatus::Calculating {
            return Err(PayoutError::InvalidState {
                entity: "batch",
                id: batch.batch_id.clone(),
                current: batch.status.as_str().to_string(),
                action: "calculate commission",
            });
        }

        // Replay probe: one transaction per (batch, policy, commission type).
        if let Some(existing) =
            self.store
                .find_transaction(&input.batch_id, &input.policy_no, input.commission_type)?
        {
            return Ok(CommissionOutcome::Calculated(existing));
        }

        let candidates = self.store.candidate_rates(
            &input.product_type,
            &input.agent_type,
            &input.plan_code,
            input.policy_term_years,
        )?;
        let query = RateQuery {
            product_type: input.product_type.clone(),
            agent_type: input.agent_type.clone(),
            plan_code: input.plan_code.clone(),
            policy_term_years: input.policy_term_years,
            as_of: input.as_of,
        };
        let rate = match rates::resolve(&candidates, &query) {
            Ok(rate) => rate,
            Err(err @ PayoutError::RateNotFound { .. }) => {
                return self.route_to_suspense(&mut batch, input, &err.to_string());
            }
            Err(err) => return Err(err),
        };

        let amounts = calculator::calculate(&CommissionInput {
            premium: input.premium,
            rate_percent: rate.rate_percent,
            commission_type: input.commission_type,
            pan_verified: input.pan_verified,
        })?;

        let txn = CommissionTransaction {
            txn_id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch.batch_id.clone(),
            policy_no: input.policy_no.clone(),
            agent_id: input.agent_id.clone(),
            commission_type: input.commission_type,
            premium: input.premium,
            applied_rate: amounts.applied_rate,
            tds_rate: amounts.tds_rate,
            gross_amount: amounts.gross,
            tds_amount: amounts.tds,
            net_amount: amounts.net,
            trial_statement_id: None,
            final_statement_id: None,
            disbursement_id: None,
            calculated_at: input.now,
        };
        self.store.insert_transaction(&txn)?;

        batch.record_processed(false);
        self.store.update_batch(&batch)?;
        self.emit(
            &batch.batch_id,
            PayoutEvent::CommissionCalculated {
                batch_id: batch.batch_id.clone(),
                txn_id: txn.txn_id.clone(),
                policy_no: txn.policy_no.clone(),
                net_amount: txn.net_amount,
            },
            input.now,
        )?;
        log::debug!(
            "batch={} policy={} net={:.2} ({:.1}% progress)",
            batch.batch_id,
            txn.policy_no,
            txn.net_amount,
            batch.progress_percent()
        );
        Ok(CommissionOutcome::Calculated(txn))
    }

    /// One bad record never blocks the other policies: park it in suspense,
    /// count it as failed, move on.
    fn route_to_suspense(
        &self,
        batch: &mut CommissionBatch,
        input: &PolicyCommissionInput,
        reason_text: &str,
    ) -> PayoutResult<CommissionOutcome> {
        let dedupe_token = format!("{}/{}", input.workflow_id, input.policy_no);
        let replay = self.store.suspense_for_workflow(&dedupe_token)?.is_some();
        let suspense = self.create_suspense(&CreateSuspenseInput {
            policy_no: Some(input.policy_no.clone()),
            agent_id: Some(input.agent_id.clone()),
            // The exact commission is unknown without a rate; park the
            // premium as the held amount until the rate master is fixed.
            amount: input.premium,
            reason: SuspenseReason::RateNotFound,
            description: reason_text.to_string(),
            workflow_id: dedupe_token,
            now: input.now,
        })?;

        // Counters and events fire once; a replayed routing only re-reads.
        if !replay {
            batch.record_processed(true);
            self.store.update_batch(batch)?;
            self.emit(
                &batch.batch_id,
                PayoutEvent::PolicyRoutedToSuspense {
                    batch_id: batch.batch_id.clone(),
                    policy_no: input.policy_no.clone(),
                    suspense_id: suspense.suspense_id.clone(),
                    reason: reason_text.to_string(),
                },
                input.now,
            )?;
            log::warn!(
                "batch={} policy={} routed to suspense: {reason_text}",
                batch.batch_id,
                input.policy_no
            );
        }
        Ok(CommissionOutcome::RoutedToSuspense {
            suspense_id: suspense.suspense_id,
            reason: reason_text.to_string(),
        })
    }

    /// Roll every unassigned transaction into one trial statement per agent.
    /// A replay after the batch already advanced returns the existing
    /// statements.
    pub fn generate_trial_statements(
        &self,
        input: &GenerateTrialStatementsInput,
    ) -> PayoutResult<Vec<TrialStatement>> {
        let mut batch = self.store.get_batch(&input.batch_id)?;
        match batch.status {
            BatchStatus::Calculating => {}
            BatchStatus::TrialGenerated => {
                return self.store.trial_statements_for_batch(&input.batch_id);
            }
            _ => {
                return Err(PayoutError::InvalidState {
                    entity: "batch",
                    id: batch.batch_id.clone(),
                    current: batch.status.as_str().to_string(),
                    action: "generate trial statements",
                });
            }
        }

        let txns = self.store.unassigned_transactions(&input.batch_id)?;
        let mut by_agent: BTreeMap<String, Vec<&CommissionTransaction>> = BTreeMap::new();
        for txn in &txns {
            by_agent.entry(txn.agent_id.clone()).or_default().push(txn);
        }

        for (agent_id, agent_txns) in &by_agent {
            let statement =
                TrialStatement::from_transactions(&batch, agent_id, agent_txns, input.now)?;
            self.store.insert_trial_statement(&statement)?;
            self.store.assign_transactions_to_trial(
                &input.batch_id,
                agent_id,
                &statement.statement_id,
            )?;
            self.emit(
                &statement.statement_id,
                PayoutEvent::TrialStatementGenerated {
                    statement_id: statement.statement_id.clone(),
                    agent_id: agent_id.clone(),
                    policy_count: statement.policy_count,
                    net_amount: statement.net_amount,
                },
                input.now,
            )?;
        }

        let old = batch.status;
        batch.mark_trial_generated()?;
        self.store.update_batch(&batch)?;
        self.batch_status_changed(&batch, old, input.now)?;
        log::info!(
            "batch={} generated {} trial statements over {} transactions",
            batch.batch_id,
            by_agent.len(),
            txns.len()
        );
        self.store.trial_statements_for_batch(&input.batch_id)
    }

    pub fn complete_batch(
        &self,
        batch_id: &str,
        now: NaiveDateTime,
    ) -> PayoutResult<CommissionBatch> {
        let mut batch = self.store.get_batch(batch_id)?;
        if batch.status == BatchStatus::Completed {
            return Ok(batch);
        }
        let old = batch.status;
        batch.complete(now)?;
        self.store.update_batch(&batch)?;
        self.batch_status_changed(&batch, old, now)?;
        Ok(batch)
    }

    /// Mark a batch FAILED after an unrecoverable calculation error. The
    /// executor calls this once its retries are exhausted.
    pub fn fail_batch(&self, batch_id: &str, now: NaiveDateTime) -> PayoutResult<CommissionBatch> {
        let mut batch = self.store.get_batch(batch_id)?;
        if batch.status == BatchStatus::Failed {
            return Ok(batch);
        }
        let old = batch.status;
        batch.fail(now)?;
        self.store.update_batch(&batch)?;
        self.batch_status_changed(&batch, old, now)?;
        log::warn!("batch={batch_id} marked failed");
        Ok(batch)
    }

    pub fn cancel_batch(
        &self,
        batch_id: &str,
        now: NaiveDateTime,
    ) -> PayoutResult<CommissionBatch> {
        let mut batch = self.store.get_batch(batch_id)?;
        let old = batch.status;
        batch.cancel(now)?;
        self.store.update_batch(&batch)?;
        self.batch_status_changed(&batch, old, now)?;
        log::info!("batch={batch_id} cancelled");
        Ok(batch)
    }

    // ── Statement approval ─────────────────────────────────────

    pub fn approve_statement(&self, input: &ReviewStatementInput) -> PayoutResult<TrialStatement> {
        let mut statement = self.store.get_trial_statement(&input.statement_id)?;
        // Replay of an identical approval is acknowledged, not re-applied.
        if statement.status == TrialStatementStatus::Approved
            && statement.reviewed_by.as_deref() == Some(&input.reviewed_by)
        {
            return Ok(statement);
        }
        statement.approve(&input.reviewed_by, input.remarks.clone(), input.now)?;
        self.store.update_trial_statement(&statement)?;
        self.emit(
            &statement.statement_id,
            PayoutEvent::StatementApproved {
                statement_id: statement.statement_id.clone(),
                approved_by: input.reviewed_by.clone(),
            },
            input.now,
        )?;
        log::info!(
            "statement={} approved by {} (net {:.2})",
            statement.statement_id,
            input.reviewed_by,
            statement.net_amount
        );
        Ok(statement)
    }

    pub fn reject_statement(&self, input: &ReviewStatementInput) -> PayoutResult<TrialStatement> {
        let mut statement = self.store.get_trial_statement(&input.statement_id)?;
        if statement.status == TrialStatementStatus::Rejected
            && statement.reviewed_by.as_deref() == Some(&input.reviewed_by)
        {
            return Ok(statement);
        }
        statement.reject(&input.reviewed_by, input.remarks.clone(), input.now)?;
        self.store.update_trial_statement(&statement)?;
        self.emit(
            &statement.statement_id,
            PayoutEvent::StatementRejected {
                statement_id: statement.statement_id.clone(),
                rejected_by: input.reviewed_by.clone(),
            },
            input.now,
        )?;
        Ok(statement)
    }

    pub fn request_correction(&self, input: &ReviewStatementInput) -> PayoutResult<TrialStatement> {
        let mut statement = self.store.get_trial_statement(&input.statement_id)?;
        statement.request_correction(&input.reviewed_by, input.remarks.clone(), input.now)?;
        self.store.update_trial_statement(&statement)?;
        self.emit(
            &statement.statement_id,
            PayoutEvent::StatementCorrectionRequested {
                statement_id: statement.statement_id.clone(),
                requested_by: input.reviewed_by.clone(),
            },
            input.now,
        )?;
        Ok(statement)
    }

    /// Create a final statement from an approved trial statement. The trial
    /// state is re-read and checked here — approval strictly precedes
    /// finalization no matter what the caller believes.
    pub fn create_final_statement(
        &self,
        input: &CreateFinalStatementInput,
    ) -> PayoutResult<FinalStatement> {
        let mut trial = self.store.get_trial_statement(&input.trial_statement_id)?;

        if input.partial_amount.is_none() {
            if let Some(existing) = self.store.full_final_for_trial(&input.trial_statement_id)? {
                return Ok(existing);
            }
            if trial.disbursed_amount > AMOUNT_EPSILON {
                return Err(PayoutError::Validation {
                    reason: format!(
                        "statement {} is partially disbursed: specify the remainder amount",
                        trial.statement_id
                    ),
                });
            }
        }

        let statement = FinalStatement::from_trial(&trial, input.partial_amount, input.now)?;
        trial.draw_down(statement.net_amount)?;
        self.store.insert_final_statement(&statement)?;
        if !statement.partial {
            self.store.assign_transactions_to_final(
                &trial.statement_id,
                &statement.final_statement_id,
            )?;
        }
        self.store.update_trial_statement(&trial)?;
        self.emit(
            &statement.final_statement_id,
            PayoutEvent::FinalStatementCreated {
                final_statement_id: statement.final_statement_id.clone(),
                trial_statement_id: trial.statement_id.clone(),
                net_amount: statement.net_amount,
                partial: statement.partial,
            },
            input.now,
        )?;
        log::info!(
            "final={} from trial={} net={:.2} partial={}",
            statement.final_statement_id,
            trial.statement_id,
            statement.net_amount,
            statement.partial
        );
        Ok(statement)
    }

    pub fn mark_ready_for_disbursement(
        &self,
        final_statement_id: &str,
    ) -> PayoutResult<FinalStatement> {
        let mut statement = self.store.get_final_statement(final_statement_id)?;
        if statement.status == FinalStatementStatus::ReadyForDisbursement {
            return Ok(statement);
        }
        statement.mark_ready()?;
        self.store.update_final_statement(&statement)?;
        self.emit(
            final_statement_id,
            PayoutEvent::FinalStatementReady {
                final_statement_id: statement.final_statement_id.clone(),
            },
            statement.created_at,
        )?;
        Ok(statement)
    }

    // ── Disbursement ───────────────────────────────────────────

    /// One disbursement per final statement: a replay returns the existing
    /// row. The final statement must be READY_FOR_DISBURSEMENT — checked
    /// against the store, not assumed.
    pub fn create_disbursement(
        &self,
        input: &CreateDisbursementInput,
    ) -> PayoutResult<Disbursement> {
        let statement = self.store.get_final_statement(&input.final_statement_id)?;
        if let Some(existing) = self.store.disbursement_for_final(&input.final_statement_id)? {
            return Ok(existing);
        }
        if statement.status != FinalStatementStatus::ReadyForDisbursement {
            return Err(PayoutError::InvalidState {
                entity: "final statement",
                id: statement.final_statement_id.clone(),
                current: statement.status.as_str().to_string(),
                action: "create disbursement",
            });
        }

        let disbursement = Disbursement::new(&statement, input.instrument.clone(), input.now)?;
        self.store.insert_disbursement(&disbursement)?;
        self.store.link_disbursement_to_transactions(
            &statement.final_statement_id,
            &disbursement.disbursement_id,
        )?;
        self.emit(
            &disbursement.disbursement_id,
            PayoutEvent::DisbursementCreated {
                disbursement_id: disbursement.disbursement_id.clone(),
                final_statement_id: statement.final_statement_id.clone(),
                mode: disbursement.instrument.mode_str().to_string(),
                amount: disbursement.amount,
            },
            input.now,
        )?;
        log::info!(
            "disbursement={} mode={} amount={:.2} SLA {}",
            disbursement.disbursement_id,
            disbursement.instrument.mode_str(),
            disbursement.amount,
            disbursement.sla_deadline
        );
        Ok(disbursement)
    }

    fn disbursement_status_changed(
        &self,
        d: &Disbursement,
        old_status: &str,
        now: NaiveDateTime,
    ) -> PayoutResult<()> {
        self.emit(
            &d.disbursement_id,
            PayoutEvent::DisbursementStatusChanged {
                disbursement_id: d.disbursement_id.clone(),
                old_status: old_status.to_string(),
                new_status: d.status.as_str().to_string(),
            },
            now,
        )
    }

    /// Every caller-driven mutation requires the caller's last-seen version
    /// to match the current row. A writer that lost the race gets
    /// `OptimisticLock` and must re-read before deciding again.
    fn check_version(d: &Disbursement, caller_version: i64) -> PayoutResult<()> {
        if d.version != caller_version {
            return Err(PayoutError::OptimisticLock {
                id: d.disbursement_id.clone(),
                expected: caller_version,
                actual: d.version,
            });
        }
        Ok(())
    }

    /// Apply a mutation under the caller's last-seen version. A concurrent
    /// writer that committed first leaves this caller with an
    /// `OptimisticLock` error and a forced re-read.
    fn update_versioned(
        &self,
        mut d: Disbursement,
        caller_version: i64,
        old_status: &str,
        now: NaiveDateTime,
    ) -> PayoutResult<Disbursement> {
        let new_version = self.store.update_disbursement(&d, caller_version)?;
        d.version = new_version;
        self.disbursement_status_changed(&d, old_status, now)?;
        Ok(d)
    }

    pub fn begin_processing(
        &self,
        input: &DisbursementTransitionInput,
    ) -> PayoutResult<Disbursement> {
        let mut d = self.store.get_disbursement(&input.disbursement_id)?;
        Self::check_version(&d, input.version)?;
        let old = d.status.as_str();
        d.begin_processing()?;
        self.update_versioned(d, input.version, old, input.now)
    }

    pub fn mark_sent_to_bank(
        &self,
        input: &DisbursementTransitionInput,
    ) -> PayoutResult<Disbursement> {
        let mut d = self.store.get_disbursement(&input.disbursement_id)?;
        Self::check_version(&d, input.version)?;
        let old = d.status.as_str();
        d.mark_sent_to_bank()?;
        self.update_versioned(d, input.version, old, input.now)
    }

    /// Bank confirmation, normally via webhook. Duplicate deliveries of the
    /// same outcome are acknowledged; conflicting concurrent deliveries are
    /// serialized by the version check — exactly one wins.
    pub fn confirm_payment(&self, input: &ConfirmPaymentInput) -> PayoutResult<Disbursement> {
        let mut d = self.store.get_disbursement(&input.disbursement_id)?;
        use crate::disbursement::DisbursementStatus::*;
        if d.status == Completed && input.success {
            // Duplicate delivery. A crash may have landed between completing
            // the disbursement and flipping the statement; repair that here.
            let mut statement = self.store.get_final_statement(&d.final_statement_id)?;
            if statement.status == FinalStatementStatus::ReadyForDisbursement {
                statement.mark_disbursed(input.now)?;
                self.store.update_final_statement(&statement)?;
            }
            return Ok(d);
        }
        if d.status == Failed && !input.success {
            return Ok(d);
        }

        let caller_version = d.version;
        let old = d.status.as_str();
        if input.success {
            // The bank can confirm before our own SENT_TO_BANK write lands.
            if d.instrument.is_eft() && d.status == Processing {
                d.mark_sent_to_bank()?;
            }
            d.complete(input.utr_number.clone(), input.now)?;
        } else {
            d.fail(input.failure_code.as_deref().unwrap_or("UNKNOWN"))?;
        }
        let d = self.update_versioned(d, caller_version, old, input.now)?;

        if input.success {
            self.emit(
                &d.disbursement_id,
                PayoutEvent::PaymentConfirmed {
                    disbursement_id: d.disbursement_id.clone(),
                    utr_number: d.utr_number.clone(),
                },
                input.now,
            )?;
            // The final statement reaches DISBURSED only through this path.
            let mut statement = self.store.get_final_statement(&d.final_statement_id)?;
            if statement.status != FinalStatementStatus::Disbursed {
                statement.mark_disbursed(input.now)?;
                self.store.update_final_statement(&statement)?;
            }
            log::info!(
                "disbursement={} completed, utr={:?}",
                d.disbursement_id,
                d.utr_number
            );
        } else {
            log::warn!(
                "disbursement={} failed: {:?} (retry {}/{})",
                d.disbursement_id,
                d.failure_code,
                d.retry_count,
                crate::disbursement::MAX_RETRIES
            );
        }
        Ok(d)
    }

    /// Re-queue a FAILED disbursement with a fresh idempotency key toward
    /// the rail. Capped at three retries; after that the amount belongs in
    /// suspense.
    pub fn retry_disbursement(
        &self,
        input: &DisbursementTransitionInput,
    ) -> PayoutResult<Disbursement> {
        let mut d = self.store.get_disbursement(&input.disbursement_id)?;
        Self::check_version(&d, input.version)?;
        let old = d.status.as_str();
        d.retry()?;
        let d = self.update_versioned(d, input.version, old, input.now)?;
        self.emit(
            &d.disbursement_id,
            PayoutEvent::DisbursementRetried {
                disbursement_id: d.disbursement_id.clone(),
                retry_count: d.retry_count,
                idempotency_key: d.idempotency_key.clone(),
            },
            input.now,
        )?;
        Ok(d)
    }

    pub fn cancel_disbursement(
        &self,
        input: &DisbursementTransitionInput,
    ) -> PayoutResult<Disbursement> {
        let mut d = self.store.get_disbursement(&input.disbursement_id)?;
        Self::check_version(&d, input.version)?;
        let old = d.status.as_str();
        d.cancel()?;
        self.update_versioned(d, input.version, old, input.now)
    }

    // ── Clawback ───────────────────────────────────────────────

    /// Start recovery for a lapsed/surrendered/cancelled policy. The base is
    /// the net commission ever calculated for the policy; a replay returns
    /// the open clawback.
    pub fn create_clawback(&self, input: &CreateClawbackInput) -> PayoutResult<Clawback> {
        if let Some(existing) = self.store.open_clawback_for_policy(&input.policy_no)? {
            return Ok(existing);
        }
        let original_commission = self.store.total_net_for_policy(&input.policy_no)?;
        let clawback = Clawback::new(
            &input.policy_no,
            &input.agent_id,
            input.trigger,
            input.policy_inception_date,
            original_commission,
            input.now,
        )?;
        self.store.insert_clawback(&clawback)?;
        self.emit(
            &clawback.clawback_id,
            PayoutEvent::ClawbackCreated {
                clawback_id: clawback.clawback_id.clone(),
                policy_no: clawback.policy_no.clone(),
                percentage: clawback.clawback_percentage,
                amount: clawback.clawback_amount,
            },
            input.now,
        )?;
        log::info!(
            "clawback={} policy={} age={}mo rate={}% amount={:.2}",
            clawback.clawback_id,
            clawback.policy_no,
            clawback.policy_age_months,
            clawback.clawback_percentage,
            clawback.clawback_amount
        );
        Ok(clawback)
    }

    /// Map a policy-service webhook onto clawback creation. Transitions to
    /// statuses outside the trigger set are not clawback events.
    pub fn create_clawback_from_webhook(
        &self,
        change: &PolicyStatusChange,
        agent_id: &str,
        policy_inception_date: NaiveDate,
        now: NaiveDateTime,
    ) -> PayoutResult<Clawback> {
        let trigger = change.clawback_trigger().ok_or_else(|| PayoutError::Validation {
            reason: format!(
                "policy status '{}' does not trigger clawback",
                change.new_status
            ),
        })?;
        self.create_clawback(&CreateClawbackInput {
            policy_no: change.policy_number.clone(),
            agent_id: agent_id.to_string(),
            trigger,
            policy_inception_date,
            now,
        })
    }

    /// Split the pending balance into scheduled installments. Replays leave
    /// already-scheduled rows untouched.
    pub fn schedule_recovery_plan(
        &self,
        input: &ScheduleRecoveryPlanInput,
    ) -> PayoutResult<Vec<ClawbackRecovery>> {
        let clawback = self.store.get_clawback(&input.clawback_id)?;
        let plan = installment_plan(&clawback, input.installments, input.first_due)?;
        self.store.insert_recovery_plan(&plan)?;
        self.store.recoveries_for(&input.clawback_id)
    }

    /// Record one collected installment. Idempotent on
    /// (clawback_id, installment_number): a replayed collection changes
    /// nothing and returns the current clawback.
    pub fn record_recovery(&self, input: &RecordRecoveryInput) -> PayoutResult<Clawback> {
        let mut clawback = self.store.get_clawback(&input.clawback_id)?;

        let scheduled = self
            .store
            .find_recovery(&input.clawback_id, input.installment_number)?;
        if let Some(existing) = &scheduled {
            if existing.status == RecoveryStatus::Collected {
                log::debug!(
                    "clawback={} installment={} replay: already collected",
                    input.clawback_id,
                    input.installment_number
                );
                return Ok(clawback);
            }
        }

        clawback.record_recovery(input.amount, input.now)?;
        let recovery = ClawbackRecovery {
            clawback_id: input.clawback_id.clone(),
            installment_number: input.installment_number,
            amount: input.amount,
            status: RecoveryStatus::Collected,
            due_date: scheduled
                .map(|r| r.due_date)
                .unwrap_or_else(|| input.now.date()),
            collected_at: Some(input.now),
            next_retry_date: None,
        };
        self.store.apply_recovery(&clawback, &recovery)?;
        self.emit(
            &clawback.clawback_id,
            PayoutEvent::RecoveryRecorded {
                clawback_id: clawback.clawback_id.clone(),
                installment_number: input.installment_number,
                amount: input.amount,
                pending_after: clawback.pending_amount,
            },
            input.now,
        )?;
        if clawback.status == ClawbackStatus::Completed {
            self.emit(
                &clawback.clawback_id,
                PayoutEvent::ClawbackClosed {
                    clawback_id: clawback.clawback_id.clone(),
                    outcome: clawback.status.as_str().to_string(),
                },
                input.now,
            )?;
            log::info!("clawback={} fully recovered", clawback.clawback_id);
        }
        Ok(clawback)
    }

    /// A failed collection attempt: the ledger row keeps its amount but is
    /// flagged with the date the executor should try again.
    pub fn mark_recovery_failed(
        &self,
        clawback_id: &str,
        installment_number: u32,
        next_retry_date: NaiveDate,
    ) -> PayoutResult<()> {
        self.store
            .mark_recovery_failed(clawback_id, installment_number, next_retry_date)
    }

    fn close_clawback(
        &self,
        input: &CloseClawbackInput,
        close: fn(&mut Clawback, &str, NaiveDateTime) -> PayoutResult<()>,
    ) -> PayoutResult<Clawback> {
        let mut clawback = self.store.get_clawback(&input.clawback_id)?;
        close(&mut clawback, &input.remarks, input.now)?;
        self.store.update_clawback(&clawback)?;
        self.emit(
            &clawback.clawback_id,
            PayoutEvent::ClawbackClosed {
                clawback_id: clawback.clawback_id.clone(),
                outcome: clawback.status.as_str().to_string(),
            },
            input.now,
        )?;
        log::info!(
            "clawback={} closed as {}",
            clawback.clawback_id,
            clawback.status.as_str()
        );
        Ok(clawback)
    }

    pub fn waive_clawback(&self, input: &CloseClawbackInput) -> PayoutResult<Clawback> {
        self.close_clawback(input, Clawback::waive)
    }

    pub fn write_off_clawback(&self, input: &CloseClawbackInput) -> PayoutResult<Clawback> {
        self.close_clawback(input, Clawback::write_off)
    }

    pub fn close_clawback_partial(&self, input: &CloseClawbackInput) -> PayoutResult<Clawback> {
        self.close_clawback(input, Clawback::close_partial)
    }

    // ── Suspense ───────────────────────────────────────────────

    /// Park an amount that could not be paid out. Creation has no natural
    /// business key, so the driving workflow id is the de-duplication token.
    pub fn create_suspense(&self, input: &CreateSuspenseInput) -> PayoutResult<SuspenseAccount> {
        if let Some(existing) = self.store.suspense_for_workflow(&input.workflow_id)? {
            return Ok(existing);
        }
        let suspense = SuspenseAccount::new(
            input.policy_no.clone(),
            input.agent_id.clone(),
            input.amount,
            input.reason,
            &input.description,
            input.workflow_id.clone(),
            input.now,
        )?;
        self.store.insert_suspense(&suspense)?;
        self.emit(
            &suspense.suspense_id,
            PayoutEvent::SuspenseCreated {
                suspense_id: suspense.suspense_id.clone(),
                amount: suspense.amount,
                priority: suspense.priority.as_str().to_string(),
                reason: suspense.reason.as_str().to_string(),
            },
            input.now,
        )?;
        log::info!(
            "suspense={} amount={:.2} priority={} deadline={}",
            suspense.suspense_id,
            suspense.amount,
            suspense.priority.as_str(),
            suspense.resolution_deadline
        );
        Ok(suspense)
    }

    fn close_suspense(
        &self,
        input: &CloseSuspenseInput,
        close: fn(&mut SuspenseAccount, &str, NaiveDateTime) -> PayoutResult<()>,
    ) -> PayoutResult<SuspenseAccount> {
        let mut suspense = self.store.get_suspense(&input.suspense_id)?;
        close(&mut suspense, &input.remarks, input.now)?;
        self.store.update_suspense(&suspense)?;
        self.emit(
            &suspense.suspense_id,
            PayoutEvent::SuspenseResolved {
                suspense_id: suspense.suspense_id.clone(),
                resolution: suspense.status.as_str().to_string(),
            },
            input.now,
        )?;
        Ok(suspense)
    }

    pub fn resolve_suspense(&self, input: &CloseSuspenseInput) -> PayoutResult<SuspenseAccount> {
        self.close_suspense(input, SuspenseAccount::resolve)
    }

    pub fn write_off_suspense(&self, input: &CloseSuspenseInput) -> PayoutResult<SuspenseAccount> {
        self.close_suspense(input, SuspenseAccount::write_off)
    }

    /// Aging report over all OPEN suspense entries.
    pub fn aging_report(&self, as_of: NaiveDate) -> PayoutResult<AgingReport> {
        let entries = self.store.open_suspense_entries()?;
        Ok(suspense::aging_report(&entries, as_of))
    }
}
