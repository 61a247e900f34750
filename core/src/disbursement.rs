//! Disbursement state machine.
//!
//! PENDING → PROCESSING → SENT_TO_BANK → COMPLETED | FAILED, with CHEQUE
//! payments skipping the bank leg. Every status mutation is guarded by an
//! optimistic version check at the store layer, because the bank delivers
//! confirmation webhooks at-least-once and sometimes concurrently.

use crate::error::{PayoutError, PayoutResult};
use crate::statement::FinalStatement;
use crate::types::EntityId;
use crate::workday;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A FAILED disbursement may be retried at most this many times.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisbursementStatus {
    Pending,
    Processing,
    SentToBank,
    Completed,
    Failed,
    Cancelled,
}

impl DisbursementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisbursementStatus::Pending => "PENDING",
            DisbursementStatus::Processing => "PROCESSING",
            DisbursementStatus::SentToBank => "SENT_TO_BANK",
            DisbursementStatus::Completed => "COMPLETED",
            DisbursementStatus::Failed => "FAILED",
            DisbursementStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> PayoutResult<Self> {
        match s {
            "PENDING" => Ok(DisbursementStatus::Pending),
            "PROCESSING" => Ok(DisbursementStatus::Processing),
            "SENT_TO_BANK" => Ok(DisbursementStatus::SentToBank),
            "COMPLETED" => Ok(DisbursementStatus::Completed),
            "FAILED" => Ok(DisbursementStatus::Failed),
            "CANCELLED" => Ok(DisbursementStatus::Cancelled),
            other => Err(PayoutError::Validation {
                reason: format!("unknown disbursement status '{other}'"),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DisbursementStatus::Completed
                | DisbursementStatus::Cancelled
        )
    }
}

/// Payment mode with its mandatory details. The mode is immutable once the
/// disbursement is created; an EFT row can never be missing account fields
/// and a cheque row can never be missing the cheque number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentInstrument {
    Cheque {
        cheque_no: String,
        payee_name: String,
        payable_at_branch: String,
    },
    Eft {
        account_no: String,
        ifsc_code: String,
        account_holder: String,
    },
}

impl PaymentInstrument {
    pub fn mode_str(&self) -> &'static str {
        match self {
            PaymentInstrument::Cheque { .. } => "CHEQUE",
            PaymentInstrument::Eft { .. } => "EFT",
        }
    }

    pub fn is_eft(&self) -> bool {
        matches!(self, PaymentInstrument::Eft { .. })
    }

    pub fn validate(&self) -> PayoutResult<()> {
        let missing = match self {
            PaymentInstrument::Cheque {
                cheque_no,
                payee_name,
                payable_at_branch,
            } => [
                ("cheque_no", cheque_no),
                ("payee_name", payee_name),
                ("payable_at_branch", payable_at_branch),
            ]
            .iter()
            .find(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| *k),
            PaymentInstrument::Eft {
                account_no,
                ifsc_code,
                account_holder,
            } => [
                ("account_no", account_no),
                ("ifsc_code", ifsc_code),
                ("account_holder", account_holder),
            ]
            .iter()
            .find(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| *k),
        };
        match missing {
            Some(field) => Err(PayoutError::Validation {
                reason: format!("{} payment requires {field}", self.mode_str()),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disbursement {
    pub disbursement_id: EntityId,
    pub final_statement_id: EntityId,
    pub agent_id: EntityId,
    pub amount: f64,
    pub instrument: PaymentInstrument,
    pub status: DisbursementStatus,
    /// Key sent to the payment rail. Regenerated on every retry so the rail
    /// never deduplicates a deliberate re-attempt.
    pub idempotency_key: String,
    pub utr_number: Option<String>,
    pub failure_code: Option<String>,
    pub retry_count: u32,
    /// Optimistic concurrency token; incremented by the store on every write.
    pub version: i64,
    pub initiated_at: NaiveDateTime,
    pub sla_deadline: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

impl Disbursement {
    pub fn new(
        final_statement: &FinalStatement,
        instrument: PaymentInstrument,
        now: NaiveDateTime,
    ) -> PayoutResult<Self> {
        instrument.validate()?;
        if final_statement.net_amount <= 0.0 {
            return Err(PayoutError::Validation {
                reason: format!(
                    "final statement {} has non-positive net amount",
                    final_statement.final_statement_id
                ),
            });
        }
        Ok(Self {
            disbursement_id: uuid::Uuid::new_v4().to_string(),
            final_statement_id: final_statement.final_statement_id.clone(),
            agent_id: final_statement.agent_id.clone(),
            amount: final_statement.net_amount,
            instrument,
            status: DisbursementStatus::Pending,
            idempotency_key: uuid::Uuid::new_v4().to_string(),
            utr_number: None,
            failure_code: None,
            retry_count: 0,
            version: 1,
            initiated_at: now,
            sla_deadline: workday::disbursement_sla_deadline(now),
            completed_at: None,
        })
    }

    fn invalid(&self, action: &'static str) -> PayoutError {
        PayoutError::InvalidState {
            entity: "disbursement",
            id: self.disbursement_id.clone(),
            current: self.status.as_str().to_string(),
            action,
        }
    }

    pub fn begin_processing(&mut self) -> PayoutResult<()> {
        if self.status != DisbursementStatus::Pending {
            return Err(self.invalid("begin processing"));
        }
        self.status = DisbursementStatus::Processing;
        Ok(())
    }

    /// EFT only: the payment file has been handed to the bank.
    pub fn mark_sent_to_bank(&mut self) -> PayoutResult<()> {
        if !self.instrument.is_eft() {
            return Err(PayoutError::Validation {
                reason: format!(
                    "disbursement {} is CHEQUE mode: there is no bank leg",
                    self.disbursement_id
                ),
            });
        }
        if self.status != DisbursementStatus::Processing {
            return Err(self.invalid("mark sent to bank"));
        }
        self.status = DisbursementStatus::SentToBank;
        Ok(())
    }

    /// Bank confirmed (EFT) or cheque was issued and cleared.
    pub fn complete(&mut self, utr_number: Option<String>, now: NaiveDateTime) -> PayoutResult<()> {
        let from_ok = match self.instrument {
            PaymentInstrument::Eft { .. } => self.status == DisbursementStatus::SentToBank,
            PaymentInstrument::Cheque { .. } => self.status == DisbursementStatus::Processing,
        };
        if !from_ok {
            return Err(self.invalid("complete"));
        }
        self.status = DisbursementStatus::Completed;
        self.utr_number = utr_number;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, failure_code: &str) -> PayoutResult<()> {
        if !matches!(
            self.status,
            DisbursementStatus::Processing | DisbursementStatus::SentToBank
        ) {
            return Err(self.invalid("fail"));
        }
        self.status = DisbursementStatus::Failed;
        self.failure_code = Some(failure_code.to_string());
        Ok(())
    }

    /// A payment already handed to the bank cannot be cancelled — it has to
    /// be reconciled through the confirmation webhook instead.
    pub fn cancel(&mut self) -> PayoutResult<()> {
        if !matches!(
            self.status,
            DisbursementStatus::Pending
                | DisbursementStatus::Processing
                | DisbursementStatus::Failed
        ) {
            return Err(self.invalid("cancel"));
        }
        self.status = DisbursementStatus::Cancelled;
        Ok(())
    }

    pub fn can_retry(&self) -> bool {
        self.status == DisbursementStatus::Failed && self.retry_count < MAX_RETRIES
    }

    /// Move a FAILED disbursement back to PENDING with a fresh idempotency
    /// key. The disbursement id never changes across retries.
    pub fn retry(&mut self) -> PayoutResult<()> {
        if !self.can_retry() {
            return Err(self.invalid("retry"));
        }
        self.retry_count += 1;
        self.idempotency_key = uuid::Uuid::new_v4().to_string();
        self.failure_code = None;
        self.status = DisbursementStatus::Pending;
        Ok(())
    }

    pub fn is_sla_breached(&self, now: NaiveDateTime) -> bool {
        self.status != DisbursementStatus::Completed && now > self.sla_deadline
    }
}
