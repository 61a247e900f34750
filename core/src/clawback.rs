//! Clawback recovery engine.
//!
//! When a policy surrenders, lapses or is cancelled, previously paid
//! commission is recovered on a graduated schedule: the younger the policy,
//! the larger the share clawed back. Recovery runs as installments against a
//! running balance; the `recovered + pending == clawback_amount` invariant
//! holds after every write.

use crate::error::{PayoutError, PayoutResult};
use crate::types::EntityId;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One paisa. A pending balance at or below this is fully recovered.
pub const AMOUNT_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClawbackStatus {
    Pending,
    InProgress,
    Completed,
    Partial,
    Waived,
    WriteOff,
}

impl ClawbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClawbackStatus::Pending => "PENDING",
            ClawbackStatus::InProgress => "IN_PROGRESS",
            ClawbackStatus::Completed => "COMPLETED",
            ClawbackStatus::Partial => "PARTIAL",
            ClawbackStatus::Waived => "WAIVED",
            ClawbackStatus::WriteOff => "WRITE_OFF",
        }
    }

    pub fn parse(s: &str) -> PayoutResult<Self> {
        match s {
            "PENDING" => Ok(ClawbackStatus::Pending),
            "IN_PROGRESS" => Ok(ClawbackStatus::InProgress),
            "COMPLETED" => Ok(ClawbackStatus::Completed),
            "PARTIAL" => Ok(ClawbackStatus::Partial),
            "WAIVED" => Ok(ClawbackStatus::Waived),
            "WRITE_OFF" => Ok(ClawbackStatus::WriteOff),
            other => Err(PayoutError::Validation {
                reason: format!("unknown clawback status '{other}'"),
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ClawbackStatus::Pending | ClawbackStatus::InProgress)
    }
}

/// The policy transition that triggered recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClawbackTrigger {
    Surrendered,
    Lapsed,
    Cancelled,
}

impl ClawbackTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClawbackTrigger::Surrendered => "SURRENDERED",
            ClawbackTrigger::Lapsed => "LAPSED",
            ClawbackTrigger::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> PayoutResult<Self> {
        match s {
            "SURRENDERED" => Ok(ClawbackTrigger::Surrendered),
            "LAPSED" => Ok(ClawbackTrigger::Lapsed),
            "CANCELLED" => Ok(ClawbackTrigger::Cancelled),
            other => Err(PayoutError::Validation {
                reason: format!("unknown clawback trigger '{other}'"),
            }),
        }
    }
}

/// Policy status webhook payload. A transition into a trigger status starts
/// a clawback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyStatusChange {
    pub policy_number: String,
    pub old_status: String,
    pub new_status: String,
    pub reason: Option<String>,
}

impl PolicyStatusChange {
    pub fn clawback_trigger(&self) -> Option<ClawbackTrigger> {
        ClawbackTrigger::parse(&self.new_status).ok()
    }
}

/// Graduated recovery schedule over whole-month policy age. The lower bound
/// of each bracket is inclusive: month 12 already falls in the 75% bracket.
pub fn clawback_percentage(policy_age_months: u32) -> f64 {
    match policy_age_months {
        0..=11 => 100.0,
        12..=23 => 75.0,
        24..=35 => 50.0,
        36..=47 => 25.0,
        _ => 0.0,
    }
}

/// Whole months elapsed between inception and `as_of`; a started month does
/// not count until its day-of-month is reached.
pub fn policy_age_months(inception: NaiveDate, as_of: NaiveDate) -> u32 {
    if as_of <= inception {
        return 0;
    }
    let mut months = (as_of.year() - inception.year()) * 12
        + (as_of.month() as i32 - inception.month() as i32);
    if as_of.day() < inception.day() {
        months -= 1;
    }
    months.max(0) as u32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clawback {
    pub clawback_id: EntityId,
    pub policy_no: String,
    pub agent_id: EntityId,
    pub trigger: ClawbackTrigger,
    pub policy_inception_date: NaiveDate,
    pub policy_age_months: u32,
    /// Sum of all commission ever paid out for the policy.
    pub original_commission: f64,
    pub clawback_percentage: f64,
    pub clawback_amount: f64,
    pub recovered_amount: f64,
    pub pending_amount: f64,
    pub status: ClawbackStatus,
    pub recovery_start_date: Option<NaiveDateTime>,
    pub recovery_end_date: Option<NaiveDateTime>,
    pub remarks: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Clawback {
    pub fn new(
        policy_no: &str,
        agent_id: &str,
        trigger: ClawbackTrigger,
        policy_inception_date: NaiveDate,
        original_commission: f64,
        now: NaiveDateTime,
    ) -> PayoutResult<Self> {
        if original_commission <= 0.0 {
            return Err(PayoutError::Validation {
                reason: format!(
                    "no commission paid for policy {policy_no}: nothing to claw back"
                ),
            });
        }
        let age = policy_age_months(policy_inception_date, now.date());
        let percentage = clawback_percentage(age);
        let amount = original_commission * percentage / 100.0;
        // A policy past the full schedule has nothing to recover; the row is
        // still written for the audit trail.
        let status = if amount <= AMOUNT_EPSILON {
            ClawbackStatus::Completed
        } else {
            ClawbackStatus::Pending
        };
        Ok(Self {
            clawback_id: uuid::Uuid::new_v4().to_string(),
            policy_no: policy_no.to_string(),
            agent_id: agent_id.to_string(),
            trigger,
            policy_inception_date,
            policy_age_months: age,
            original_commission,
            clawback_percentage: percentage,
            clawback_amount: amount,
            recovered_amount: 0.0,
            pending_amount: amount,
            status,
            recovery_start_date: None,
            recovery_end_date: None,
            remarks: None,
            created_at: now,
        })
    }

    /// Nothing to recover when the policy outlived the full schedule.
    pub fn is_zero(&self) -> bool {
        self.clawback_amount <= AMOUNT_EPSILON
    }

    fn invalid(&self, action: &'static str) -> PayoutError {
        PayoutError::InvalidState {
            entity: "clawback",
            id: self.clawback_id.clone(),
            current: self.status.as_str().to_string(),
            action,
        }
    }

    /// Apply one recovered installment to the running balance. The first
    /// recovery moves PENDING → IN_PROGRESS; draining the balance below one
    /// paisa moves to COMPLETED.
    pub fn record_recovery(&mut self, amount: f64, now: NaiveDateTime) -> PayoutResult<()> {
        if !self.status.is_open() {
            return Err(self.invalid("record recovery"));
        }
        if amount <= 0.0 {
            return Err(PayoutError::Validation {
                reason: format!("recovery amount must be positive, got {amount}"),
            });
        }
        if amount > self.pending_amount + AMOUNT_EPSILON {
            return Err(PayoutError::Validation {
                reason: format!(
                    "recovery {amount} exceeds pending balance {} on clawback {}",
                    self.pending_amount, self.clawback_id
                ),
            });
        }

        if self.status == ClawbackStatus::Pending {
            self.status = ClawbackStatus::InProgress;
            self.recovery_start_date = Some(now);
        }

        self.recovered_amount += amount;
        self.pending_amount = self.clawback_amount - self.recovered_amount;

        if self.pending_amount <= AMOUNT_EPSILON {
            self.status = ClawbackStatus::Completed;
            self.recovery_end_date = Some(now);
        }
        Ok(())
    }

    pub fn waive(&mut self, remarks: &str, now: NaiveDateTime) -> PayoutResult<()> {
        if !self.status.is_open() {
            return Err(self.invalid("waive"));
        }
        self.status = ClawbackStatus::Waived;
        self.remarks = Some(remarks.to_string());
        self.recovery_end_date = Some(now);
        Ok(())
    }

    pub fn write_off(&mut self, remarks: &str, now: NaiveDateTime) -> PayoutResult<()> {
        if !self.status.is_open() {
            return Err(self.invalid("write off"));
        }
        self.status = ClawbackStatus::WriteOff;
        self.remarks = Some(remarks.to_string());
        self.recovery_end_date = Some(now);
        Ok(())
    }

    /// Close with partial recovery: an explicit business decision to stop
    /// collecting after some installments landed.
    pub fn close_partial(&mut self, remarks: &str, now: NaiveDateTime) -> PayoutResult<()> {
        if self.status != ClawbackStatus::InProgress {
            return Err(self.invalid("close as partial"));
        }
        if self.recovered_amount <= 0.0 {
            return Err(PayoutError::Validation {
                reason: format!(
                    "clawback {} has no recovered amount: waive or write off instead",
                    self.clawback_id
                ),
            });
        }
        self.status = ClawbackStatus::Partial;
        self.remarks = Some(remarks.to_string());
        self.recovery_end_date = Some(now);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStatus {
    Scheduled,
    Collected,
    Failed,
}

impl RecoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStatus::Scheduled => "SCHEDULED",
            RecoveryStatus::Collected => "COLLECTED",
            RecoveryStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> PayoutResult<Self> {
        match s {
            "SCHEDULED" => Ok(RecoveryStatus::Scheduled),
            "COLLECTED" => Ok(RecoveryStatus::Collected),
            "FAILED" => Ok(RecoveryStatus::Failed),
            other => Err(PayoutError::Validation {
                reason: format!("unknown recovery status '{other}'"),
            }),
        }
    }
}

/// One installment in the append-only recovery ledger. The pair
/// `(clawback_id, installment_number)` is unique, which is what makes a
/// replayed collection attempt a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClawbackRecovery {
    pub clawback_id: EntityId,
    pub installment_number: u32,
    pub amount: f64,
    pub status: RecoveryStatus,
    pub due_date: NaiveDate,
    pub collected_at: Option<NaiveDateTime>,
    /// Set when a collection attempt failed and the executor should come
    /// back later.
    pub next_retry_date: Option<NaiveDate>,
}

/// Split the pending balance into `installments` equal monthly dues; the
/// last installment absorbs the rounding remainder so the plan sums exactly
/// to the pending amount.
pub fn installment_plan(
    clawback: &Clawback,
    installments: u32,
    first_due: NaiveDate,
) -> PayoutResult<Vec<ClawbackRecovery>> {
    if !clawback.status.is_open() {
        return Err(PayoutError::InvalidState {
            entity: "clawback",
            id: clawback.clawback_id.clone(),
            current: clawback.status.as_str().to_string(),
            action: "schedule installments",
        });
    }
    if installments == 0 {
        return Err(PayoutError::Validation {
            reason: "installment count must be at least 1".to_string(),
        });
    }
    if clawback.pending_amount <= AMOUNT_EPSILON {
        return Err(PayoutError::Validation {
            reason: format!("clawback {} has no pending balance", clawback.clawback_id),
        });
    }

    let per_installment = (clawback.pending_amount / installments as f64 * 100.0).floor() / 100.0;
    let mut plan = Vec::with_capacity(installments as usize);
    let mut scheduled = 0.0;
    for i in 0..installments {
        let last = i == installments - 1;
        let amount = if last {
            clawback.pending_amount - scheduled
        } else {
            per_installment
        };
        scheduled += amount;
        plan.push(ClawbackRecovery {
            clawback_id: clawback.clawback_id.clone(),
            installment_number: i + 1,
            amount,
            status: RecoveryStatus::Scheduled,
            due_date: add_months(first_due, i),
            collected_at: None,
            next_retry_date: None,
        });
    }
    Ok(plan)
}

/// Same day-of-month `n` months later, clamped to the target month's end.
fn add_months(date: NaiveDate, n: u32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + n as i32;
    let year = total.div_euclid(12);
    let month0 = total.rem_euclid(12) as u32;
    let mut day = date.day();
    loop {
        if let Some(d) = NaiveDate::from_ymd_opt(year, month0 + 1, day) {
            return d;
        }
        day -= 1;
    }
}
