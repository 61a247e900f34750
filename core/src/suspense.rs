//! Suspense accounts for commission that could not be paid out.
//!
//! Each entry is prioritized from its amount and reason, carries a
//! resolution deadline, and ages into buckets for the aging report.

use crate::error::{PayoutError, PayoutResult};
use crate::types::{EntityId, WorkflowId};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Amounts at or above this are HIGH priority regardless of reason.
pub const HIGH_AMOUNT_THRESHOLD: f64 = 50_000.0;
/// Amounts at or above this are at least MEDIUM priority.
pub const MEDIUM_AMOUNT_THRESHOLD: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspenseReason {
    InvalidAccountDetails,
    MissingPanDetails,
    RateNotFound,
    BankRejected,
    DuplicatePayment,
    DisputeUnderReview,
    AgentInactive,
    Other,
}

impl SuspenseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspenseReason::InvalidAccountDetails => "INVALID_ACCOUNT_DETAILS",
            SuspenseReason::MissingPanDetails => "MISSING_PAN_DETAILS",
            SuspenseReason::RateNotFound => "RATE_NOT_FOUND",
            SuspenseReason::BankRejected => "BANK_REJECTED",
            SuspenseReason::DuplicatePayment => "DUPLICATE_PAYMENT",
            SuspenseReason::DisputeUnderReview => "DISPUTE_UNDER_REVIEW",
            SuspenseReason::AgentInactive => "AGENT_INACTIVE",
            SuspenseReason::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> PayoutResult<Self> {
        match s {
            "INVALID_ACCOUNT_DETAILS" => Ok(SuspenseReason::InvalidAccountDetails),
            "MISSING_PAN_DETAILS" => Ok(SuspenseReason::MissingPanDetails),
            "RATE_NOT_FOUND" => Ok(SuspenseReason::RateNotFound),
            "BANK_REJECTED" => Ok(SuspenseReason::BankRejected),
            "DUPLICATE_PAYMENT" => Ok(SuspenseReason::DuplicatePayment),
            "DISPUTE_UNDER_REVIEW" => Ok(SuspenseReason::DisputeUnderReview),
            "AGENT_INACTIVE" => Ok(SuspenseReason::AgentInactive),
            "OTHER" => Ok(SuspenseReason::Other),
            other => Err(PayoutError::Validation {
                reason: format!("unknown suspense reason '{other}'"),
            }),
        }
    }

    /// Reasons that are HIGH priority regardless of amount.
    fn always_high(&self) -> bool {
        matches!(
            self,
            SuspenseReason::DuplicatePayment | SuspenseReason::DisputeUnderReview
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspensePriority {
    High,
    Medium,
    Low,
}

impl SuspensePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspensePriority::High => "HIGH",
            SuspensePriority::Medium => "MEDIUM",
            SuspensePriority::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> PayoutResult<Self> {
        match s {
            "HIGH" => Ok(SuspensePriority::High),
            "MEDIUM" => Ok(SuspensePriority::Medium),
            "LOW" => Ok(SuspensePriority::Low),
            other => Err(PayoutError::Validation {
                reason: format!("unknown suspense priority '{other}'"),
            }),
        }
    }

    /// Calendar days allowed to resolve an entry of this priority.
    pub fn resolution_days(&self) -> i64 {
        match self {
            SuspensePriority::High => 7,
            SuspensePriority::Medium => 15,
            SuspensePriority::Low => 30,
        }
    }
}

pub fn priority_for(amount: f64, reason: SuspenseReason) -> SuspensePriority {
    if amount >= HIGH_AMOUNT_THRESHOLD || reason.always_high() {
        SuspensePriority::High
    } else if amount >= MEDIUM_AMOUNT_THRESHOLD {
        SuspensePriority::Medium
    } else {
        SuspensePriority::Low
    }
}

pub fn resolution_deadline(suspense_date: NaiveDate, priority: SuspensePriority) -> NaiveDate {
    suspense_date + Duration::days(priority.resolution_days())
}

/// Aging buckets with inclusive upper bounds: day 30 is still "0-30 days",
/// day 31 is "31-60 days".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgingBucket {
    UpTo30,
    Days31To60,
    Days61To90,
    Days91To180,
    Over180,
}

impl AgingBucket {
    pub const ALL: [AgingBucket; 5] = [
        AgingBucket::UpTo30,
        AgingBucket::Days31To60,
        AgingBucket::Days61To90,
        AgingBucket::Days91To180,
        AgingBucket::Over180,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AgingBucket::UpTo30 => "0-30 days",
            AgingBucket::Days31To60 => "31-60 days",
            AgingBucket::Days61To90 => "61-90 days",
            AgingBucket::Days91To180 => "91-180 days",
            AgingBucket::Over180 => "180+ days",
        }
    }

    fn index(&self) -> usize {
        match self {
            AgingBucket::UpTo30 => 0,
            AgingBucket::Days31To60 => 1,
            AgingBucket::Days61To90 => 2,
            AgingBucket::Days91To180 => 3,
            AgingBucket::Over180 => 4,
        }
    }
}

pub fn aging_bucket(days: i64) -> AgingBucket {
    match days {
        i64::MIN..=30 => AgingBucket::UpTo30,
        31..=60 => AgingBucket::Days31To60,
        61..=90 => AgingBucket::Days61To90,
        91..=180 => AgingBucket::Days91To180,
        _ => AgingBucket::Over180,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspenseStatus {
    Open,
    Resolved,
    WriteOff,
}

impl SuspenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspenseStatus::Open => "OPEN",
            SuspenseStatus::Resolved => "RESOLVED",
            SuspenseStatus::WriteOff => "WRITE_OFF",
        }
    }

    pub fn parse(s: &str) -> PayoutResult<Self> {
        match s {
            "OPEN" => Ok(SuspenseStatus::Open),
            "RESOLVED" => Ok(SuspenseStatus::Resolved),
            "WRITE_OFF" => Ok(SuspenseStatus::WriteOff),
            other => Err(PayoutError::Validation {
                reason: format!("unknown suspense status '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspenseAccount {
    pub suspense_id: EntityId,
    pub policy_no: Option<String>,
    pub agent_id: Option<EntityId>,
    pub amount: f64,
    pub reason: SuspenseReason,
    pub priority: SuspensePriority,
    pub suspense_date: NaiveDate,
    pub resolution_deadline: NaiveDate,
    pub status: SuspenseStatus,
    /// De-duplication token from the driving workflow: suspense creation has
    /// no natural business key, so replays are matched on this.
    pub workflow_id: WorkflowId,
    pub description: String,
    pub resolved_at: Option<NaiveDateTime>,
    pub resolution_remarks: Option<String>,
}

impl SuspenseAccount {
    pub fn new(
        policy_no: Option<String>,
        agent_id: Option<EntityId>,
        amount: f64,
        reason: SuspenseReason,
        description: &str,
        workflow_id: WorkflowId,
        now: NaiveDateTime,
    ) -> PayoutResult<Self> {
        if amount <= 0.0 {
            return Err(PayoutError::Validation {
                reason: format!("suspense amount must be positive, got {amount}"),
            });
        }
        let priority = priority_for(amount, reason);
        let suspense_date = now.date();
        Ok(Self {
            suspense_id: uuid::Uuid::new_v4().to_string(),
            policy_no,
            agent_id,
            amount,
            reason,
            priority,
            suspense_date,
            resolution_deadline: resolution_deadline(suspense_date, priority),
            status: SuspenseStatus::Open,
            workflow_id,
            description: description.to_string(),
            resolved_at: None,
            resolution_remarks: None,
        })
    }

    pub fn aging_days(&self, today: NaiveDate) -> i64 {
        (today - self.suspense_date).num_days().max(0)
    }

    pub fn bucket(&self, today: NaiveDate) -> AgingBucket {
        aging_bucket(self.aging_days(today))
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == SuspenseStatus::Open && today > self.resolution_deadline
    }

    fn close(
        &mut self,
        next: SuspenseStatus,
        remarks: &str,
        now: NaiveDateTime,
        action: &'static str,
    ) -> PayoutResult<()> {
        if self.status != SuspenseStatus::Open {
            return Err(PayoutError::InvalidState {
                entity: "suspense account",
                id: self.suspense_id.clone(),
                current: self.status.as_str().to_string(),
                action,
            });
        }
        self.status = next;
        self.resolved_at = Some(now);
        self.resolution_remarks = Some(remarks.to_string());
        Ok(())
    }

    pub fn resolve(&mut self, remarks: &str, now: NaiveDateTime) -> PayoutResult<()> {
        self.close(SuspenseStatus::Resolved, remarks, now, "resolve")
    }

    pub fn write_off(&mut self, remarks: &str, now: NaiveDateTime) -> PayoutResult<()> {
        self.close(SuspenseStatus::WriteOff, remarks, now, "write off")
    }
}

/// One line of the aging report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgingBucketLine {
    pub bucket: AgingBucket,
    pub label: String,
    pub count: i64,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of: NaiveDate,
    pub buckets: Vec<AgingBucketLine>,
    pub open_count: i64,
    pub open_amount: f64,
    pub overdue_count: i64,
    pub overdue_amount: f64,
}

/// Pure read-side reduction over OPEN entries. Closed entries never age.
pub fn aging_report(entries: &[SuspenseAccount], as_of: NaiveDate) -> AgingReport {
    let mut buckets: Vec<AgingBucketLine> = AgingBucket::ALL
        .iter()
        .map(|b| AgingBucketLine {
            bucket: *b,
            label: b.label().to_string(),
            count: 0,
            amount: 0.0,
        })
        .collect();
    let mut open_count = 0;
    let mut open_amount = 0.0;
    let mut overdue_count = 0;
    let mut overdue_amount = 0.0;

    for entry in entries.iter().filter(|e| e.status == SuspenseStatus::Open) {
        open_count += 1;
        open_amount += entry.amount;
        let line = &mut buckets[entry.bucket(as_of).index()];
        line.count += 1;
        line.amount += entry.amount;
        if entry.is_overdue(as_of) {
            overdue_count += 1;
            overdue_amount += entry.amount;
        }
    }

    AgingReport {
        as_of,
        buckets,
        open_count,
        open_amount,
        overdue_count,
        overdue_amount,
    }
}
