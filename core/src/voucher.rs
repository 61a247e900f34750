//! Double-entry voucher contracts for the accounting collaborator.
//!
//! RULE: a voucher leaves this module only if it balances. The GL system
//! rejects unbalanced postings, so `is_balanced` is checked here first.

use crate::clawback::Clawback;
use crate::disbursement::Disbursement;
use crate::error::{PayoutError, PayoutResult};
use crate::statement::FinalStatement;
use crate::suspense::SuspenseAccount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const ACC_COMMISSION_EXPENSE: &str = "COMMISSION_EXPENSE";
pub const ACC_TDS_PAYABLE: &str = "TDS_PAYABLE";
pub const ACC_BANK: &str = "BANK";
pub const ACC_COMMISSION_SUSPENSE: &str = "COMMISSION_SUSPENSE";
pub const ACC_CLAWBACK_RECEIVABLE: &str = "CLAWBACK_RECEIVABLE";

const BALANCE_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherEntry {
    pub account: String,
    pub debit: f64,
    pub credit: f64,
    pub narration: String,
}

impl VoucherEntry {
    fn debit(account: &str, amount: f64, narration: String) -> Self {
        Self {
            account: account.to_string(),
            debit: amount,
            credit: 0.0,
            narration,
        }
    }

    fn credit(account: &str, amount: f64, narration: String) -> Self {
        Self {
            account: account.to_string(),
            debit: 0.0,
            credit: amount,
            narration,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub reference: String,
    pub voucher_date: NaiveDate,
    pub entries: Vec<VoucherEntry>,
}

impl Voucher {
    pub fn total_debit(&self) -> f64 {
        self.entries.iter().map(|e| e.debit).sum()
    }

    pub fn total_credit(&self) -> f64 {
        self.entries.iter().map(|e| e.credit).sum()
    }

    pub fn is_balanced(&self) -> bool {
        (self.total_debit() - self.total_credit()).abs() <= BALANCE_EPSILON
    }

    fn checked(self) -> PayoutResult<Self> {
        if !self.is_balanced() {
            return Err(PayoutError::Validation {
                reason: format!(
                    "voucher {} does not balance: debit {} vs credit {}",
                    self.reference,
                    self.total_debit(),
                    self.total_credit()
                ),
            });
        }
        Ok(self)
    }
}

/// Commission payout: gross expense against TDS withheld and net paid out.
pub fn commission_payment_voucher(
    final_statement: &FinalStatement,
    disbursement: &Disbursement,
    voucher_date: NaiveDate,
) -> PayoutResult<Voucher> {
    let narration = format!(
        "Commission payout to agent {} via {}",
        disbursement.agent_id,
        disbursement.instrument.mode_str()
    );
    Voucher {
        reference: format!("COMM-{}", disbursement.disbursement_id),
        voucher_date,
        entries: vec![
            VoucherEntry::debit(
                ACC_COMMISSION_EXPENSE,
                final_statement.gross_amount,
                narration.clone(),
            ),
            VoucherEntry::credit(ACC_TDS_PAYABLE, final_statement.tds_amount, narration.clone()),
            VoucherEntry::credit(ACC_BANK, final_statement.net_amount, narration),
        ],
    }
    .checked()
}

/// One recovered installment: cash in against the receivable.
pub fn clawback_recovery_voucher(
    clawback: &Clawback,
    amount: f64,
    voucher_date: NaiveDate,
) -> PayoutResult<Voucher> {
    let narration = format!("Clawback recovery for policy {}", clawback.policy_no);
    Voucher {
        reference: format!("CLWB-{}-{}", clawback.clawback_id, voucher_date),
        voucher_date,
        entries: vec![
            VoucherEntry::debit(ACC_BANK, amount, narration.clone()),
            VoucherEntry::credit(ACC_CLAWBACK_RECEIVABLE, amount, narration),
        ],
    }
    .checked()
}

/// Park an undeliverable payout in the suspense account.
pub fn suspense_parking_voucher(
    suspense: &SuspenseAccount,
    voucher_date: NaiveDate,
) -> PayoutResult<Voucher> {
    let narration = format!("Commission held in suspense: {}", suspense.reason.as_str());
    Voucher {
        reference: format!("SUSP-{}", suspense.suspense_id),
        voucher_date,
        entries: vec![
            VoucherEntry::debit(ACC_COMMISSION_EXPENSE, suspense.amount, narration.clone()),
            VoucherEntry::credit(ACC_COMMISSION_SUSPENSE, suspense.amount, narration),
        ],
    }
    .checked()
}

/// Release a resolved suspense entry back out for payment.
pub fn suspense_resolution_voucher(
    suspense: &SuspenseAccount,
    voucher_date: NaiveDate,
) -> PayoutResult<Voucher> {
    let narration = format!("Suspense released for {}", suspense.suspense_id);
    Voucher {
        reference: format!("SUSR-{}", suspense.suspense_id),
        voucher_date,
        entries: vec![
            VoucherEntry::debit(ACC_COMMISSION_SUSPENSE, suspense.amount, narration.clone()),
            VoucherEntry::credit(ACC_BANK, suspense.amount, narration),
        ],
    }
    .checked()
}
