use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("{entity} {id} is {current}: cannot {action}")]
    InvalidState {
        entity: &'static str,
        id: String,
        current: String,
        action: &'static str,
    },

    #[error("Version conflict on disbursement {id}: expected {expected}, found {actual}")]
    OptimisticLock {
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error("A commission batch for {month}/{year} is already in progress")]
    DuplicateBatch { month: u32, year: i32 },

    #[error(
        "No active commission rate for product={product_type} agent={agent_type} \
         plan={plan_code} term={policy_term_years}y as of {as_of}"
    )]
    RateNotFound {
        product_type: String,
        agent_type: String,
        plan_code: String,
        policy_term_years: u32,
        as_of: NaiveDate,
    },

    #[error("Webhook signature verification failed")]
    BadSignature,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PayoutResult<T> = Result<T, PayoutError>;

impl PayoutError {
    /// Whether the external executor should retry the failed step.
    /// Business failures (wrong state, stale version, bad input) are final;
    /// infrastructure failures are worth another attempt with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PayoutError::Database(_) | PayoutError::Other(_))
    }
}
