//! Payment rail contracts: the outbound EFT request and the inbound
//! confirmation webhook.
//!
//! Webhook payloads are authenticated with HMAC-SHA256 over the raw bytes.
//! Verification happens before parsing — an unauthenticated payload is
//! never deserialized.

use crate::disbursement::{Disbursement, PaymentInstrument};
use crate::error::{PayoutError, PayoutResult};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Request handed to the PFMS/bank rail for one EFT disbursement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EftPaymentRequest {
    pub idempotency_key: String,
    pub disbursement_id: String,
    pub amount: f64,
    pub account_no: String,
    pub ifsc_code: String,
    pub account_holder: String,
}

impl EftPaymentRequest {
    /// Build the rail request for an EFT disbursement. Cheque disbursements
    /// never reach the rail.
    pub fn for_disbursement(d: &Disbursement) -> PayoutResult<Self> {
        match &d.instrument {
            PaymentInstrument::Eft {
                account_no,
                ifsc_code,
                account_holder,
            } => Ok(Self {
                idempotency_key: d.idempotency_key.clone(),
                disbursement_id: d.disbursement_id.clone(),
                amount: d.amount,
                account_no: account_no.clone(),
                ifsc_code: ifsc_code.clone(),
                account_holder: account_holder.clone(),
            }),
            PaymentInstrument::Cheque { .. } => Err(PayoutError::Validation {
                reason: format!(
                    "disbursement {} is CHEQUE mode: no EFT request to build",
                    d.disbursement_id
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentWebhookStatus {
    Success,
    Failed,
}

/// Bank confirmation delivered at-least-once over the webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub disbursement_id: String,
    pub utr_number: Option<String>,
    pub status: PaymentWebhookStatus,
    pub failure_code: Option<String>,
}

/// Verify an HMAC-SHA256 signature (hex-encoded) over the raw payload.
/// Comparison is constant-time via the hmac crate.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature_hex: &str) -> PayoutResult<()> {
    let expected = hex::decode(signature_hex).map_err(|_| PayoutError::BadSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| PayoutError::Other(anyhow::anyhow!("bad webhook secret: {e}")))?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| PayoutError::BadSignature)
}

/// Hex signature for an outgoing payload; also used by tests and the demo
/// runner to forge valid webhook deliveries.
pub fn sign_payload(secret: &[u8], payload: &[u8]) -> PayoutResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| PayoutError::Other(anyhow::anyhow!("bad webhook secret: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Authenticate and parse a payment confirmation webhook.
pub fn parse_payment_confirmation(
    secret: &[u8],
    payload: &[u8],
    signature_hex: &str,
) -> PayoutResult<PaymentConfirmation> {
    verify_signature(secret, payload, signature_hex)?;
    Ok(serde_json::from_slice(payload)?)
}
