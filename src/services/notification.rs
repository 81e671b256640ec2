//! Gateway notification (IPN) validation.
//!
//! A notification is untrusted input: anyone can POST to the IPN endpoint.
//! Before anything is applied, the validation id it carries is sent back to
//! the gateway's verification API, and only the facts the gateway confirms
//! are passed on to the reconciler.

use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use crate::domain::DONATION_CURRENCY;
use crate::error::{PaymentError, Rejection};
use crate::gateway::VerifiedPayment;
use crate::ports::PaymentGateway;
use crate::validation::is_valid_email;

/// Raw IPN body. Every field is optional so that malformed deliveries can be
/// acknowledged instead of bounced by the extractor.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct IpnPayload {
    pub tran_id: Option<String>,
    pub amount: Option<String>,
    pub val_id: Option<String>,
    pub status: Option<String>,
    pub cus_email: Option<String>,
}

/// What the notification claims happened.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub validation_id: String,
}

impl Claim {
    pub fn from_payload(payload: &IpnPayload) -> Result<Self, Rejection> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let transaction_id = present(&payload.tran_id);
        let amount = present(&payload.amount).and_then(|a| BigDecimal::from_str(&a).ok());
        let validation_id = present(&payload.val_id);

        match (transaction_id, amount, validation_id) {
            (Some(transaction_id), Some(amount), Some(validation_id)) => Ok(Self {
                transaction_id,
                amount,
                validation_id,
            }),
            (transaction_id, amount, validation_id) => {
                let mut missing = Vec::new();
                if transaction_id.is_none() {
                    missing.push("tran_id");
                }
                if amount.is_none() {
                    missing.push("amount");
                }
                if validation_id.is_none() {
                    missing.push("val_id");
                }
                Err(Rejection::MissingFields(missing))
            }
        }
    }
}

/// A payment whose every relevant fact has been confirmed by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedPayment {
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub payer_email: String,
    pub payment_method: Option<String>,
    pub bank_transaction_id: Option<String>,
    pub record: serde_json::Value,
}

/// Cross-checks a claim against the gateway's verification answer.
pub fn confirm(claim: &Claim, verified: VerifiedPayment) -> Result<ConfirmedPayment, Rejection> {
    if !verified.is_confirmed() {
        return Err(Rejection::NotConfirmed(verified.status));
    }

    let confirmed_id = verified.transaction_id.clone().unwrap_or_default();
    if confirmed_id != claim.transaction_id {
        return Err(Rejection::Mismatch {
            field: "tran_id",
            claimed: claim.transaction_id.clone(),
            confirmed: confirmed_id,
        });
    }

    let confirmed_amount = verified
        .amount
        .as_deref()
        .and_then(|a| BigDecimal::from_str(a).ok());
    let amount = match confirmed_amount {
        Some(amount) if amount == claim.amount => amount,
        other => {
            return Err(Rejection::Mismatch {
                field: "amount",
                claimed: claim.amount.to_string(),
                confirmed: other.map(|a| a.to_string()).unwrap_or_default(),
            })
        }
    };

    match verified.currency.as_deref() {
        Some(currency) if currency.eq_ignore_ascii_case(DONATION_CURRENCY) => {}
        other => {
            return Err(Rejection::Mismatch {
                field: "currency",
                claimed: DONATION_CURRENCY.to_string(),
                confirmed: other.unwrap_or_default().to_string(),
            })
        }
    }

    let payer_email = match verified.payer_email {
        Some(email) if is_valid_email(&email) => email,
        _ => return Err(Rejection::InvalidPayerContact),
    };

    Ok(ConfirmedPayment {
        transaction_id: claim.transaction_id.clone(),
        amount,
        payer_email,
        payment_method: verified.card_type,
        bank_transaction_id: verified.bank_transaction_id,
        record: verified.record,
    })
}

pub struct NotificationValidator {
    gateway: Arc<dyn PaymentGateway>,
}

impl NotificationValidator {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Gateway failures surface as retryable errors; every other refusal is
    /// a `PaymentError::Rejected`.
    pub async fn validate(&self, payload: &IpnPayload) -> Result<ConfirmedPayment, PaymentError> {
        let claim = Claim::from_payload(payload).map_err(PaymentError::Rejected)?;
        debug!(transaction_id = %claim.transaction_id, "verifying notification with gateway");

        let verified = self.gateway.verify(&claim.validation_id).await?;
        confirm(&claim, verified).map_err(PaymentError::Rejected)
    }
}
