//! Starts a hosted-checkout session for a donation.

use bigdecimal::BigDecimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::CallbackUrls;
use crate::domain::{new_transaction_id, DonationTransaction, Donor, DONATION_CURRENCY};
use crate::error::PaymentError;
use crate::gateway::SessionRequest;
use crate::ports::{DonationRepository, PaymentGateway};

/// Upper bound for a single donation; keeps values inside NUMERIC(14,2).
const MAX_DONATION: f64 = 1e12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedSession {
    pub redirect_url: String,
    pub transaction_id: String,
}

/// Reads a requested donation amount from a JSON body value.
///
/// Only JSON numbers are accepted. The value is rounded to two decimals and
/// must still be positive afterwards.
pub fn parse_donation_amount(raw: Option<&serde_json::Value>) -> Result<BigDecimal, PaymentError> {
    let value = raw
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| PaymentError::InvalidAmount("amount must be a number".to_string()))?;

    if !value.is_finite() || value <= 0.0 || value >= MAX_DONATION {
        return Err(PaymentError::InvalidAmount(format!("{value} is out of range")));
    }

    let rounded = BigDecimal::from_str(&format!("{value:.2}"))
        .map_err(|e| PaymentError::InvalidAmount(e.to_string()))?;
    if rounded <= BigDecimal::from(0) {
        return Err(PaymentError::InvalidAmount(format!(
            "{value} rounds to zero"
        )));
    }

    Ok(rounded)
}

pub struct SessionInitiator {
    repository: Arc<dyn DonationRepository>,
    gateway: Arc<dyn PaymentGateway>,
    callbacks: CallbackUrls,
}

impl SessionInitiator {
    pub fn new(
        repository: Arc<dyn DonationRepository>,
        gateway: Arc<dyn PaymentGateway>,
        callbacks: CallbackUrls,
    ) -> Self {
        Self {
            repository,
            gateway,
            callbacks,
        }
    }

    /// Opens a gateway session and records the transaction as `initiated`.
    /// Nothing is stored unless the gateway hands back a redirect URL.
    pub async fn initiate(
        &self,
        donor: &Donor,
        amount: &BigDecimal,
    ) -> Result<InitiatedSession, PaymentError> {
        if donor.email.trim().is_empty() {
            return Err(PaymentError::InvalidDonorProfile(
                "An email address is required to donate.".to_string(),
            ));
        }
        if amount <= &BigDecimal::from(0) {
            return Err(PaymentError::InvalidAmount(amount.to_string()));
        }

        let transaction_id = new_transaction_id();
        let request = SessionRequest::for_donation(
            &transaction_id,
            amount,
            DONATION_CURRENCY,
            donor,
            &self.callbacks,
        );

        let session = self.gateway.create_session(&request).await.map_err(|e| {
            warn!(transaction_id = %transaction_id, error = %e, "gateway session creation failed");
            PaymentError::GatewayInitiationFailed(e.to_string())
        })?;

        let transaction = DonationTransaction::initiate(
            transaction_id.clone(),
            request.amount.clone(),
            DONATION_CURRENCY,
        );
        self.repository
            .insert_transaction(donor.id, &transaction)
            .await?;

        info!(
            transaction_id = %transaction_id,
            donor_id = %donor.id,
            amount = %request.amount,
            "payment session initiated"
        );

        Ok(InitiatedSession {
            redirect_url: session.redirect_url,
            transaction_id,
        })
    }
}
