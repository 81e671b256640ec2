//! Payment gateway request/response types and the SSLCommerz HTTP client.

pub mod client;

pub use client::SslCommerzClient;

use bigdecimal::BigDecimal;
use thiserror::Error;

use crate::config::CallbackUrls;
use crate::domain::Donor;

pub const PLACEHOLDER: &str = "N/A";
pub const DEFAULT_POSTCODE: &str = "1000";
pub const DEFAULT_COUNTRY: &str = "Bangladesh";
pub const PRODUCT_CATEGORY: &str = "Donation";
pub const PRODUCT_PROFILE: &str = "non-physical-goods";
pub const SHIPPING_METHOD: &str = "NO";

/// Verification statuses that mean the gateway has settled the payment.
pub const CONFIRMED_STATUSES: &[&str] = &["VALID", "VALIDATED"];

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Gateway returned HTTP {0}")]
    UnexpectedStatus(u16),
    #[error("Gateway rejected session: {0}")]
    SessionRejected(String),
    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Customer fields sent to the hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerProfile {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub postcode: String,
    pub country: String,
}

impl CustomerProfile {
    pub fn from_donor(donor: &Donor) -> Self {
        let address = donor.address.clone().unwrap_or_default();
        let or_placeholder = |value: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| PLACEHOLDER.to_string())
        };

        Self {
            name: donor.full_name(),
            email: donor.email.clone(),
            phone: or_placeholder(Some(donor.phone.clone())),
            address_line1: or_placeholder(address.line1),
            address_line2: or_placeholder(address.line2),
            city: or_placeholder(address.city),
            state: or_placeholder(address.state),
            postcode: address
                .zip
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_POSTCODE.to_string()),
            country: DEFAULT_COUNTRY.to_string(),
        }
    }
}

/// Session creation request for the hosted payment page.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub success_url: String,
    pub fail_url: String,
    pub cancel_url: String,
    pub ipn_url: String,
    pub product_name: String,
    pub customer: CustomerProfile,
}

impl SessionRequest {
    pub fn for_donation(
        transaction_id: &str,
        amount: &BigDecimal,
        currency: &str,
        donor: &Donor,
        callbacks: &CallbackUrls,
    ) -> Self {
        let customer = CustomerProfile::from_donor(donor);
        Self {
            transaction_id: transaction_id.to_string(),
            amount: amount.with_scale(2),
            currency: currency.to_string(),
            success_url: callbacks.success_for(transaction_id),
            fail_url: callbacks.fail.to_string(),
            cancel_url: callbacks.cancel.to_string(),
            ipn_url: callbacks.ipn.to_string(),
            product_name: format!("Donation by {}", customer.name),
            customer,
        }
    }

    /// Flattens the request into the gateway's form field names.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let c = &self.customer;
        vec![
            ("total_amount", self.amount.to_string()),
            ("currency", self.currency.clone()),
            ("tran_id", self.transaction_id.clone()),
            ("success_url", self.success_url.clone()),
            ("fail_url", self.fail_url.clone()),
            ("cancel_url", self.cancel_url.clone()),
            ("ipn_url", self.ipn_url.clone()),
            ("product_category", PRODUCT_CATEGORY.to_string()),
            ("product_name", self.product_name.clone()),
            ("num_of_item", "1".to_string()),
            ("product_profile", PRODUCT_PROFILE.to_string()),
            ("cus_name", c.name.clone()),
            ("cus_email", c.email.clone()),
            ("cus_add1", c.address_line1.clone()),
            ("cus_add2", c.address_line2.clone()),
            ("cus_city", c.city.clone()),
            ("cus_state", c.state.clone()),
            ("cus_postcode", c.postcode.clone()),
            ("cus_country", c.country.clone()),
            ("cus_phone", c.phone.clone()),
            ("cus_fax", PLACEHOLDER.to_string()),
            ("shipping_method", SHIPPING_METHOD.to_string()),
            ("ship_name", c.name.clone()),
            ("ship_add1", c.address_line1.clone()),
            ("ship_add2", c.address_line2.clone()),
            ("ship_city", c.city.clone()),
            ("ship_state", c.state.clone()),
            ("ship_postcode", c.postcode.clone()),
            ("ship_country", c.country.clone()),
            ("emi_option", "0".to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySession {
    pub redirect_url: String,
    pub session_key: Option<String>,
}

/// The gateway's own account of a payment, as returned by its validation API.
/// Fields are kept as raw text; callers decide how to interpret them.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPayment {
    pub status: String,
    pub transaction_id: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub payer_email: Option<String>,
    pub card_type: Option<String>,
    pub bank_transaction_id: Option<String>,
    pub record: serde_json::Value,
}

impl VerifiedPayment {
    pub fn from_record(record: serde_json::Value) -> Result<Self, GatewayError> {
        let text = |key: &str| {
            record.get(key).and_then(|value| match value {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };

        let status = text("status").ok_or_else(|| {
            GatewayError::InvalidResponse("validation response has no status".to_string())
        })?;

        let transaction_id = text("tran_id");
        let amount = text("amount");
        let currency = text("currency");
        let payer_email = text("cus_email");
        let card_type = text("card_type");
        let bank_transaction_id = text("bank_tran_id");

        Ok(Self {
            status,
            transaction_id,
            amount,
            currency,
            payer_email,
            card_type,
            bank_transaction_id,
            record,
        })
    }

    pub fn is_confirmed(&self) -> bool {
        CONFIRMED_STATUSES.contains(&self.status.as_str())
    }
}
