//! Donation transaction domain entity.
//! Framework-agnostic representation of a single gateway payment attempt.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

pub const DONATION_CURRENCY: &str = "BDT";

/// Lifecycle of a transaction. `Initiated` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Initiated,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Initiated)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown transaction status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "initiated" => Ok(TransactionStatus::Initiated),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Terminal transitions reachable from a browser redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closure {
    Failed { reason: Option<String> },
    Cancelled,
}

impl Closure {
    pub fn status(&self) -> TransactionStatus {
        match self {
            Closure::Failed { .. } => TransactionStatus::Failed,
            Closure::Cancelled => TransactionStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DonationTransaction {
    pub transaction_id: String,
    #[schema(value_type = String, example = "500.00")]
    pub amount: BigDecimal,
    pub currency: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub gateway_validation: Option<serde_json::Value>,
    pub payment_method: Option<String>,
    pub bank_transaction_id: Option<String>,
    pub fail_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl DonationTransaction {
    pub fn initiate(transaction_id: String, amount: BigDecimal, currency: &str) -> Self {
        Self {
            transaction_id,
            amount,
            currency: currency.to_string(),
            status: TransactionStatus::Initiated,
            gateway_validation: None,
            payment_method: None,
            bank_transaction_id: None,
            fail_reason: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
        }
    }

    /// Applies a closure in place. Returns false and leaves the record
    /// untouched when the transaction is already terminal.
    pub fn close(&mut self, closure: &Closure, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        self.status = closure.status();
        match closure {
            Closure::Failed { reason } => {
                self.failed_at = Some(at);
                self.fail_reason = reason.clone();
            }
            Closure::Cancelled => self.cancelled_at = Some(at),
        }
        true
    }
}
