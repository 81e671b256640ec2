//! Ports consumed by the services. Adapters live in `crate::adapters`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Closure, DonationTransaction, Donor, DonorCredentials, NewDonor, Notice, OtpChallenge,
    OutboxEntry, TransactionStatus,
};
use crate::gateway::{GatewayError, GatewaySession, SessionRequest, VerifiedPayment};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Gateway-confirmed facts applied to a transaction on completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub validation: serde_json::Value,
    pub payment_method: Option<String>,
    pub bank_transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// The transaction moved to `completed` and the donor was credited.
    Applied {
        donor_id: Uuid,
        donated_amount: BigDecimal,
    },
    AlreadyTerminal(TransactionStatus),
    /// The transaction is still `initiated` but was created for another amount.
    AmountMismatch { expected: BigDecimal },
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    Closed,
    AlreadyTerminal(TransactionStatus),
    NotFound,
}

#[async_trait]
pub trait DonationRepository: Send + Sync {
    async fn ping(&self) -> RepositoryResult<()>;

    /// Fails with `Conflict` when the email or username is taken.
    async fn insert_donor(&self, donor: &NewDonor) -> RepositoryResult<Donor>;
    async fn find_donor(&self, id: Uuid) -> RepositoryResult<Option<Donor>>;
    async fn find_credentials_by_email(&self, email: &str)
        -> RepositoryResult<Option<DonorCredentials>>;
    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<()>;
    async fn set_otp(&self, id: Uuid, otp: Option<OtpChallenge>) -> RepositoryResult<()>;
    /// Replaces the password hash and clears any pending OTP.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> RepositoryResult<()>;

    async fn insert_transaction(
        &self,
        donor_id: Uuid,
        tx: &DonationTransaction,
    ) -> RepositoryResult<()>;
    async fn find_transaction(&self, transaction_id: &str)
        -> RepositoryResult<Option<DonationTransaction>>;
    async fn donor_transactions(&self, donor_id: Uuid) -> RepositoryResult<Vec<DonationTransaction>>;

    /// Completes an `initiated` transaction, credits its donor and queues the
    /// receipt notice, all or nothing. Any other current state is reported
    /// back without mutation.
    async fn complete_transaction(&self, completion: &Completion)
        -> RepositoryResult<CompletionOutcome>;

    /// Moves an `initiated` transaction to `failed` or `cancelled`.
    async fn close_transaction(
        &self,
        transaction_id: &str,
        closure: &Closure,
    ) -> RepositoryResult<CloseOutcome>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn enqueue(&self, notice: &Notice) -> RepositoryResult<()>;
    /// Leases up to `limit` pending notices, incrementing their attempt count.
    async fn claim_pending(&self, limit: i64) -> RepositoryResult<Vec<OutboxEntry>>;
    async fn mark_sent(&self, id: Uuid) -> RepositoryResult<()>;
    /// Returns the notice to the queue, or parks it as `failed` when `give_up`.
    async fn mark_failed(&self, id: Uuid, error: &str, give_up: bool) -> RepositoryResult<()>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<GatewaySession, GatewayError>;
    async fn verify(&self, validation_id: &str) -> Result<VerifiedPayment, GatewayError>;

    fn circuit_state(&self) -> &'static str {
        "closed"
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("relay returned HTTP {0}")]
    Rejected(u16),
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Mail {
    pub to: String,
    pub from_name: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, mail: &Mail) -> Result<(), NotifyError>;
}

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(pub String);

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, HashError>;
    fn verify(&self, secret: &str, hash: &str) -> bool;
}
