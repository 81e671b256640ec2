//! In-memory implementation of the repository ports.
//!
//! A single mutex guards all state, so each port call is atomic with
//! respect to every other, mirroring the guarantees of the SQL statements.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    AccountStatus, Closure, DonationTransaction, Donor, DonorCredentials, NewDonor, Notice,
    NoticeKind, OtpChallenge, OutboxEntry, Role, TransactionStatus,
};
use crate::ports::{
    CloseOutcome, Completion, CompletionOutcome, DonationRepository, OutboxRepository,
    RepositoryError, RepositoryResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub notice: Notice,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct StoredTransaction {
    donor_id: Uuid,
    transaction: DonationTransaction,
}

#[derive(Default)]
struct State {
    donors: HashMap<Uuid, DonorCredentials>,
    transactions: HashMap<String, StoredTransaction>,
    outbox: Vec<OutboxRecord>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every outbox record, oldest first.
    pub async fn outbox(&self) -> Vec<OutboxRecord> {
        self.state.lock().await.outbox.clone()
    }

    pub async fn set_account_status(&self, id: Uuid, status: AccountStatus) {
        if let Some(credentials) = self.state.lock().await.donors.get_mut(&id) {
            credentials.donor.account_status = status;
        }
    }
}

#[async_trait]
impl DonationRepository for MemoryStore {
    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }

    async fn insert_donor(&self, new_donor: &NewDonor) -> RepositoryResult<Donor> {
        let mut state = self.state.lock().await;
        let taken = state.donors.values().any(|c| {
            c.donor.email.eq_ignore_ascii_case(&new_donor.email)
                || c.donor.username.eq_ignore_ascii_case(&new_donor.username)
        });
        if taken {
            return Err(RepositoryError::Conflict(
                "email or username already registered".to_string(),
            ));
        }

        let now = Utc::now();
        let donor = Donor {
            id: new_donor.id,
            first_name: new_donor.first_name.clone(),
            last_name: new_donor.last_name.clone(),
            email: new_donor.email.clone(),
            phone: new_donor.phone.clone(),
            username: new_donor.username.clone(),
            description: new_donor.description.clone(),
            role: Role::User,
            account_status: AccountStatus::Active,
            donated_amount: BigDecimal::from(0),
            address: new_donor.address.clone(),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        state.donors.insert(
            donor.id,
            DonorCredentials {
                donor: donor.clone(),
                password_hash: new_donor.password_hash.clone(),
                otp: None,
            },
        );
        Ok(donor)
    }

    async fn find_donor(&self, id: Uuid) -> RepositoryResult<Option<Donor>> {
        let state = self.state.lock().await;
        Ok(state.donors.get(&id).map(|c| c.donor.clone()))
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> RepositoryResult<Option<DonorCredentials>> {
        let state = self.state.lock().await;
        Ok(state
            .donors
            .values()
            .find(|c| c.donor.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(credentials) = state.donors.get_mut(&id) {
            credentials.donor.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn set_otp(&self, id: Uuid, otp: Option<OtpChallenge>) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(credentials) = state.donors.get_mut(&id) {
            credentials.otp = otp;
            credentials.donor.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        let credentials = state
            .donors
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        credentials.password_hash = password_hash.to_string();
        credentials.otp = None;
        credentials.donor.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_transaction(
        &self,
        donor_id: Uuid,
        tx: &DonationTransaction,
    ) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if !state.donors.contains_key(&donor_id) {
            return Err(RepositoryError::NotFound(donor_id.to_string()));
        }
        if state.transactions.contains_key(&tx.transaction_id) {
            return Err(RepositoryError::Conflict(
                "transaction id already exists".to_string(),
            ));
        }

        state.transactions.insert(
            tx.transaction_id.clone(),
            StoredTransaction {
                donor_id,
                transaction: tx.clone(),
            },
        );
        Ok(())
    }

    async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> RepositoryResult<Option<DonationTransaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .get(transaction_id)
            .map(|stored| stored.transaction.clone()))
    }

    async fn donor_transactions(&self, donor_id: Uuid) -> RepositoryResult<Vec<DonationTransaction>> {
        let state = self.state.lock().await;
        let mut transactions: Vec<DonationTransaction> = state
            .transactions
            .values()
            .filter(|stored| stored.donor_id == donor_id)
            .map(|stored| stored.transaction.clone())
            .collect();
        transactions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        Ok(transactions)
    }

    async fn complete_transaction(
        &self,
        completion: &Completion,
    ) -> RepositoryResult<CompletionOutcome> {
        let mut state = self.state.lock().await;
        let State {
            donors,
            transactions,
            outbox,
        } = &mut *state;

        let Some(stored) = transactions.get_mut(&completion.transaction_id) else {
            return Ok(CompletionOutcome::NotFound);
        };
        let tx = &mut stored.transaction;
        if tx.status.is_terminal() {
            return Ok(CompletionOutcome::AlreadyTerminal(tx.status));
        }
        if tx.amount != completion.amount {
            return Ok(CompletionOutcome::AmountMismatch {
                expected: tx.amount.clone(),
            });
        }
        let credentials = donors
            .get_mut(&stored.donor_id)
            .ok_or_else(|| RepositoryError::Corrupt(format!("donor {} missing", stored.donor_id)))?;

        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());
        tx.gateway_validation = Some(completion.validation.clone());
        tx.payment_method = completion.payment_method.clone();
        tx.bank_transaction_id = completion.bank_transaction_id.clone();

        let donor = &mut credentials.donor;
        donor.donated_amount = &donor.donated_amount + &tx.amount;
        donor.updated_at = Utc::now();

        outbox.push(OutboxRecord {
            notice: Notice::new(
                donor.email.clone(),
                NoticeKind::DonationReceipt,
                json!({
                    "firstName": donor.first_name,
                    "amount": tx.amount.with_scale(2).to_string(),
                    "transactionId": tx.transaction_id,
                }),
            ),
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            claimed_at: None,
        });

        Ok(CompletionOutcome::Applied {
            donor_id: donor.id,
            donated_amount: donor.donated_amount.clone(),
        })
    }

    async fn close_transaction(
        &self,
        transaction_id: &str,
        closure: &Closure,
    ) -> RepositoryResult<CloseOutcome> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.transactions.get_mut(transaction_id) else {
            return Ok(CloseOutcome::NotFound);
        };

        if stored.transaction.close(closure, Utc::now()) {
            Ok(CloseOutcome::Closed)
        } else {
            Ok(CloseOutcome::AlreadyTerminal(stored.transaction.status))
        }
    }
}

#[async_trait]
impl OutboxRepository for MemoryStore {
    async fn enqueue(&self, notice: &Notice) -> RepositoryResult<()> {
        self.state.lock().await.outbox.push(OutboxRecord {
            notice: notice.clone(),
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            claimed_at: None,
        });
        Ok(())
    }

    async fn claim_pending(&self, limit: i64) -> RepositoryResult<Vec<OutboxEntry>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let stale = now - Duration::minutes(5);
        let limit = usize::try_from(limit).unwrap_or(0);

        let mut claimed = Vec::new();
        for record in state.outbox.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            let claimable = match record.status {
                OutboxStatus::Pending => true,
                OutboxStatus::Sending => record.claimed_at.map_or(true, |at| at < stale),
                OutboxStatus::Sent | OutboxStatus::Failed => false,
            };
            if claimable {
                record.status = OutboxStatus::Sending;
                record.claimed_at = Some(now);
                record.attempts += 1;
                claimed.push(OutboxEntry {
                    notice: record.notice.clone(),
                    attempts: record.attempts,
                });
            }
        }
        Ok(claimed)
    }

    async fn mark_sent(&self, id: Uuid) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        let record = state
            .outbox
            .iter_mut()
            .find(|r| r.notice.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        record.status = OutboxStatus::Sent;
        record.claimed_at = None;
        record.last_error = None;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, give_up: bool) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        let record = state
            .outbox
            .iter_mut()
            .find(|r| r.notice.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        record.status = if give_up {
            OutboxStatus::Failed
        } else {
            OutboxStatus::Pending
        };
        record.claimed_at = None;
        record.last_error = Some(error.to_string());
        Ok(())
    }
}
