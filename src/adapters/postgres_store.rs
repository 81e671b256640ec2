//! Postgres implementation of the repository ports.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    Address, Closure, DonationTransaction, Donor, DonorCredentials, NewDonor, Notice, NoticeKind,
    OtpChallenge, OutboxEntry, TransactionStatus,
};
use crate::ports::{
    CloseOutcome, Completion, CompletionOutcome, DonationRepository, OutboxRepository,
    RepositoryError, RepositoryResult,
};

const DONOR_COLUMNS: &str = "id, first_name, last_name, email, phone, username, description, \
     password_hash, role, account_status, donated_amount, address_line1, address_line2, \
     address_city, address_state, address_zip, address_country, otp_hash, otp_expires_at, \
     last_login_at, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "transaction_id, amount, currency, status, gateway_validation, \
     payment_method, bank_transaction_id, fail_reason, created_at, completed_at, failed_at, \
     cancelled_at";

/// Notices stuck in `sending` longer than this are handed out again.
const CLAIM_LEASE: &str = "5 minutes";

/// Postgres-backed donor, transaction and outbox store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn transaction_state(
        &self,
        transaction_id: &str,
    ) -> RepositoryResult<Option<(TransactionStatus, BigDecimal)>> {
        let row: Option<(String, BigDecimal)> = sqlx::query_as(
            "SELECT status, amount FROM donation_transactions WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(status, amount)| Ok((parse_status(&status)?, amount)))
            .transpose()
    }
}

fn parse_status(raw: &str) -> RepositoryResult<TransactionStatus> {
    raw.parse()
        .map_err(|e: crate::domain::UnknownStatus| RepositoryError::Corrupt(e.to_string()))
}

/// Maps unique-key violations to `Conflict`.
fn conflict_or(err: sqlx::Error, what: &str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(what.to_string())
        }
        _ => RepositoryError::Database(err),
    }
}

#[async_trait]
impl DonationRepository for PostgresStore {
    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_donor(&self, donor: &NewDonor) -> RepositoryResult<Donor> {
        let address = donor.address.clone().unwrap_or_default();
        let row = sqlx::query_as::<_, DonorRow>(&format!(
            r#"
            INSERT INTO donors (
                id, first_name, last_name, email, phone, username, description, password_hash,
                address_line1, address_line2, address_city, address_state, address_zip,
                address_country
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {DONOR_COLUMNS}
            "#
        ))
        .bind(donor.id)
        .bind(&donor.first_name)
        .bind(&donor.last_name)
        .bind(&donor.email)
        .bind(&donor.phone)
        .bind(&donor.username)
        .bind(&donor.description)
        .bind(&donor.password_hash)
        .bind(address.line1)
        .bind(address.line2)
        .bind(address.city)
        .bind(address.state)
        .bind(address.zip)
        .bind(address.country)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "email or username already registered"))?;

        Ok(row.into_credentials()?.donor)
    }

    async fn find_donor(&self, id: Uuid) -> RepositoryResult<Option<Donor>> {
        let row = sqlx::query_as::<_, DonorRow>(&format!(
            "SELECT {DONOR_COLUMNS} FROM donors WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_credentials().map(|c| c.donor))
            .transpose()
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> RepositoryResult<Option<DonorCredentials>> {
        let row = sqlx::query_as::<_, DonorRow>(&format!(
            "SELECT {DONOR_COLUMNS} FROM donors WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DonorRow::into_credentials).transpose()
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<()> {
        sqlx::query("UPDATE donors SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_otp(&self, id: Uuid, otp: Option<OtpChallenge>) -> RepositoryResult<()> {
        let (hash, expires_at) = match otp {
            Some(challenge) => (Some(challenge.otp_hash), Some(challenge.expires_at)),
            None => (None, None),
        };

        sqlx::query(
            "UPDATE donors SET otp_hash = $2, otp_expires_at = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE donors
            SET password_hash = $2, otp_hash = NULL, otp_expires_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn insert_transaction(
        &self,
        donor_id: Uuid,
        tx: &DonationTransaction,
    ) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO donation_transactions (
                transaction_id, donor_id, amount, currency, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&tx.transaction_id)
        .bind(donor_id)
        .bind(&tx.amount)
        .bind(&tx.currency)
        .bind(tx.status.as_str())
        .bind(tx.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "transaction id already exists"))?;
        Ok(())
    }

    async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> RepositoryResult<Option<DonationTransaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM donation_transactions WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn donor_transactions(&self, donor_id: Uuid) -> RepositoryResult<Vec<DonationTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM donation_transactions \
             WHERE donor_id = $1 ORDER BY created_at ASC, transaction_id ASC"
        ))
        .bind(donor_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn complete_transaction(
        &self,
        completion: &Completion,
    ) -> RepositoryResult<CompletionOutcome> {
        // One statement: the status guard on the first CTE is what makes a
        // replayed or concurrent confirmation a no-op.
        let applied: Option<(Uuid, BigDecimal)> = sqlx::query_as(
            r#"
            WITH completed AS (
                UPDATE donation_transactions
                SET status = 'completed',
                    completed_at = NOW(),
                    gateway_validation = $3,
                    payment_method = $4,
                    bank_transaction_id = $5
                WHERE transaction_id = $1 AND status = 'initiated' AND amount = $2
                RETURNING transaction_id, donor_id, amount
            ),
            credited AS (
                UPDATE donors d
                SET donated_amount = d.donated_amount + c.amount, updated_at = NOW()
                FROM completed c
                WHERE d.id = c.donor_id
                RETURNING d.id, d.email, d.first_name, d.donated_amount
            ),
            receipt AS (
                INSERT INTO notification_outbox (id, recipient, kind, payload)
                SELECT $6, cr.email, 'donation_receipt',
                       jsonb_build_object(
                           'firstName', cr.first_name,
                           'amount', c.amount::TEXT,
                           'transactionId', c.transaction_id
                       )
                FROM credited cr CROSS JOIN completed c
                RETURNING id
            )
            SELECT id, donated_amount FROM credited
            "#,
        )
        .bind(&completion.transaction_id)
        .bind(&completion.amount)
        .bind(&completion.validation)
        .bind(&completion.payment_method)
        .bind(&completion.bank_transaction_id)
        .bind(Uuid::new_v4())
        .fetch_optional(&self.pool)
        .await?;

        if let Some((donor_id, donated_amount)) = applied {
            return Ok(CompletionOutcome::Applied {
                donor_id,
                donated_amount,
            });
        }

        match self.transaction_state(&completion.transaction_id).await? {
            None => Ok(CompletionOutcome::NotFound),
            Some((status, _)) if status.is_terminal() => {
                Ok(CompletionOutcome::AlreadyTerminal(status))
            }
            Some((_, amount)) if amount != completion.amount => {
                Ok(CompletionOutcome::AmountMismatch { expected: amount })
            }
            Some(_) => Err(RepositoryError::Conflict(format!(
                "transaction {} changed during completion",
                completion.transaction_id
            ))),
        }
    }

    async fn close_transaction(
        &self,
        transaction_id: &str,
        closure: &Closure,
    ) -> RepositoryResult<CloseOutcome> {
        let now = Utc::now();
        let (failed_at, cancelled_at, reason) = match closure {
            Closure::Failed { reason } => (Some(now), None, reason.clone()),
            Closure::Cancelled => (None, Some(now), None),
        };

        let result = sqlx::query(
            r#"
            UPDATE donation_transactions
            SET status = $2, failed_at = $3, cancelled_at = $4, fail_reason = $5
            WHERE transaction_id = $1 AND status = 'initiated'
            "#,
        )
        .bind(transaction_id)
        .bind(closure.status().as_str())
        .bind(failed_at)
        .bind(cancelled_at)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(CloseOutcome::Closed);
        }

        match self.transaction_state(transaction_id).await? {
            None => Ok(CloseOutcome::NotFound),
            Some((status, _)) if status.is_terminal() => Ok(CloseOutcome::AlreadyTerminal(status)),
            Some(_) => Err(RepositoryError::Conflict(format!(
                "transaction {transaction_id} changed during close"
            ))),
        }
    }
}

#[async_trait]
impl OutboxRepository for PostgresStore {
    async fn enqueue(&self, notice: &Notice) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_outbox (id, recipient, reply_to, kind, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(notice.id)
        .bind(&notice.recipient)
        .bind(&notice.reply_to)
        .bind(notice.kind.as_str())
        .bind(&notice.payload)
        .bind(notice.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_pending(&self, limit: i64) -> RepositoryResult<Vec<OutboxEntry>> {
        // SKIP LOCKED lets several dispatchers share the queue without
        // blocking on each other's rows.
        let rows = sqlx::query_as::<_, OutboxRow>(&format!(
            r#"
            UPDATE notification_outbox
            SET status = 'sending', claimed_at = NOW(), attempts = attempts + 1
            WHERE id IN (
                SELECT id FROM notification_outbox
                WHERE status = 'pending'
                   OR (status = 'sending' AND claimed_at < NOW() - INTERVAL '{CLAIM_LEASE}')
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, recipient, reply_to, kind, payload, attempts, created_at
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxRow::into_domain).collect()
    }

    async fn mark_sent(&self, id: Uuid) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'sent', sent_at = NOW(), claimed_at = NULL, last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, give_up: bool) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = CASE WHEN $3 THEN 'failed' ELSE 'pending' END,
                last_error = $2,
                claimed_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(give_up)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct DonorRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    username: String,
    description: String,
    password_hash: String,
    role: String,
    account_status: String,
    donated_amount: BigDecimal,
    address_line1: Option<String>,
    address_line2: Option<String>,
    address_city: Option<String>,
    address_state: Option<String>,
    address_zip: Option<String>,
    address_country: Option<String>,
    otp_hash: Option<String>,
    otp_expires_at: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DonorRow {
    fn into_credentials(self) -> RepositoryResult<DonorCredentials> {
        let address = Address {
            line1: self.address_line1,
            line2: self.address_line2,
            city: self.address_city,
            state: self.address_state,
            zip: self.address_zip,
            country: self.address_country,
        };
        let otp = match (self.otp_hash, self.otp_expires_at) {
            (Some(otp_hash), Some(expires_at)) => Some(OtpChallenge {
                otp_hash,
                expires_at,
            }),
            _ => None,
        };

        Ok(DonorCredentials {
            donor: Donor {
                id: self.id,
                first_name: self.first_name,
                last_name: self.last_name,
                email: self.email,
                phone: self.phone,
                username: self.username,
                description: self.description,
                role: self.role.parse().map_err(RepositoryError::Corrupt)?,
                account_status: self
                    .account_status
                    .parse()
                    .map_err(RepositoryError::Corrupt)?,
                donated_amount: self.donated_amount,
                address: (address != Address::default()).then_some(address),
                last_login_at: self.last_login_at,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            password_hash: self.password_hash,
            otp,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    transaction_id: String,
    amount: BigDecimal,
    currency: String,
    status: String,
    gateway_validation: Option<serde_json::Value>,
    payment_method: Option<String>,
    bank_transaction_id: Option<String>,
    fail_reason: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<DonationTransaction> {
        Ok(DonationTransaction {
            status: parse_status(&self.status)?,
            transaction_id: self.transaction_id,
            amount: self.amount,
            currency: self.currency,
            gateway_validation: self.gateway_validation,
            payment_method: self.payment_method,
            bank_transaction_id: self.bank_transaction_id,
            fail_reason: self.fail_reason,
            created_at: self.created_at,
            completed_at: self.completed_at,
            failed_at: self.failed_at,
            cancelled_at: self.cancelled_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    recipient: String,
    reply_to: Option<String>,
    kind: String,
    payload: serde_json::Value,
    attempts: i32,
    created_at: DateTime<Utc>,
}

impl OutboxRow {
    fn into_domain(self) -> RepositoryResult<OutboxEntry> {
        let kind: NoticeKind = self.kind.parse().map_err(RepositoryError::Corrupt)?;
        Ok(OutboxEntry {
            notice: Notice {
                id: self.id,
                recipient: self.recipient,
                reply_to: self.reply_to,
                kind,
                payload: self.payload,
                created_at: self.created_at,
            },
            attempts: self.attempts,
        })
    }
}
