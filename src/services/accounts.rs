//! Donor registration, login and password reset.

use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{AccountStatus, Address, Donor, NewDonor, Notice, NoticeKind, OtpChallenge};
use crate::error::AppError;
use crate::ports::{
    DonationRepository, HashError, OutboxRepository, PasswordHasher, RepositoryError,
};
use crate::services::tokens::{TokenError, TokenIssuer};
use crate::validation::{
    sanitize_string, validate_email, validate_max_len, validate_password, validate_phone,
    validate_username, ValidationError, DESCRIPTION_MAX_LEN, NAME_MAX_LEN,
    NEW_PASSWORD_MIN_LEN, PASSWORD_MIN_LEN,
};

pub const OTP_TTL_MINUTES: i64 = 10;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    MissingFields(&'static str),
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("User already exists")]
    AlreadyExists,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Authentication token is missing")]
    MissingToken,
    #[error("{0}")]
    InvalidToken(#[from] TokenError),
    #[error("User not found")]
    DonorNotFound,
    #[error("Invalid or expired OTP. Please request a new one.")]
    OtpExpired,
    #[error("Invalid OTP.")]
    OtpInvalid,
    #[error("Email does not match the signed-in account.")]
    EmailMismatch,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidCredentials
            | AccountError::MissingToken
            | AccountError::InvalidToken(TokenError::Expired | TokenError::Invalid) => {
                AppError::Unauthorized(err.to_string())
            }
            AccountError::InvalidToken(e @ TokenError::Encoding(_)) => {
                AppError::Internal(e.to_string())
            }
            AccountError::DonorNotFound => AppError::NotFound(err.to_string()),
            AccountError::Validation(e) => AppError::Validation(e),
            AccountError::Hash(e) => AppError::Internal(e.to_string()),
            AccountError::Repository(e) => AppError::Repository(e),
            AccountError::MissingFields(_)
            | AccountError::PasswordMismatch
            | AccountError::AlreadyExists
            | AccountError::OtpExpired
            | AccountError::OtpInvalid => AppError::BadRequest(err.to_string()),
            AccountError::EmailMismatch => AppError::Forbidden(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
    pub user_name: Option<String>,
    #[serde(alias = "Description")]
    pub description: Option<String>,
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordUpdate {
    pub email: Option<String>,
    pub otp: Option<String>,
    pub new_password: Option<String>,
}

fn filled(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(sanitize_string)
        .filter(|v| !v.is_empty())
}

pub struct AccountService {
    repository: Arc<dyn DonationRepository>,
    outbox: Arc<dyn OutboxRepository>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: TokenIssuer,
    frontend_url: String,
}

impl AccountService {
    pub fn new(
        repository: Arc<dyn DonationRepository>,
        outbox: Arc<dyn OutboxRepository>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: TokenIssuer,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            outbox,
            hasher,
            tokens,
            frontend_url: frontend_url.into(),
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub async fn register(&self, input: Registration) -> Result<Donor, AccountError> {
        let required = (
            filled(&input.first_name),
            filled(&input.last_name),
            filled(&input.email),
            filled(&input.phone),
            input.password.clone().filter(|p| !p.is_empty()),
            input.confirm_password.clone().filter(|p| !p.is_empty()),
            filled(&input.user_name),
            filled(&input.description),
        );
        let (
            Some(first_name),
            Some(last_name),
            Some(email),
            Some(phone),
            Some(password),
            Some(confirm_password),
            Some(username),
            Some(description),
        ) = required
        else {
            return Err(AccountError::MissingFields("All fields are required"));
        };

        if password != confirm_password {
            return Err(AccountError::PasswordMismatch);
        }
        validate_password("password", &password, PASSWORD_MIN_LEN)?;
        validate_max_len("firstName", &first_name, NAME_MAX_LEN)?;
        validate_max_len("lastName", &last_name, NAME_MAX_LEN)?;
        validate_email("email", &email)?;
        validate_phone(&phone)?;
        validate_username(&username)?;
        validate_max_len("Description", &description, DESCRIPTION_MAX_LEN)?;

        let new_donor = NewDonor {
            id: Uuid::new_v4(),
            first_name,
            last_name,
            email: email.to_lowercase(),
            phone,
            username,
            description,
            password_hash: self.hasher.hash(&password)?,
            address: input.address,
        };

        let donor = match self.repository.insert_donor(&new_donor).await {
            Ok(donor) => donor,
            Err(RepositoryError::Conflict(_)) => return Err(AccountError::AlreadyExists),
            Err(e) => return Err(e.into()),
        };
        info!(donor_id = %donor.id, "donor registered");

        let welcome = Notice::new(
            donor.email.clone(),
            NoticeKind::Welcome,
            json!({ "firstName": donor.first_name, "frontendUrl": self.frontend_url }),
        );
        if let Err(e) = self.outbox.enqueue(&welcome).await {
            warn!(donor_id = %donor.id, error = %e, "failed to queue welcome notice");
        }

        Ok(donor)
    }

    /// Returns the donor and a freshly issued session token.
    pub async fn login(&self, input: Credentials) -> Result<(Donor, String), AccountError> {
        let (Some(email), Some(password)) =
            (filled(&input.email), input.password.filter(|p| !p.is_empty()))
        else {
            return Err(AccountError::MissingFields("Email and password are required"));
        };

        let credentials = self
            .repository
            .find_credentials_by_email(&email.to_lowercase())
            .await?
            .ok_or(AccountError::InvalidCredentials)?;

        if !self.hasher.verify(&password, &credentials.password_hash)
            || credentials.donor.account_status != AccountStatus::Active
        {
            return Err(AccountError::InvalidCredentials);
        }

        let mut donor = credentials.donor;
        let now = Utc::now();
        self.repository.record_login(donor.id, now).await?;
        donor.last_login_at = Some(now);

        let token = self.tokens.issue(&donor)?;
        info!(donor_id = %donor.id, "donor logged in");
        Ok((donor, token))
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<Donor, AccountError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AccountError::MissingToken)?;
        let claims = self.tokens.verify(token)?;

        self.repository
            .find_donor(claims.sub)
            .await?
            .ok_or(AccountError::DonorNotFound)
    }

    /// Sends a password-update OTP when `email` belongs to `donor`.
    /// Any other address gets the same answer and no mail.
    pub async fn request_password_otp(
        &self,
        donor: &Donor,
        email: Option<String>,
    ) -> Result<(), AccountError> {
        let email = filled(&email).ok_or(AccountError::MissingFields("Email is required."))?;
        if !email.eq_ignore_ascii_case(&donor.email) {
            warn!(donor_id = %donor.id, "password OTP requested for another address");
            return Ok(());
        }

        let otp = OsRng.gen_range(1000..=9999).to_string();
        let challenge = OtpChallenge {
            otp_hash: self.hasher.hash(&otp)?,
            expires_at: Utc::now() + Duration::minutes(OTP_TTL_MINUTES),
        };
        self.repository.set_otp(donor.id, Some(challenge)).await?;

        let notice = Notice::new(
            donor.email.clone(),
            NoticeKind::PasswordOtp,
            json!({ "firstName": donor.first_name, "otp": otp }),
        );
        if let Err(e) = self.outbox.enqueue(&notice).await {
            self.repository.set_otp(donor.id, None).await?;
            return Err(e.into());
        }

        info!(donor_id = %donor.id, "password OTP issued");
        Ok(())
    }

    /// Replaces `donor`'s password. The email in the request must be the
    /// donor's own.
    pub async fn update_password(
        &self,
        donor: &Donor,
        input: PasswordUpdate,
    ) -> Result<(), AccountError> {
        let (Some(email), Some(otp), Some(new_password)) = (
            filled(&input.email),
            filled(&input.otp),
            input.new_password.filter(|p| !p.is_empty()),
        ) else {
            return Err(AccountError::MissingFields(
                "Email, OTP, and new password are required.",
            ));
        };
        validate_password("newPassword", &new_password, NEW_PASSWORD_MIN_LEN)?;
        if !email.eq_ignore_ascii_case(&donor.email) {
            warn!(donor_id = %donor.id, "password update attempted for another address");
            return Err(AccountError::EmailMismatch);
        }

        let credentials = self
            .repository
            .find_credentials_by_email(&donor.email)
            .await?
            .filter(|c| c.donor.id == donor.id)
            .ok_or(AccountError::DonorNotFound)?;
        let donor_id = credentials.donor.id;

        let challenge = match credentials.otp {
            Some(challenge) if challenge.expires_at > Utc::now() => challenge,
            _ => {
                self.repository.set_otp(donor_id, None).await?;
                return Err(AccountError::OtpExpired);
            }
        };

        if !self.hasher.verify(&otp, &challenge.otp_hash) {
            return Err(AccountError::OtpInvalid);
        }

        let password_hash = self.hasher.hash(&new_password)?;
        self.repository
            .update_password(donor_id, &password_hash)
            .await?;
        info!(donor_id = %donor_id, "password updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use axum::response::IntoResponse;

    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, secret: &str) -> Result<String, HashError> {
            Ok(format!("plain${secret}"))
        }

        fn verify(&self, secret: &str, hash: &str) -> bool {
            hash == format!("plain${secret}")
        }
    }

    fn service(store: &MemoryStore) -> AccountService {
        AccountService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(PlainHasher),
            TokenIssuer::new("unit-test-secret-0123456789abcdef", 15),
            "https://donate.example.org",
        )
    }

    fn registration(email: &str, username: &str) -> Registration {
        Registration {
            first_name: Some("Rahim".to_string()),
            last_name: Some("Uddin".to_string()),
            email: Some(email.to_string()),
            phone: Some("01712345678".to_string()),
            password: Some("secret123".to_string()),
            confirm_password: Some("secret123".to_string()),
            user_name: Some(username.to_string()),
            description: Some("Monthly supporter".to_string()),
            address: None,
        }
    }

    fn credentials(email: &str, password: &str) -> Credentials {
        Credentials {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        }
    }

    #[tokio::test]
    async fn register_normalizes_email_and_queues_welcome() {
        let store = MemoryStore::new();
        let accounts = service(&store);

        let donor = accounts
            .register(registration(" Rahim@Example.COM ", "rahim"))
            .await
            .unwrap();
        assert_eq!(donor.email, "rahim@example.com");

        let outbox = store.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].notice.kind, NoticeKind::Welcome);

        let err = accounts
            .register(registration("rahim@example.com", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::AlreadyExists));
    }

    #[tokio::test]
    async fn register_rejects_incomplete_or_mismatched_input() {
        let accounts = service(&MemoryStore::new());

        let mut input = registration("rahim@example.com", "rahim");
        input.description = None;
        assert!(matches!(
            accounts.register(input).await,
            Err(AccountError::MissingFields(_))
        ));

        let mut input = registration("rahim@example.com", "rahim");
        input.confirm_password = Some("different".to_string());
        assert!(matches!(
            accounts.register(input).await,
            Err(AccountError::PasswordMismatch)
        ));

        let mut input = registration("rahim@example.com", "rahim");
        input.phone = Some("12345".to_string());
        assert!(matches!(
            accounts.register(input).await,
            Err(AccountError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn login_issues_token_for_active_donor_only() {
        let store = MemoryStore::new();
        let accounts = service(&store);
        let donor = accounts
            .register(registration("rahim@example.com", "rahim"))
            .await
            .unwrap();

        let (logged_in, token) = accounts
            .login(credentials("RAHIM@example.com", "secret123"))
            .await
            .unwrap();
        assert!(logged_in.last_login_at.is_some());
        assert_eq!(
            accounts.authenticate(Some(&token)).await.unwrap().id,
            donor.id
        );

        assert!(matches!(
            accounts.login(credentials("rahim@example.com", "wrong")).await,
            Err(AccountError::InvalidCredentials)
        ));

        store
            .set_account_status(donor.id, AccountStatus::Suspended)
            .await;
        assert!(matches!(
            accounts
                .login(credentials("rahim@example.com", "secret123"))
                .await,
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn authenticate_requires_a_valid_token() {
        let accounts = service(&MemoryStore::new());

        assert!(matches!(
            accounts.authenticate(None).await,
            Err(AccountError::MissingToken)
        ));
        assert!(matches!(
            accounts.authenticate(Some("  ")).await,
            Err(AccountError::MissingToken)
        ));
        assert!(matches!(
            accounts.authenticate(Some("not-a-jwt")).await,
            Err(AccountError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn otp_resets_password_once() {
        let store = MemoryStore::new();
        let accounts = service(&store);
        let donor = accounts
            .register(registration("rahim@example.com", "rahim"))
            .await
            .unwrap();

        accounts
            .request_password_otp(&donor, Some("rahim@example.com".to_string()))
            .await
            .unwrap();
        let outbox = store.outbox().await;
        let notice = outbox
            .iter()
            .find(|r| r.notice.kind == NoticeKind::PasswordOtp)
            .expect("otp notice");
        let otp = notice.notice.payload["otp"].as_str().unwrap().to_string();
        assert_eq!(otp.len(), 4);

        let update = |otp: &str| PasswordUpdate {
            email: Some("rahim@example.com".to_string()),
            otp: Some(otp.to_string()),
            new_password: Some("new-secret-1".to_string()),
        };
        let wrong = if otp == "1000" { "1001" } else { "1000" };
        assert!(matches!(
            accounts.update_password(&donor, update(wrong)).await,
            Err(AccountError::OtpInvalid)
        ));

        accounts.update_password(&donor, update(&otp)).await.unwrap();
        assert!(accounts
            .login(credentials("rahim@example.com", "new-secret-1"))
            .await
            .is_ok());

        // The challenge is consumed.
        assert!(matches!(
            accounts.update_password(&donor, update(&otp)).await,
            Err(AccountError::OtpExpired)
        ));
    }

    #[tokio::test]
    async fn otp_for_another_address_sends_nothing() {
        let store = MemoryStore::new();
        let accounts = service(&store);
        let donor = accounts
            .register(registration("rahim@example.com", "rahim"))
            .await
            .unwrap();

        accounts
            .request_password_otp(&donor, Some("someone@example.com".to_string()))
            .await
            .unwrap();

        assert!(store
            .outbox()
            .await
            .iter()
            .all(|r| r.notice.kind != NoticeKind::PasswordOtp));
    }

    #[tokio::test]
    async fn cannot_reset_another_donors_password() {
        let store = MemoryStore::new();
        let accounts = service(&store);
        let alice = accounts
            .register(registration("alice@example.com", "alice"))
            .await
            .unwrap();
        let bob = accounts
            .register(registration("bob@example.com", "bobby"))
            .await
            .unwrap();

        accounts
            .request_password_otp(&bob, Some("bob@example.com".to_string()))
            .await
            .unwrap();
        let outbox = store.outbox().await;
        let otp = outbox
            .iter()
            .find(|r| r.notice.kind == NoticeKind::PasswordOtp)
            .and_then(|r| r.notice.payload["otp"].as_str())
            .expect("otp notice")
            .to_string();

        let err = accounts
            .update_password(
                &alice,
                PasswordUpdate {
                    email: Some("BOB@example.com".to_string()),
                    otp: Some(otp),
                    new_password: Some("taken-over-1".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::EmailMismatch));
        assert_eq!(
            AppError::from(err).into_response().status(),
            axum::http::StatusCode::FORBIDDEN
        );

        assert!(accounts
            .login(credentials("bob@example.com", "secret123"))
            .await
            .is_ok());
        assert!(accounts
            .login(credentials("bob@example.com", "taken-over-1"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn expired_otp_is_cleared() {
        let store = MemoryStore::new();
        let accounts = service(&store);
        let donor = accounts
            .register(registration("rahim@example.com", "rahim"))
            .await
            .unwrap();
        store
            .set_otp(
                donor.id,
                Some(OtpChallenge {
                    otp_hash: PlainHasher.hash("1234").unwrap(),
                    expires_at: Utc::now() - Duration::minutes(1),
                }),
            )
            .await
            .unwrap();

        let err = accounts
            .update_password(&donor, PasswordUpdate {
                email: Some("rahim@example.com".to_string()),
                otp: Some("1234".to_string()),
                new_password: Some("new-secret-1".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::OtpExpired));

        let credentials = store
            .find_credentials_by_email("rahim@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(credentials.otp.is_none());
    }
}
