#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use donation_core::adapters::MemoryStore;
use donation_core::config::Config;
use donation_core::domain::{Donor, NewDonor};
use donation_core::gateway::{GatewayError, GatewaySession, SessionRequest, VerifiedPayment};
use donation_core::ports::{DonationRepository, HashError, PasswordHasher, PaymentGateway};
use donation_core::AppState;

pub const FRONTEND: &str = "https://donate.example.org";

/// Scriptable gateway: hands out a fixed redirect and answers validation
/// requests from a table keyed by validation id.
#[derive(Default)]
pub struct StubGateway {
    pub refuse_sessions: Mutex<bool>,
    pub unreachable: Mutex<bool>,
    pub sessions: Mutex<Vec<SessionRequest>>,
    pub validations: Mutex<HashMap<String, Value>>,
    pub verify_calls: Mutex<usize>,
}

impl StubGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers what the validation API answers for `val_id`.
    pub fn confirm(&self, val_id: &str, tran_id: &str, amount: &str, email: &str) {
        self.validations.lock().unwrap().insert(
            val_id.to_string(),
            json!({
                "status": "VALID",
                "tran_id": tran_id,
                "val_id": val_id,
                "amount": amount,
                "currency": "BDT",
                "cus_email": email,
                "card_type": "BKASH-BKash",
                "bank_tran_id": format!("BANK-{val_id}"),
            }),
        );
    }

    pub fn answer(&self, val_id: &str, record: Value) {
        self.validations
            .lock()
            .unwrap()
            .insert(val_id.to_string(), record);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    pub fn verify_calls(&self) -> usize {
        *self.verify_calls.lock().unwrap()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<GatewaySession, GatewayError> {
        if *self.unreachable.lock().unwrap() {
            return Err(GatewayError::UnexpectedStatus(503));
        }
        if *self.refuse_sessions.lock().unwrap() {
            return Err(GatewayError::SessionRejected("Store Credential Error".to_string()));
        }
        self.sessions.lock().unwrap().push(request.clone());
        Ok(GatewaySession {
            redirect_url: format!(
                "https://sandbox.sslcommerz.com/EasyCheckOut/{}",
                request.transaction_id
            ),
            session_key: Some("SESSIONKEY".to_string()),
        })
    }

    async fn verify(&self, validation_id: &str) -> Result<VerifiedPayment, GatewayError> {
        *self.verify_calls.lock().unwrap() += 1;
        if *self.unreachable.lock().unwrap() {
            return Err(GatewayError::UnexpectedStatus(503));
        }
        let record = self
            .validations
            .lock()
            .unwrap()
            .get(validation_id)
            .cloned()
            .unwrap_or_else(|| json!({ "status": "INVALID_TRANSACTION" }));
        VerifiedPayment::from_record(record)
    }
}

/// Cheap reversible "hash" so API tests do not pay for argon2.
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, secret: &str) -> Result<String, HashError> {
        Ok(format!("plain${secret}"))
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        hash == format!("plain${secret}")
    }
}

pub fn test_config() -> Config {
    test_config_with(&[])
}

pub fn test_config_with(overrides: &[(&'static str, &'static str)]) -> Config {
    let mut env = HashMap::from([
        ("DATABASE_URL", "postgres://unused/unused"),
        ("SSL_STORE_ID", "testbox"),
        ("SSL_STORE_PASSWORD", "qwerty"),
        ("BACKEND_URL", "https://api.donate.example.org"),
        ("FRONTEND_URL", FRONTEND),
        ("ADMIN_EMAIL", "admin@donate.example.org"),
        ("JWT_SECRET", "integration-test-secret-0123456789"),
    ]);
    env.extend(overrides.iter().copied());
    Config::from_lookup(|key| env.get(key).map(|v| v.to_string())).expect("test config")
}

pub struct TestContext {
    pub store: MemoryStore,
    pub gateway: Arc<StubGateway>,
    pub state: AppState,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = MemoryStore::new();
        let gateway = StubGateway::new();
        let state = AppState::new(
            config,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            gateway.clone(),
            Arc::new(PlainHasher),
        );
        Self {
            store,
            gateway,
            state,
        }
    }

    pub async fn donor(&self, email: &str) -> Donor {
        let local = email.split('@').next().unwrap_or("donor");
        self.store
            .insert_donor(&NewDonor {
                id: Uuid::new_v4(),
                first_name: "Rahim".to_string(),
                last_name: "Uddin".to_string(),
                email: email.to_string(),
                phone: "01712345678".to_string(),
                username: local.to_string(),
                description: "Monthly supporter".to_string(),
                password_hash: PlainHasher.hash("secret123").unwrap(),
                address: None,
            })
            .await
            .expect("insert donor")
    }

    pub async fn donated(&self, donor: &Donor) -> BigDecimal {
        self.store
            .find_donor(donor.id)
            .await
            .unwrap()
            .expect("donor exists")
            .donated_amount
    }
}

pub fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).expect("decimal")
}
