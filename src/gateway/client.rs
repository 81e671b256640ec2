use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use super::{GatewayError, GatewaySession, SessionRequest, VerifiedPayment};
use crate::config::GatewayConfig;
use crate::ports::PaymentGateway;

const SESSION_PATH: &str = "gwprocess/v4/api.php";
const VALIDATION_PATH: &str = "validator/api/validationserverAPI.php";

/// Response from the session endpoint. Only the fields we act on.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    status: Option<String>,
    #[serde(rename = "failedreason")]
    failed_reason: Option<String>,
    #[serde(rename = "sessionkey")]
    session_key: Option<String>,
    #[serde(rename = "GatewayPageURL")]
    gateway_page_url: Option<String>,
}

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

/// HTTP client for the SSLCommerz session and validation APIs.
#[derive(Clone)]
pub struct SslCommerzClient {
    client: Client,
    config: GatewayConfig,
    circuit_breaker: Breaker,
}

impl SslCommerzClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_circuit_breaker(config, 3, 60)
    }

    /// Creates a client with a custom circuit breaker configuration
    pub fn with_circuit_breaker(
        config: GatewayConfig,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            config,
            circuit_breaker,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match self.circuit_breaker.call(call).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "SSLCommerz circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl PaymentGateway for SslCommerzClient {
    async fn create_session(&self, request: &SessionRequest) -> Result<GatewaySession, GatewayError> {
        let mut form = request.form_fields();
        form.push(("store_id", self.config.store_id.clone()));
        form.push(("store_passwd", self.config.store_password.clone()));

        let url = self.endpoint(SESSION_PATH);
        let client = self.client.clone();

        let response: SessionResponse = self
            .guarded(async move {
                let response = client.post(&url).form(&form).send().await?;
                if !response.status().is_success() {
                    return Err(GatewayError::UnexpectedStatus(response.status().as_u16()));
                }
                Ok(response.json::<SessionResponse>().await?)
            })
            .await?;

        let succeeded = response
            .status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("SUCCESS"))
            .unwrap_or(false);

        match response.gateway_page_url {
            Some(redirect_url) if succeeded && !redirect_url.trim().is_empty() => Ok(GatewaySession {
                redirect_url,
                session_key: response.session_key,
            }),
            _ => Err(GatewayError::SessionRejected(
                response
                    .failed_reason
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "no gateway page URL returned".to_string()),
            )),
        }
    }

    async fn verify(&self, validation_id: &str) -> Result<VerifiedPayment, GatewayError> {
        let url = self.endpoint(VALIDATION_PATH);
        let client = self.client.clone();
        let query = [
            ("val_id", validation_id.to_string()),
            ("store_id", self.config.store_id.clone()),
            ("store_passwd", self.config.store_password.clone()),
            ("v", "1".to_string()),
            ("format", "json".to_string()),
        ];

        let record: serde_json::Value = self
            .guarded(async move {
                let response = client.get(&url).query(&query).send().await?;
                if !response.status().is_success() {
                    return Err(GatewayError::UnexpectedStatus(response.status().as_u16()));
                }
                Ok(response.json::<serde_json::Value>().await?)
            })
            .await?;

        VerifiedPayment::from_record(record)
    }

    fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }
}
