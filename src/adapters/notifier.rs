//! Outbound mail delivery.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::time::Duration;
use tracing::info;

use crate::config::MailRelayConfig;
use crate::ports::{Mail, NotifyError, Notifier};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Posts rendered mail as JSON to an HTTP mail relay. The body is signed
/// with HMAC-SHA256 so the relay can reject forged requests.
#[derive(Clone)]
pub struct MailRelayNotifier {
    client: Client,
    url: String,
    secret: String,
}

impl MailRelayNotifier {
    pub fn new(config: &MailRelayConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: config.url.clone(),
            secret: config.secret.clone(),
        }
    }

    pub fn sign(secret: &str, body: &[u8]) -> Result<String, NotifyError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotifyError::Delivery(format!("invalid relay secret: {e}")))?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    async fn notify(&self, mail: &Mail) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(mail).map_err(|e| NotifyError::Delivery(e.to_string()))?;
        let signature = Self::sign(&self.secret, &body)?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Writes mail to the log instead of sending it. Used when no relay is
/// configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, mail: &Mail) -> Result<(), NotifyError> {
        info!(to = %mail.to, subject = %mail.subject, "mail relay not configured, notice logged");
        Ok(())
    }
}
