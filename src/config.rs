use anyhow::{Context, Result};
use dotenvy::dotenv;
use ipnet::IpNet;
use std::env;
use std::fmt;
use std::net::IpAddr;
use url::Url;

use crate::validation::is_valid_email;

pub const SANDBOX_GATEWAY_URL: &str = "https://sandbox.sslcommerz.com";
pub const LIVE_GATEWAY_URL: &str = "https://securepay.sslcommerz.com";

const REQUIRED_VARS: &[&str] = &[
    "DATABASE_URL",
    "SSL_STORE_ID",
    "SSL_STORE_PASSWORD",
    "BACKEND_URL",
    "FRONTEND_URL",
    "ADMIN_EMAIL",
    "JWT_SECRET",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedIps {
    Any,
    Cidrs(Vec<IpNet>),
}

impl AllowedIps {
    pub fn permits(&self, ip: Option<IpAddr>) -> bool {
        match self {
            AllowedIps::Any => true,
            AllowedIps::Cidrs(cidrs) => {
                ip.map_or(false, |ip| cidrs.iter().any(|cidr| cidr.contains(&ip)))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub store_id: String,
    pub store_password: String,
    pub base_url: String,
    pub is_live: bool,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("store_id", &self.store_id)
            .field("store_password", &"****")
            .field("base_url", &self.base_url)
            .field("is_live", &self.is_live)
            .finish()
    }
}

/// Merchant-side URLs the gateway calls back into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackUrls {
    pub success: Url,
    pub fail: Url,
    pub cancel: Url,
    pub ipn: Url,
}

impl CallbackUrls {
    pub fn from_backend(backend: &Url) -> Result<Self> {
        Ok(Self {
            success: join(backend, "api/payment/success")?,
            fail: join(backend, "api/payment/fail")?,
            cancel: join(backend, "api/payment/cancel")?,
            ipn: join(backend, "api/payment/ipn")?,
        })
    }

    pub fn success_for(&self, transaction_id: &str) -> String {
        let mut url = self.success.clone();
        url.query_pairs_mut().append_pair("tran_id", transaction_id);
        url.to_string()
    }
}

/// Frontend pages the browser is redirected to after payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendPages {
    pub success: Url,
    pub fail: Url,
    pub cancel: Url,
    pub error: Url,
}

impl FrontendPages {
    pub fn from_frontend(frontend: &Url) -> Result<Self> {
        Ok(Self {
            success: join(frontend, "HTML/payment-success.html")?,
            fail: join(frontend, "HTML/payment-fail.html")?,
            cancel: join(frontend, "HTML/payment-cancel.html")?,
            error: join(frontend, "HTML/payment-error.html")?,
        })
    }

    pub fn with_transaction(page: &Url, transaction_id: Option<&str>) -> Url {
        let mut url = page.clone();
        if let Some(id) = transaction_id {
            url.query_pairs_mut().append_pair("tran_id", id);
        }
        url
    }
}

#[derive(Clone)]
pub struct MailRelayConfig {
    pub url: String,
    pub secret: String,
}

impl fmt::Debug for MailRelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailRelayConfig")
            .field("url", &self.url)
            .field("secret", &"****")
            .finish()
    }
}

#[derive(Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub gateway: GatewayConfig,
    pub backend_url: Url,
    pub frontend_url: Url,
    pub callbacks: CallbackUrls,
    pub pages: FrontendPages,
    pub admin_email: String,
    pub jwt_secret: String,
    pub jwt_ttl_days: i64,
    pub cookie_secure: bool,
    pub ipn_allowed_ips: AllowedIps,
    pub trusted_proxy_depth: usize,
    pub mail_relay: Option<MailRelayConfig>,
    pub mail_from_name: String,
    pub outbox_poll_secs: u64,
    pub log_format: LogFormat,
    pub log_request_body: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_port", &self.server_port)
            .field("gateway", &self.gateway)
            .field("backend_url", &self.backend_url.as_str())
            .field("frontend_url", &self.frontend_url.as_str())
            .field("admin_email", &self.admin_email)
            .field("jwt_ttl_days", &self.jwt_ttl_days)
            .field("ipn_allowed_ips", &self.ipn_allowed_ips)
            .field("mail_relay", &self.mail_relay)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Every missing
    /// required key is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|key| get(key).is_none())
            .collect();
        if !missing.is_empty() {
            anyhow::bail!(
                "Missing required environment variables: {}",
                missing.join(", ")
            );
        }
        let required = |key: &str| get(key).with_context(|| format!("{key} is required"));

        let is_live = parse_bool(get("SSL_IS_LIVE").as_deref(), false).context("SSL_IS_LIVE")?;
        let gateway = GatewayConfig {
            store_id: required("SSL_STORE_ID")?,
            store_password: required("SSL_STORE_PASSWORD")?,
            base_url: get("SSL_GATEWAY_URL").unwrap_or_else(|| {
                if is_live { LIVE_GATEWAY_URL } else { SANDBOX_GATEWAY_URL }.to_string()
            }),
            is_live,
        };
        parse_base_url(&gateway.base_url).context("SSL_GATEWAY_URL is not a valid URL")?;

        let backend_url =
            parse_base_url(&required("BACKEND_URL")?).context("BACKEND_URL is not a valid URL")?;
        let frontend_url = parse_base_url(&required("FRONTEND_URL")?)
            .context("FRONTEND_URL is not a valid URL")?;

        let admin_email = required("ADMIN_EMAIL")?;
        if !is_valid_email(&admin_email) {
            anyhow::bail!("ADMIN_EMAIL is not a valid email address");
        }

        let mail_relay = match (get("MAIL_RELAY_URL"), get("MAIL_RELAY_SECRET")) {
            (Some(url), Some(secret)) => {
                Url::parse(&url).context("MAIL_RELAY_URL is not a valid URL")?;
                Some(MailRelayConfig { url, secret })
            }
            (None, None) => None,
            _ => anyhow::bail!("MAIL_RELAY_URL and MAIL_RELAY_SECRET must be set together"),
        };

        Ok(Config {
            server_port: get("SERVER_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .context("SERVER_PORT must be a port number")?,
            database_url: required("DATABASE_URL")?,
            gateway,
            callbacks: CallbackUrls::from_backend(&backend_url)?,
            pages: FrontendPages::from_frontend(&frontend_url)?,
            backend_url,
            frontend_url,
            admin_email,
            jwt_secret: required("JWT_SECRET")?,
            jwt_ttl_days: get("JWT_TTL_DAYS")
                .unwrap_or_else(|| "15".to_string())
                .parse()
                .context("JWT_TTL_DAYS must be an integer")?,
            cookie_secure: parse_bool(get("COOKIE_SECURE").as_deref(), false)
                .context("COOKIE_SECURE")?,
            ipn_allowed_ips: parse_allowed_ips(
                &get("IPN_ALLOWED_IPS").unwrap_or_else(|| "*".to_string()),
            )?,
            trusted_proxy_depth: get("TRUSTED_PROXY_DEPTH")
                .unwrap_or_else(|| "0".to_string())
                .parse()
                .context("TRUSTED_PROXY_DEPTH must be a non-negative integer")?,
            mail_relay,
            mail_from_name: get("MAIL_FROM_NAME").unwrap_or_else(|| "FundRaiser".to_string()),
            outbox_poll_secs: get("OUTBOX_POLL_SECS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .context("OUTBOX_POLL_SECS must be an integer")?,
            log_format: match get("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            log_request_body: parse_bool(get("LOG_REQUEST_BODY").as_deref(), false)
                .context("LOG_REQUEST_BODY")?,
        })
    }
}

pub fn parse_allowed_ips(raw: &str) -> Result<AllowedIps> {
    let value = raw.trim();
    if value == "*" {
        return Ok(AllowedIps::Any);
    }

    let cidrs = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse::<IpNet>)
        .collect::<Result<Vec<_>, _>>()?;

    if cidrs.is_empty() {
        anyhow::bail!("IPN_ALLOWED_IPS must be '*' or a comma-separated list of CIDRs");
    }

    Ok(AllowedIps::Cidrs(cidrs))
}

fn parse_bool(raw: Option<&str>, default: bool) -> Result<bool> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => anyhow::bail!("expected a boolean, got '{other}'"),
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        anyhow::bail!("'{raw}' must be an absolute http(s) URL");
    }
    Ok(url)
}

fn join(base: &Url, path: &str) -> Result<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("{base} cannot be used as a base URL"))?
        .pop_if_empty()
        .extend(path.split('/'));
    Ok(url)
}
