pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod doc;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::handlers::{contact, payment, users};
use crate::middleware::{request_logger, IpFilterLayer, RequestLogSettings};
use crate::ports::{DonationRepository, OutboxRepository, PasswordHasher, PaymentGateway};
use crate::services::{
    AccountService, ContactService, NotificationValidator, OutcomeResolver, SessionInitiator,
    TokenIssuer, TransactionReconciler,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repository: Arc<dyn DonationRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub initiator: Arc<SessionInitiator>,
    pub validator: Arc<NotificationValidator>,
    pub reconciler: Arc<TransactionReconciler>,
    pub outcomes: Arc<OutcomeResolver>,
    pub accounts: Arc<AccountService>,
    pub contact: Arc<ContactService>,
    pub start_time: Instant,
}

impl AppState {
    /// Wires every service from the configuration and the given adapters.
    pub fn new(
        config: Config,
        repository: Arc<dyn DonationRepository>,
        outbox: Arc<dyn OutboxRepository>,
        gateway: Arc<dyn PaymentGateway>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        let tokens = TokenIssuer::new(&config.jwt_secret, config.jwt_ttl_days);

        Self {
            initiator: Arc::new(SessionInitiator::new(
                repository.clone(),
                gateway.clone(),
                config.callbacks.clone(),
            )),
            validator: Arc::new(NotificationValidator::new(gateway.clone())),
            reconciler: Arc::new(TransactionReconciler::new(repository.clone())),
            outcomes: Arc::new(OutcomeResolver::new(repository.clone(), config.pages.clone())),
            accounts: Arc::new(AccountService::new(
                repository.clone(),
                outbox.clone(),
                hasher,
                tokens,
                config.frontend_url.as_str(),
            )),
            contact: Arc::new(ContactService::new(outbox, config.admin_email.clone())),
            config: Arc::new(config),
            repository,
            gateway,
            start_time: Instant::now(),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    let ipn_routes = Router::new()
        .route("/ipn", post(payment::ipn).get(payment::ipn))
        .route_layer(IpFilterLayer::new(
            config.ipn_allowed_ips.clone(),
            config.trusted_proxy_depth,
        ));

    let payment_routes = Router::new()
        .route("/initiate", post(payment::initiate))
        .route("/success", get(payment::success).post(payment::success))
        .route("/fail", get(payment::fail).post(payment::fail))
        .route("/cancel", get(payment::cancel).post(payment::cancel))
        .merge(ipn_routes);

    let user_routes = Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/logout", post(users::logout))
        .route("/getMe", get(users::get_me))
        .route(
            "/requestPasswordUpdateOtp",
            post(users::request_password_update_otp),
        )
        .route("/updatePassword", axum::routing::patch(users::update_password));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(doc::openapi_json))
        .nest("/api/payment", payment_routes)
        .nest("/api/user", user_routes)
        .route("/api/contact/sendMessage", post(contact::send_message))
        .layer(axum::middleware::from_fn_with_state(
            RequestLogSettings {
                log_body: config.log_request_body,
            },
            request_logger,
        ))
        .layer(cors_layer(&config))
        .with_state(state)
}

/// Credentialed CORS for the frontend origin only.
fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60));

    match HeaderValue::from_str(&config.frontend_url.origin().ascii_serialization()) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!(error = %e, "FRONTEND_URL origin is not a valid header value, CORS disabled");
            cors
        }
    }
}
