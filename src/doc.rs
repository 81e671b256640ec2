//! OpenAPI document for the HTTP surface, served as JSON at
//! `/api-docs/openapi.json`.

use axum::Json;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::{AccountStatus, Address, DonationTransaction, Donor, Role, TransactionStatus};
use crate::handlers::payment::{InitiateRequest, InitiateResponse, RedirectParams};
use crate::handlers::users::{
    LoginResponse, MessageResponse, OtpRequest, ProfileResponse, UserResponse,
};
use crate::health::HealthResponse;
use crate::services::accounts::{Credentials, PasswordUpdate, Registration};
use crate::services::contact::ContactMessage;
use crate::services::notification::IpnPayload;

/// Registers the session cookie set by the login endpoint.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "token",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "token",
                "Session token issued by POST /api/user/login. An Authorization: Bearer header is accepted too.",
            ))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Donation platform API",
        description = "Donor accounts, contact form and SSLCommerz donation payments."
    ),
    paths(
        crate::handlers::payment::initiate,
        crate::handlers::payment::ipn,
        crate::handlers::payment::success,
        crate::handlers::payment::fail,
        crate::handlers::payment::cancel,
        crate::handlers::users::register,
        crate::handlers::users::login,
        crate::handlers::users::logout,
        crate::handlers::users::get_me,
        crate::handlers::users::request_password_update_otp,
        crate::handlers::users::update_password,
        crate::handlers::contact::send_message,
        crate::handlers::health,
    ),
    components(schemas(
        Donor,
        Address,
        Role,
        AccountStatus,
        DonationTransaction,
        TransactionStatus,
        InitiateRequest,
        InitiateResponse,
        IpnPayload,
        RedirectParams,
        Registration,
        Credentials,
        PasswordUpdate,
        OtpRequest,
        ContactMessage,
        UserResponse,
        LoginResponse,
        ProfileResponse,
        MessageResponse,
        HealthResponse,
    )),
    tags(
        (name = "Payment", description = "Donation checkout and gateway callbacks"),
        (name = "User", description = "Donor registration and sessions"),
        (name = "Contact", description = "Contact form"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::openapi::schema::Schema;
    use utoipa::openapi::RefOr;

    #[test]
    fn documents_payment_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/payment/initiate",
            "/api/payment/ipn",
            "/api/payment/success",
            "/api/user/login",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn donor_schema_exposes_donated_amount() {
        let doc = ApiDoc::openapi();
        let schemas = &doc.components.as_ref().expect("components").schemas;
        match schemas.get("Donor").expect("Donor schema") {
            RefOr::T(Schema::Object(obj)) => {
                assert!(obj.properties.contains_key("donatedAmount"));
                assert!(!obj.properties.contains_key("passwordHash"));
            }
            _ => panic!("expected Object schema"),
        }
    }

    #[test]
    fn cookie_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("token"));
    }
}
