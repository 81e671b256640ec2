use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{DonationTransaction, Donor};
use crate::error::AppError;
use crate::middleware::{auth::TOKEN_COOKIE, CurrentDonor};
use crate::services::accounts::{Credentials, PasswordUpdate, Registration};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub message: String,
    pub user: Donor,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub message: String,
    pub user: Donor,
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub message: String,
    pub user: Donor,
    pub transactions: Vec<DonationTransaction>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OtpRequest {
    pub email: Option<String>,
}

/// Builds the `Set-Cookie` value carrying the session token. An empty token
/// with `max_age_secs == 0` clears the cookie.
fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let same_site = if secure { "SameSite=None; Secure" } else { "SameSite=Lax" };
    format!("{TOKEN_COOKIE}={token}; Path=/; HttpOnly; Max-Age={max_age_secs}; {same_site}")
}

#[utoipa::path(
    post,
    path = "/api/user/register",
    request_body = Registration,
    responses(
        (status = 201, description = "Donor registered", body = UserResponse),
        (status = 400, description = "Missing or invalid fields, or duplicate account")
    ),
    tag = "User"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<Registration>,
) -> Result<impl IntoResponse, AppError> {
    let donor = state.accounts.register(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User created successfully".to_string(),
            user: donor,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/user/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "Session issued; token also set as cookie", body = LoginResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "User"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    let (donor, token) = state.accounts.login(input).await?;
    let cookie = session_cookie(
        &token,
        state.accounts.tokens().ttl().num_seconds(),
        state.config.cookie_secure,
    );

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            message: "Login successful".to_string(),
            user: donor,
            token,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/user/logout",
    responses(
        (status = 200, description = "Session cookie cleared", body = MessageResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("token" = [])),
    tag = "User"
)]
pub async fn logout(
    State(state): State<AppState>,
    CurrentDonor(donor): CurrentDonor,
) -> impl IntoResponse {
    tracing::info!(donor_id = %donor.id, "donor logged out");
    (
        [(header::SET_COOKIE, session_cookie("", 0, state.config.cookie_secure))],
        MessageResponse::ok("Logout successful"),
    )
}

#[utoipa::path(
    get,
    path = "/api/user/getMe",
    responses(
        (status = 200, description = "Profile and donation history", body = ProfileResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Donor no longer exists")
    ),
    security(("token" = [])),
    tag = "User"
)]
pub async fn get_me(
    State(state): State<AppState>,
    CurrentDonor(donor): CurrentDonor,
) -> Result<Json<ProfileResponse>, AppError> {
    let transactions = state.repository.donor_transactions(donor.id).await?;

    Ok(Json(ProfileResponse {
        message: "User found".to_string(),
        user: donor,
        transactions,
    }))
}

#[utoipa::path(
    post,
    path = "/api/user/requestPasswordUpdateOtp",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "OTP sent if the address matches", body = MessageResponse),
        (status = 400, description = "Email missing"),
        (status = 401, description = "Not authenticated")
    ),
    security(("token" = [])),
    tag = "User"
)]
pub async fn request_password_update_otp(
    State(state): State<AppState>,
    CurrentDonor(donor): CurrentDonor,
    Json(input): Json<OtpRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .accounts
        .request_password_otp(&donor, input.email)
        .await?;

    Ok(MessageResponse::ok(
        "If an account with that email exists, an OTP has been sent.",
    ))
}

#[utoipa::path(
    patch,
    path = "/api/user/updatePassword",
    request_body = PasswordUpdate,
    responses(
        (status = 200, description = "Password replaced", body = MessageResponse),
        (status = 400, description = "Missing fields, weak password, or bad OTP"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Email belongs to another account")
    ),
    security(("token" = [])),
    tag = "User"
)]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentDonor(donor): CurrentDonor,
    Json(input): Json<PasswordUpdate>,
) -> Result<Json<MessageResponse>, AppError> {
    state.accounts.update_password(&donor, input).await?;
    Ok(MessageResponse::ok("Password updated successfully."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_http_only() {
        let cookie = session_cookie("abc", 3600, false);
        assert_eq!(cookie, "token=abc; Path=/; HttpOnly; Max-Age=3600; SameSite=Lax");
    }

    #[test]
    fn secure_cookie_allows_cross_site() {
        let cookie = session_cookie("", 0, true);
        assert!(cookie.starts_with("token=; "));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.ends_with("SameSite=None; Secure"));
    }
}
