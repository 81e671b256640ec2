use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::domain::Donor;
use crate::error::AppError;
use crate::AppState;

pub const TOKEN_COOKIE: &str = "token";

/// The donor behind the session token, taken from the `token` cookie or an
/// `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct CurrentDonor(pub Donor);

#[async_trait]
impl FromRequestParts<AppState> for CurrentDonor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = cookie(&parts.headers, TOKEN_COOKIE).or_else(|| bearer(&parts.headers));
        let donor = state.accounts.authenticate(token.as_deref()).await?;
        Ok(CurrentDonor(donor))
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
