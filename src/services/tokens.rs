use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Donor, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Expired token")]
    Expired,
    #[error("Invalid authentication token")]
    Invalid,
    #[error("token encoding failed: {0}")]
    Encoding(jsonwebtoken::errors::Error),
}

/// Issues and checks HS256 session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, donor: &Donor) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: donor.id,
            role: donor.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding).map_err(TokenError::Encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountStatus;
    use bigdecimal::BigDecimal;

    fn donor() -> Donor {
        Donor {
            id: Uuid::new_v4(),
            first_name: "Karim".to_string(),
            last_name: "Ahmed".to_string(),
            email: "karim@example.com".to_string(),
            phone: "01812345678".to_string(),
            username: "karim".to_string(),
            description: "regular donor".to_string(),
            role: Role::User,
            account_status: AccountStatus::Active,
            donated_amount: BigDecimal::from(0),
            address: None,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_verifies() {
        let issuer = TokenIssuer::new("secret", 15);
        let donor = donor();

        let claims = issuer
            .verify(&issuer.issue(&donor).expect("token"))
            .expect("valid token");
        assert_eq!(claims.sub, donor.id);
        assert_eq!(claims.role, Role::User);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_token_signed_with_another_secret() {
        let token = TokenIssuer::new("one", 15).issue(&donor()).expect("token");
        assert!(matches!(
            TokenIssuer::new("two", 15).verify(&token),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn reports_expired_tokens() {
        let token = TokenIssuer::new("secret", -1).issue(&donor()).expect("token");
        assert!(matches!(
            TokenIssuer::new("secret", 15).verify(&token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn rejects_garbage() {
        let issuer = TokenIssuer::new("secret", 15);
        assert!(matches!(issuer.verify("not-a-jwt"), Err(TokenError::Invalid)));
    }
}
