use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::ports::RepositoryError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadGateway(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Server-side details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Repository(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }

        let body = Json(json!({
            "success": false,
            "error": self.public_message(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// How a payment failure is surfaced to whoever triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent something unusable; answered with a 4xx.
    CallerInput,
    /// Well-formed but refused; acknowledged and never applied.
    PolicyRejection,
    /// Infrastructure trouble; the caller may retry.
    Transient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Why a gateway notification was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingFields(Vec<&'static str>),
    NotConfirmed(String),
    Mismatch {
        field: &'static str,
        claimed: String,
        confirmed: String,
    },
    InvalidPayerContact,
    /// The gateway confirmed a different amount than the one recorded at initiation.
    LedgerMismatch { recorded: String, confirmed: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingFields(fields) => {
                write!(f, "missing fields: {}", fields.join(", "))
            }
            Rejection::NotConfirmed(status) => {
                write!(f, "gateway reports status '{status}'")
            }
            Rejection::Mismatch {
                field,
                claimed,
                confirmed,
            } => write!(
                f,
                "{field} mismatch: notification claims '{claimed}', gateway confirms '{confirmed}'"
            ),
            Rejection::InvalidPayerContact => f.write_str("payer contact missing or malformed"),
            Rejection::LedgerMismatch {
                recorded,
                confirmed,
            } => write!(
                f,
                "gateway confirms {confirmed} but the transaction was initiated for {recorded}"
            ),
        }
    }
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Please provide a valid donation amount: {0}")]
    InvalidAmount(String),

    #[error("Donor profile is incomplete: {0}")]
    InvalidDonorProfile(String),

    #[error("Payment initiation failed: {0}")]
    GatewayInitiationFailed(String),

    #[error("Notification rejected: {0}")]
    Rejected(Rejection),

    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(#[from] GatewayError),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::InvalidAmount(_) | PaymentError::InvalidDonorProfile(_) => {
                ErrorKind::CallerInput
            }
            PaymentError::Rejected(_) => ErrorKind::PolicyRejection,
            PaymentError::GatewayInitiationFailed(_)
            | PaymentError::GatewayUnavailable(_)
            | PaymentError::Persistence(_) => ErrorKind::Transient,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            // Disagreement with the gateway points at tampering.
            PaymentError::Rejected(Rejection::Mismatch { .. })
            | PaymentError::Rejected(Rejection::LedgerMismatch { .. }) => Severity::Error,
            PaymentError::Rejected(_)
            | PaymentError::InvalidAmount(_)
            | PaymentError::InvalidDonorProfile(_) => Severity::Warning,
            PaymentError::GatewayInitiationFailed(_)
            | PaymentError::GatewayUnavailable(_)
            | PaymentError::Persistence(_) => Severity::Error,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidAmount(_) => {
                AppError::BadRequest("Please provide a valid donation amount.".to_string())
            }
            PaymentError::InvalidDonorProfile(reason) => AppError::BadRequest(reason),
            PaymentError::GatewayInitiationFailed(_) | PaymentError::GatewayUnavailable(_) => {
                AppError::BadGateway(
                    "Payment initiation failed. Please try again later.".to_string(),
                )
            }
            PaymentError::Rejected(rejection) => AppError::BadRequest(rejection.to_string()),
            PaymentError::Persistence(e) => AppError::Repository(e),
        }
    }
}
