//! Donation payment endpoints: session initiation, gateway notifications and
//! the browser redirects back from the hosted checkout page.

use axum::{
    extract::{Form, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, ErrorKind, Severity};
use crate::middleware::CurrentDonor;
use crate::services::{parse_donation_amount, IpnPayload};
use crate::AppState;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct InitiateRequest {
    #[schema(value_type = f64, example = 500.0)]
    pub amount: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub success: bool,
    pub message: String,
    pub gateway_url: String,
    pub transaction_id: String,
}

/// Fields the gateway sends along with a browser redirect.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct RedirectParams {
    pub tran_id: Option<String>,
    pub error: Option<String>,
}

impl RedirectParams {
    fn or(self, other: RedirectParams) -> RedirectParams {
        RedirectParams {
            tran_id: self.tran_id.or(other.tran_id),
            error: self.error.or(other.error),
        }
    }
}

fn merge_ipn(body: IpnPayload, query: IpnPayload) -> IpnPayload {
    IpnPayload {
        tran_id: body.tran_id.or(query.tran_id),
        amount: body.amount.or(query.amount),
        val_id: body.val_id.or(query.val_id),
        status: body.status.or(query.status),
        cus_email: body.cus_email.or(query.cus_email),
    }
}

#[utoipa::path(
    post,
    path = "/api/payment/initiate",
    request_body = InitiateRequest,
    responses(
        (status = 200, description = "Gateway session created", body = InitiateResponse),
        (status = 400, description = "Invalid amount or incomplete profile"),
        (status = 401, description = "Not authenticated"),
        (status = 502, description = "Gateway refused or unreachable")
    ),
    security(("token" = [])),
    tag = "Payment"
)]
pub async fn initiate(
    State(state): State<AppState>,
    CurrentDonor(donor): CurrentDonor,
    body: Option<Json<InitiateRequest>>,
) -> Result<Json<InitiateResponse>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let amount = parse_donation_amount(request.amount.as_ref())?;

    let session = state.initiator.initiate(&donor, &amount).await?;

    Ok(Json(InitiateResponse {
        success: true,
        message: "Redirecting to SSLCommerz gateway...".to_string(),
        gateway_url: session.redirect_url,
        transaction_id: session.transaction_id,
    }))
}

/// Gateway notification. The answer is always plain text: 2xx stops the
/// gateway from retrying, 5xx asks it to try again later.
#[utoipa::path(
    post,
    path = "/api/payment/ipn",
    request_body(content = IpnPayload, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Notification handled or rejected", body = String),
        (status = 403, description = "Caller address not allowed"),
        (status = 500, description = "Transient failure, retry later", body = String)
    ),
    tag = "Payment"
)]
pub async fn ipn(
    State(state): State<AppState>,
    query: Option<Query<IpnPayload>>,
    body: Option<Form<IpnPayload>>,
) -> Response {
    let payload = merge_ipn(
        body.map(|Form(p)| p).unwrap_or_default(),
        query.map(|Query(p)| p).unwrap_or_default(),
    );
    let tran_id = payload.tran_id.clone().unwrap_or_default();

    let result = match state.validator.validate(&payload).await {
        Ok(confirmed) => state.reconciler.reconcile(&confirmed).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(ack) => (StatusCode::OK, ack.message()).into_response(),
        Err(e) => match e.kind() {
            ErrorKind::Transient => {
                error!(transaction_id = %tran_id, error = %e, "IPN processing failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Error processing IPN.").into_response()
            }
            _ => {
                match e.severity() {
                    Severity::Error => {
                        error!(transaction_id = %tran_id, error = %e, "IPN rejected")
                    }
                    Severity::Warning => {
                        warn!(transaction_id = %tran_id, error = %e, "IPN rejected")
                    }
                }
                (StatusCode::OK, "IPN received but not applied.").into_response()
            }
        },
    }
}

fn redirect_params(
    query: Option<Query<RedirectParams>>,
    body: Option<Form<RedirectParams>>,
) -> RedirectParams {
    body.map(|Form(p)| p)
        .unwrap_or_default()
        .or(query.map(|Query(p)| p).unwrap_or_default())
}

#[utoipa::path(
    post,
    path = "/api/payment/success",
    params(RedirectParams),
    responses((status = 303, description = "Redirect to the frontend success or error page")),
    tag = "Payment"
)]
pub async fn success(
    State(state): State<AppState>,
    query: Option<Query<RedirectParams>>,
    body: Option<Form<RedirectParams>>,
) -> Redirect {
    let params = redirect_params(query, body);
    let target = state.outcomes.success(params.tran_id.as_deref()).await;
    Redirect::to(target.as_str())
}

#[utoipa::path(
    post,
    path = "/api/payment/fail",
    params(RedirectParams),
    responses((status = 303, description = "Redirect to the frontend failure page")),
    tag = "Payment"
)]
pub async fn fail(
    State(state): State<AppState>,
    query: Option<Query<RedirectParams>>,
    body: Option<Form<RedirectParams>>,
) -> Redirect {
    let params = redirect_params(query, body);
    let target = state
        .outcomes
        .fail(params.tran_id.as_deref(), params.error)
        .await;
    Redirect::to(target.as_str())
}

#[utoipa::path(
    post,
    path = "/api/payment/cancel",
    params(RedirectParams),
    responses((status = 303, description = "Redirect to the frontend cancel page")),
    tag = "Payment"
)]
pub async fn cancel(
    State(state): State<AppState>,
    query: Option<Query<RedirectParams>>,
    body: Option<Form<RedirectParams>>,
) -> Redirect {
    let params = redirect_params(query, body);
    let target = state.outcomes.cancel(params.tran_id.as_deref()).await;
    Redirect::to(target.as_str())
}
