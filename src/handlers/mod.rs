pub mod contact;
pub mod payment;
pub mod users;

use crate::health::{check_health, GatewayChecker, HealthResponse, RepositoryChecker};
use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or degraded", body = HealthResponse),
        (status = 503, description = "Database is unreachable", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = RepositoryChecker::new(state.repository.clone());
    let gateway = GatewayChecker::new(state.gateway.clone());
    let report = check_health(&database, &gateway, state.start_time).await;

    // Return 503 if the database is down, 200 otherwise
    let status_code = if report.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(report))
}
