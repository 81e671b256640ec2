use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use utoipa::ToSchema;

use crate::ports::{DonationRepository, PaymentGateway};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    #[schema(value_type = Object)]
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn unhealthy(error: impl Into<String>) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.into(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

pub struct RepositoryChecker {
    repository: Arc<dyn DonationRepository>,
}

impl RepositoryChecker {
    pub fn new(repository: Arc<dyn DonationRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl DependencyChecker for RepositoryChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.repository.ping().await {
            Ok(()) => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

/// Reports the gateway client's circuit breaker. No network call is made.
pub struct GatewayChecker {
    gateway: Arc<dyn PaymentGateway>,
}

impl GatewayChecker {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl DependencyChecker for GatewayChecker {
    async fn check(&self) -> DependencyStatus {
        match self.gateway.circuit_state() {
            "open" => DependencyStatus::unhealthy("circuit breaker open"),
            _ => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: 0,
            },
        }
    }
}

pub async fn check_health(
    database: &dyn DependencyChecker,
    gateway: &dyn DependencyChecker,
    start_time: Instant,
) -> HealthResponse {
    let timeout_duration = Duration::from_secs(5);

    let (database_result, gateway_result) = tokio::join!(
        timeout(timeout_duration, database.check()),
        timeout(timeout_duration, gateway.check()),
    );

    let mut dependencies = HashMap::new();
    dependencies.insert(
        "database".to_string(),
        database_result.unwrap_or_else(|_| DependencyStatus::unhealthy("timeout")),
    );
    dependencies.insert(
        "gateway".to_string(),
        gateway_result.unwrap_or_else(|_| DependencyStatus::unhealthy("timeout")),
    );

    HealthResponse {
        status: determine_overall_status(&dependencies),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

fn determine_overall_status(dependencies: &HashMap<String, DependencyStatus>) -> String {
    let critical_deps = ["database"];
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (name, status) in dependencies {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if critical_deps.contains(&name.as_str()) {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
    }

    if has_critical_failure {
        "unhealthy".to_string()
    } else if has_non_critical_failure {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    #[async_trait]
    impl DependencyChecker for Fixed {
        async fn check(&self) -> DependencyStatus {
            if self.0 {
                DependencyStatus::Healthy {
                    status: "healthy".to_string(),
                    latency_ms: 1,
                }
            } else {
                DependencyStatus::unhealthy("down")
            }
        }
    }

    #[tokio::test]
    async fn database_failure_is_critical() {
        let report = check_health(&Fixed(false), &Fixed(true), Instant::now()).await;
        assert_eq!(report.status, "unhealthy");
    }

    #[tokio::test]
    async fn gateway_failure_degrades() {
        let report = check_health(&Fixed(true), &Fixed(false), Instant::now()).await;
        assert_eq!(report.status, "degraded");
        assert!(matches!(
            report.dependencies.get("gateway"),
            Some(DependencyStatus::Unhealthy { .. })
        ));
    }

    #[tokio::test]
    async fn all_up_is_healthy() {
        let report = check_health(&Fixed(true), &Fixed(true), Instant::now()).await;
        assert_eq!(report.status, "healthy");
        assert_eq!(report.dependencies.len(), 2);
    }
}
