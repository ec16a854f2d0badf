//! Health, readiness and metrics endpoints

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::infra::ComponentHealth;
use crate::server::AppState;

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Serving from the secondary tier
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&ComponentHealth> for ComponentStatus {
    fn from(health: &ComponentHealth) -> Self {
        match health {
            ComponentHealth::Healthy => Self {
                status: HealthStatus::Healthy,
                reason: None,
            },
            ComponentHealth::Degraded { reason } => Self {
                status: HealthStatus::Degraded,
                reason: Some(reason.clone()),
            },
            ComponentHealth::Unhealthy { reason } => Self {
                status: HealthStatus::Unhealthy,
                reason: Some(reason.clone()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub environment: String,
    pub primary: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<ComponentStatus>,
    pub ledger: &'static str,
    pub journal: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmirrored: Option<u64>,
}

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "provenance-registry",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /ready
///
/// 503 unless ownership can be determined from some permitted tier and
/// the mirror journal is readable.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.resolver.store().health().await;

    let unmirrored = state.resolver.unmirrored_count().await;

    let serving = match (&health.primary, &health.secondary) {
        // Lookups fail closed while the journal is unreadable
        _ if unmirrored.is_err() => HealthStatus::Unhealthy,
        (ComponentHealth::Healthy, _) => HealthStatus::Healthy,
        (_, Some(ComponentHealth::Healthy)) => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    };

    let journal = match &unmirrored {
        Ok(_) => ComponentHealth::Healthy,
        Err(e) => ComponentHealth::Unhealthy {
            reason: e.kind().to_string(),
        },
    };

    let body = ReadinessResponse {
        status: serving,
        environment: state.policy.environment().to_string(),
        primary: (&health.primary).into(),
        secondary: health.secondary.as_ref().map(ComponentStatus::from),
        ledger: state.ledger_name,
        journal: (&journal).into(),
        unmirrored: unmirrored.ok(),
    };

    let code = if serving == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (code, Json(body))
}

/// GET /metrics (Prometheus text)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus().await,
    )
}

/// GET /metrics/json
pub async fn metrics_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.metrics.to_json().await)
}
