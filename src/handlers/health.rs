use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

use super::AppState;

/// Health status for individual components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

/// Individual component health details
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthDetails {
    pub draft_store: ComponentHealth,
}

/// Full health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub details: HealthDetails,
    pub response_time_ms: u128,
}

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn get_uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

/// Liveness probe: answers as long as the process serves requests
async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": get_uptime_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Readiness probe: the draft store must answer a read
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();

    let probe_start = Instant::now();
    let probe = state.drafts.ping().await;
    let latency = probe_start.elapsed().as_millis() as u64;

    let draft_store = ComponentHealth {
        status: if probe.is_ok() {
            ComponentStatus::Up
        } else {
            ComponentStatus::Down
        },
        message: probe.map_or_else(
            |e| format!("Draft store unavailable: {}", e),
            |_| "Draft store readable".to_string(),
        ),
        latency_ms: Some(latency),
    };

    let status = draft_store.status;
    let status_code = match status {
        ComponentStatus::Up => StatusCode::OK,
        ComponentStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: get_uptime_secs(),
        details: HealthDetails { draft_store },
        response_time_ms: start.elapsed().as_millis(),
    };

    (status_code, Json(response))
}

/// Creates the router for health check endpoints
///
/// Endpoints:
/// - GET /health         - Liveness probe
/// - GET /health/ready   - Readiness probe (checks the draft store)
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(liveness_check))
        .route("/ready", get(readiness_check))
}
