//! Health / Admin Surface (C10).
//!
//! A small `axum` router exposing liveness, readiness, and a metrics
//! snapshot. Readiness reflects the Mode Coordinator's startup tracker
//! (`crate::startup`) rather than re-probing every dependency on each
//! request.
use crate::startup;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct HealthState {
    pub mode: Arc<std::sync::RwLock<String>>,
    pub program_id: String,
    pub batch_size: usize,
    pub concurrency: u16,
    pub retry_attempts: u32,
    pub target_transactions: u64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    services: Vec<ServiceStatus>,
}

#[derive(Serialize)]
struct ServiceStatus {
    name: &'static str,
    ready: bool,
    duration_ms: Option<u64>,
    message: Option<String>,
}

#[derive(Serialize)]
struct MetricsResponse {
    mode: String,
    program_id: String,
    batch_size: usize,
    concurrency: u16,
    retry_attempts: u32,
    target_transactions: u64,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn ready_handler() -> (StatusCode, Json<ReadyResponse>) {
    let snapshot = startup::snapshot();
    let services: Vec<ServiceStatus> = snapshot
        .iter()
        .map(|s| ServiceStatus { name: s.name, ready: s.ready, duration_ms: s.duration_ms, message: s.message.clone() })
        .collect();
    let ready = !services.is_empty() && services.iter().all(|s| s.ready);
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(ReadyResponse { ready, services }))
}

async fn metrics_handler(State(state): State<HealthState>) -> Json<MetricsResponse> {
    let mode = state.mode.read().map(|m| m.clone()).unwrap_or_else(|_| "unknown".to_string());
    Json(MetricsResponse {
        mode,
        program_id: state.program_id.clone(),
        batch_size: state.batch_size,
        concurrency: state.concurrency,
        retry_attempts: state.retry_attempts,
        target_transactions: state.target_transactions,
    })
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_handler_reports_healthy() {
        let Json(resp) = health_handler().await;
        assert_eq!(resp.status, "healthy");
    }

    #[tokio::test]
    async fn ready_handler_is_not_ready_with_no_services_started() {
        let (status, Json(resp)) = ready_handler().await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!resp.ready);
    }
}
