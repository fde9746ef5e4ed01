use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::health::HealthReport;
use crate::AppState;

// ─── GET /healthz ────────────────────────────────────────────────
/// Plain-text aggregate status; 503 only when Unhealthy.

pub async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, String) {
    let report = state.health.run_all().await;
    let code = if report.status.is_available() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, report.status.to_string())
}

// ─── GET /api/health ─────────────────────────────────────────────

pub async fn report(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health.run_all().await;
    let code = if report.status.is_available() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}
