use axum::{
    middleware as axum_mw,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::middleware::request_telemetry;
use crate::telemetry::stream;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Demo endpoints ──────────────────────────────────────
        .route(
            "/cart",
            get(handlers::cart::get_items).post(handlers::cart::add_item),
        )
        .route("/perf", get(handlers::perf::run))
        .route("/perf/generated", get(handlers::perf::generated))
        // ── Health ──────────────────────────────────────────────
        .route("/healthz", get(handlers::health::healthz))
        .route("/api/health", get(handlers::health::report))
        // ── Synthetic load ──────────────────────────────────────
        .route(
            "/api/load/start",
            axum::routing::post(handlers::load::start_load),
        )
        .route(
            "/api/load/stop",
            axum::routing::post(handlers::load::stop_load),
        )
        .route("/api/load/status", get(handlers::load::load_status))
        // ── Telemetry ───────────────────────────────────────────
        .route(
            "/api/telemetry",
            get(stream::get_telemetry).delete(stream::reset_telemetry),
        )
        .route("/api/telemetry/stream", get(stream::telemetry_stream))
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            request_telemetry::request_telemetry,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
