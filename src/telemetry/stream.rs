use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::hub::TelemetrySnapshot;
use crate::AppState;

// ─── GET /api/telemetry ──────────────────────────────────────────

pub async fn get_telemetry(State(state): State<Arc<AppState>>) -> Json<TelemetrySnapshot> {
    Json(state.telemetry.snapshot())
}

// ─── DELETE /api/telemetry ───────────────────────────────────────

pub async fn reset_telemetry(State(state): State<Arc<AppState>>) -> StatusCode {
    state.telemetry.reset();
    StatusCode::NO_CONTENT
}

// ─── GET /api/telemetry/stream ───────────────────────────────────
/// Server-Sent Events endpoint, one full snapshot every 500 ms.

pub async fn telemetry_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = state.telemetry.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().event("telemetry").data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
