use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::telemetry::{best_effort, RequestRecord, TelemetrySink};
use crate::AppState;

/// Times every request and adds two response headers:
///
///   X-Response-Time-Us: total handler wall time in microseconds
///   Server-Timing: same value in the standard Server-Timing format
///
/// Requests outside the telemetry endpoints are also reported as a
/// [`RequestRecord`] stamped with the id and name of the serving thread.
pub async fn request_telemetry(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();

    let start_time = Utc::now();
    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let us = elapsed.as_micros();

    // ── Inject response headers ─────────────────────────────────
    if let Ok(val) = us.to_string().parse() {
        response.headers_mut().insert("X-Response-Time-Us", val);
    }

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    // The dashboard polls these; keep them out of their own numbers
    if !path.starts_with("/api/telemetry") {
        let thread = std::thread::current();
        let record = RequestRecord {
            id: Uuid::new_v4(),
            method,
            path,
            status: response.status().as_u16(),
            start_time,
            duration: elapsed,
            thread_id: format!("{:?}", thread.id()),
            thread_name: thread.name().map(str::to_owned),
        };
        best_effort(state.telemetry.track_request(record), "request");
    }

    response
}
