use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;
use tracing::debug;

use crate::AppState;

use super::cart::CartQuery;
use super::AppError;

// ─── GET /perf?cartId= ───────────────────────────────────────────

pub async fn run(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CartQuery>,
) -> Result<Json<i64>, AppError> {
    debug!(cart_id = query.cart_id, "perf run");
    let vestige = state.perf.run().await?;
    Ok(Json(vestige))
}

// ─── GET /perf/generated ─────────────────────────────────────────

pub async fn generated(State(state): State<Arc<AppState>>) -> Json<u64> {
    Json(state.perf.generated())
}
