use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::cart::CartItem;
use crate::AppState;

use super::AppError;

#[derive(Debug, Deserialize)]
pub struct CartQuery {
    /// Missing ids read as cart 0.
    #[serde(rename = "cartId", default)]
    pub cart_id: i64,
}

// ─── GET /cart?cartId= ───────────────────────────────────────────

pub async fn get_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CartQuery>,
) -> Result<Json<Vec<CartItem>>, AppError> {
    let items = state.carts.get_items(query.cart_id).await?;
    Ok(Json(items))
}

// ─── POST /cart?cartId= ──────────────────────────────────────────

pub async fn add_item(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CartQuery>,
    Json(item): Json<CartItem>,
) -> Result<StatusCode, AppError> {
    state.carts.add_item(query.cart_id, item).await?;
    Ok(StatusCode::OK)
}
