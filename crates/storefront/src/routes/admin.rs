//! Admin API route handlers.
//!
//! Every handler takes `AdminAuth`, so a missing or wrong bearer token is
//! rejected before any work is done.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use okapi_core::{OrderId, OrderStatus, ReviewId};

use crate::error::Result;
use crate::middleware::AdminAuth;
use crate::models::Order;
use crate::services::admin::{AdminOrderView, DashboardStats};
use crate::state::AppState;

/// Order listing filters.
#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Status change request.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

/// Recent orders.
#[instrument(skip(state, _admin))]
pub async fn orders(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(
        state.admin().list_orders(query.status, query.limit).await?,
    ))
}

/// One order with its totals check.
#[instrument(skip(state, _admin))]
pub async fn order(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<AdminOrderView>> {
    Ok(Json(state.admin().order(id).await?))
}

/// Change an order's status.
#[instrument(skip(state, _admin))]
pub async fn update_status(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<OrderId>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Order>> {
    Ok(Json(state.admin().update_status(id, update.status).await?))
}

/// Delete a review.
#[instrument(skip(state, _admin))]
pub async fn delete_review(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<ReviewId>,
) -> Result<StatusCode> {
    state.reviews().delete(id).await?;
    tracing::info!(review_id = %id, "Review deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// Dashboard statistics.
#[instrument(skip_all)]
pub async fn stats(
    State(state): State<AppState>,
    _admin: AdminAuth,
) -> Result<Json<DashboardStats>> {
    Ok(Json(state.admin().stats().await?))
}
