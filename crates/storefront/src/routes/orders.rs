//! Order lookup route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use okapi_core::OrderId;

use crate::error::Result;
use crate::middleware::{OptionalAuth, RequireAuth, set_current_user};
use crate::models::Order;
use crate::services::orders::OrderDetail;
use crate::state::AppState;

/// Order lookup query.
#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    #[serde(default)]
    pub email: Option<String>,
}

/// Show an order with its live fulfillment status.
///
/// A visitor who proves ownership by email is remembered as the owner.
#[instrument(skip(state, session, user, query))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<OrderId>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<OrderDetail>> {
    let lookup = state
        .orders()
        .lookup(id, user.as_ref(), query.email.as_deref())
        .await?;

    if let Some(owner) = &lookup.bind {
        set_current_user(&session, owner).await?;
        tracing::info!(user_id = %owner.id, "Session bound to order owner");
    }

    Ok(Json(lookup.detail))
}

/// The session user's orders.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders().list_for_user(&user).await?))
}
