//! Product catalog route handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use okapi_core::ProductId;

use crate::error::Result;
use crate::services::catalog::{ProductDetailView, ProductSummaryView};
use crate::state::AppState;

/// List catalog products.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<Arc<Vec<ProductSummaryView>>>> {
    Ok(Json(state.catalog().list_products().await?))
}

/// Show a product with its variants.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Arc<ProductDetailView>>> {
    Ok(Json(state.catalog().get_product(id).await?))
}
