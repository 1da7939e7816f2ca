//! Product review route handlers.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use okapi_core::ProductId;

use crate::error::Result;
use crate::models::Review;
use crate::services::reviews::{ProductReviews, ReviewSubmission};
use crate::state::AppState;

/// Review listing query.
#[derive(Debug, Deserialize)]
pub struct ReviewsQuery {
    pub product_id: ProductId,
}

/// Reviews of a product with their summary.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ReviewsQuery>,
) -> Result<Json<ProductReviews>> {
    Ok(Json(state.reviews().list(query.product_id).await?))
}

/// Submit a verified-purchase review.
#[instrument(skip_all, fields(order_id = %submission.order_id, product_id = %submission.product_id))]
pub async fn create(
    State(state): State<AppState>,
    Json(submission): Json<ReviewSubmission>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = state.reviews().create(&submission).await?;
    Ok((StatusCode::CREATED, Json(review)))
}
