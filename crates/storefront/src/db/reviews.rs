//! Review repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use okapi_core::{OrderId, ProductId, ReviewId, VariantId};

use super::{RepositoryError, ReviewStore, parse_stored_email};
use crate::models::{NewReview, Review};

const REVIEW_COLUMNS: &str =
    "id, order_id, product_id, variant_id, email, rating, title, content, created_at";

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: i32,
    order_id: i32,
    product_id: i64,
    variant_id: i64,
    email: String,
    rating: i16,
    title: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = u8::try_from(row.rating).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "rating {} out of range on review {}",
                row.rating, row.id
            ))
        })?;
        Ok(Self {
            id: ReviewId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            variant_id: VariantId::new(row.variant_id),
            email: parse_stored_email(&row.email)?,
            rating,
            title: row.title,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

/// Repository for review database operations.
#[derive(Clone)]
pub struct ReviewRepository {
    pool: PgPool,
}

impl ReviewRepository {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewStore for ReviewRepository {
    async fn create(&self, review: &NewReview) -> Result<Review, RepositoryError> {
        let row: ReviewRow = sqlx::query_as(&format!(
            r"
            INSERT INTO okapi.reviews (order_id, product_id, variant_id, email, rating, title, content)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {REVIEW_COLUMNS}
            "
        ))
        .bind(review.order_id)
        .bind(review.product_id)
        .bind(review.variant_id)
        .bind(review.email.as_str())
        .bind(i16::from(review.rating))
        .bind(&review.title)
        .bind(&review.content)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "review"))?;
        Review::try_from(row)
    }

    async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Review>, RepositoryError> {
        let rows: Vec<ReviewRow> = sqlx::query_as(&format!(
            "SELECT {REVIEW_COLUMNS} FROM okapi.reviews WHERE product_id = $1 ORDER BY created_at DESC"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Review::try_from).collect()
    }

    async fn delete(&self, id: ReviewId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM okapi.reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM okapi.reviews")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
