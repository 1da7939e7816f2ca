//! Verified-purchase product reviews.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use okapi_core::{Email, OrderId, ProductId, ReviewId, VariantId};

use crate::db::{OrderStore, RepositoryError, ReviewStore};
use crate::models::{NewReview, Review, ReviewSummary};

const MAX_TITLE_LEN: usize = 120;
const MAX_CONTENT_LEN: usize = 2000;

/// Errors returned by review operations.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("{0}")]
    Invalid(String),
    #[error("No matching order found for this review")]
    OrderNotFound,
    #[error("This product is not part of the order")]
    NotPurchased,
    #[error("You have already reviewed this product for this order")]
    AlreadyReviewed,
    #[error("Review not found")]
    NotFound,
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ReviewError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(_) => Self::AlreadyReviewed,
            other => Self::Repository(other),
        }
    }
}

/// A review as submitted by a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewSubmission {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub email: String,
    pub rating: u8,
    pub title: String,
    pub content: String,
}

impl ReviewSubmission {
    /// Check the fields and normalize whitespace.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Invalid` with a user-facing message.
    pub fn validate(&self) -> Result<NewReview, ReviewError> {
        if !(1..=5).contains(&self.rating) {
            return Err(ReviewError::Invalid("Rating must be between 1 and 5".to_string()));
        }
        let email = Email::parse(&self.email)
            .map_err(|_| ReviewError::Invalid("Please enter a valid email address".to_string()))?;

        let title = self.title.trim();
        let content = self.content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(ReviewError::Invalid("Title and review are required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(ReviewError::Invalid(format!(
                "Title must be at most {MAX_TITLE_LEN} characters"
            )));
        }
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(ReviewError::Invalid(format!(
                "Review must be at most {MAX_CONTENT_LEN} characters"
            )));
        }

        Ok(NewReview {
            order_id: self.order_id,
            product_id: self.product_id,
            variant_id: self.variant_id,
            email,
            rating: self.rating,
            title: title.to_string(),
            content: content.to_string(),
        })
    }
}

/// Reviews of a product with their summary.
#[derive(Debug, Clone, Serialize)]
pub struct ProductReviews {
    pub summary: ReviewSummary,
    pub reviews: Vec<Review>,
}

/// Creates and lists reviews.
#[derive(Clone)]
pub struct ReviewService {
    reviews: Arc<dyn ReviewStore>,
    orders: Arc<dyn OrderStore>,
}

impl ReviewService {
    #[must_use]
    pub fn new(reviews: Arc<dyn ReviewStore>, orders: Arc<dyn OrderStore>) -> Self {
        Self { reviews, orders }
    }

    /// Reviews for a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Repository` on database failure.
    pub async fn list(&self, product_id: ProductId) -> Result<ProductReviews, ReviewError> {
        let reviews = self.reviews.list_for_product(product_id).await?;
        Ok(ProductReviews {
            summary: ReviewSummary::from_reviews(&reviews),
            reviews,
        })
    }

    /// Create a review for a purchased product.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` for bad input, `OrderNotFound` when the order does
    /// not exist or belongs to another email, `NotPurchased` when the order
    /// lacks the product and `AlreadyReviewed` for a second review.
    #[instrument(skip_all, fields(order_id = %submission.order_id, product_id = %submission.product_id))]
    pub async fn create(&self, submission: &ReviewSubmission) -> Result<Review, ReviewError> {
        let review = submission.validate()?;

        let order = self
            .orders
            .get(review.order_id)
            .await?
            .filter(|o| o.order.email.matches(review.email.as_str()))
            .ok_or(ReviewError::OrderNotFound)?;
        if !order.contains(review.product_id, review.variant_id) {
            return Err(ReviewError::NotPurchased);
        }

        let created = self.reviews.create(&review).await?;
        info!(review_id = %created.id, rating = created.rating, "Review created");
        Ok(created)
    }

    /// Delete a review.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::NotFound` if no review has that id.
    pub async fn delete(&self, id: ReviewId) -> Result<(), ReviewError> {
        if self.reviews.delete(id).await? {
            info!(review_id = %id, "Review deleted");
            Ok(())
        } else {
            Err(ReviewError::NotFound)
        }
    }
}
