//! Review domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use okapi_core::{Email, OrderId, ProductId, ReviewId, VariantId};

/// A stored product review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub id: ReviewId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    #[serde(skip_serializing)]
    pub email: Email,
    pub rating: u8,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A validated review ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub email: Email,
    pub rating: u8,
    pub title: String,
    pub content: String,
}

/// Aggregate over a product's reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    pub count: usize,
    /// Mean rating rounded to one decimal, `None` without reviews.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub average: Option<Decimal>,
}

impl ReviewSummary {
    /// Summarize a set of reviews.
    #[must_use]
    pub fn from_reviews(reviews: &[Review]) -> Self {
        if reviews.is_empty() {
            return Self {
                count: 0,
                average: None,
            };
        }
        let total: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
        let count = reviews.len();
        let average = Decimal::from(total) / Decimal::from(count);
        Self {
            count,
            average: Some(average.round_dp(1)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn review(rating: u8) -> Review {
        Review {
            id: ReviewId::new(1),
            order_id: OrderId::new(1),
            product_id: ProductId::new(10),
            variant_id: VariantId::new(100),
            email: Email::parse("ada@example.com").unwrap(),
            rating,
            title: "Great".to_string(),
            content: "Soft fabric".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_rounds_to_one_decimal() {
        let summary = ReviewSummary::from_reviews(&[review(5), review(4), review(4)]);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average, Some(Decimal::new(43, 1)));
    }

    #[test]
    fn test_summary_empty() {
        let summary = ReviewSummary::from_reviews(&[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.average, None);
    }

    #[test]
    fn test_email_not_serialized() {
        let json = serde_json::to_value(review(5)).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["rating"], 5);
    }
}
