//! Database operations for the storefront `PostgreSQL` database.
//!
//! ## Tables (schema `okapi`)
//!
//! - `users` - Email-keyed customers, guests included
//! - `products` - Local copy of Printful sync products
//! - `orders` - Orders, keyed for idempotency by `stripe_payment_id`
//! - `order_items` - Purchased lines with price snapshots
//! - `reviews` - One review per product per order
//! - `tower_sessions.session` - Session storage (created by the session store)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p okapi-cli -- migrate
//! ```

pub mod orders;
pub mod products;
pub mod reviews;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use okapi_core::{Email, OrderId, OrderStatus, ProductId, ReviewId, UserId};

use crate::models::{NewOrder, NewReview, Order, OrderWithItems, Review, User};

pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use reviews::ReviewRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate payment intent).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique violations to `Conflict`, everything else to `Database`.
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Order counts and revenue for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct OrderStats {
    /// Number of orders per status; statuses without orders are omitted.
    pub by_status: Vec<(OrderStatus, i64)>,
    /// Sum of totals over orders that were neither refunded nor failed.
    #[serde(with = "rust_decimal::serde::str")]
    pub revenue: Decimal,
}

/// Persistence for orders and their items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fetch an order with its items.
    async fn get(&self, id: OrderId) -> Result<Option<OrderWithItems>, RepositoryError>;

    /// Fetch the order created for a payment intent.
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError>;

    /// Insert the order, its items and any missing product rows in one
    /// transaction.
    ///
    /// Returns `RepositoryError::Conflict` if an order already exists for
    /// the payment intent.
    async fn create_with_items(&self, order: &NewOrder)
    -> Result<OrderWithItems, RepositoryError>;

    /// Record the Printful ids and move the order to `processing`.
    async fn attach_fulfillment(
        &self,
        id: OrderId,
        printful_id: &str,
        printful_order_id: Option<i64>,
    ) -> Result<Order, RepositoryError>;

    /// Overwrite the status. Transition rules are checked by callers.
    async fn set_status(&self, id: OrderId, status: OrderStatus)
    -> Result<Order, RepositoryError>;

    /// Record the hosted checkout session that paid for the order.
    async fn set_checkout_session(
        &self,
        id: OrderId,
        session_id: &str,
    ) -> Result<(), RepositoryError>;

    /// Orders owned by a user, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Orders for the admin dashboard, newest first.
    async fn list(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Aggregate counts and revenue.
    async fn stats(&self) -> Result<OrderStats, RepositoryError>;
}

/// Persistence for customers.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Get a user by ID.
    async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Get a user by email.
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Return the user for `email`, creating a guest if none exists.
    async fn get_or_create_guest(&self, email: &Email) -> Result<User, RepositoryError>;

    /// Turn a guest into a full account. Returns `None` for unknown emails.
    async fn promote_guest(&self, email: &Email) -> Result<Option<User>, RepositoryError>;
}

/// Persistence for reviews.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Insert a review.
    ///
    /// Returns `RepositoryError::Conflict` if the same email already reviewed
    /// this product variant for this order.
    async fn create(&self, review: &NewReview) -> Result<Review, RepositoryError>;

    /// Reviews for a product, newest first.
    async fn list_for_product(&self, product_id: ProductId)
    -> Result<Vec<Review>, RepositoryError>;

    /// Delete a review. Returns whether a row was removed.
    async fn delete(&self, id: ReviewId) -> Result<bool, RepositoryError>;

    /// Total number of reviews.
    async fn count(&self) -> Result<i64, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Parse an email read back from the database.
pub(crate) fn parse_stored_email(raw: &str) -> Result<Email, RepositoryError> {
    Email::parse(raw)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid email in database: {e}")))
}
