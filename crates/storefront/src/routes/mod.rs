//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                        - Liveness check
//! GET    /health/ready                  - Readiness check (database ping)
//!
//! # Catalog
//! GET    /api/products                  - Product listing
//! GET    /api/products/{id}             - Product detail with variants
//!
//! # Cart (session)
//! GET    /api/cart                      - Cart contents and totals
//! POST   /api/cart/items                - Add item
//! PATCH  /api/cart/items                - Set quantity (0 removes)
//! DELETE /api/cart/items                - Remove item
//! DELETE /api/cart                      - Clear cart
//!
//! # Checkout
//! POST   /api/shipping/rates            - Quote shipping for an address
//! POST   /api/checkout/payment-intent   - Create or update the payment intent
//! POST   /api/checkout/session          - Create a hosted checkout session
//!
//! # Orders
//! GET    /api/orders                    - Session user's orders
//! GET    /api/orders/{id}?email=        - Order with live fulfillment status
//!
//! # Reviews and newsletter (strict rate limit)
//! GET    /api/reviews?product_id=       - Product reviews with summary
//! POST   /api/reviews                   - Submit a review
//! POST   /api/newsletter                - Subscribe
//!
//! # Webhooks (no session, no rate limit)
//! POST   /api/webhooks/stripe           - Stripe events
//!
//! # Admin (bearer token)
//! GET    /admin/api/orders?status=&limit=
//! GET    /admin/api/orders/{id}
//! POST   /admin/api/orders/{id}/status
//! DELETE /admin/api/reviews/{id}
//! GET    /admin/api/stats
//! ```

pub mod admin;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod newsletter;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod shipping;
pub mod webhooks;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::middleware::{api_rate_limiter, strict_rate_limiter};
use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route(
            "/items",
            post(cart::add).patch(cart::update).delete(cart::remove),
        )
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/payment-intent", post(checkout::payment_intent))
        .route("/session", post(checkout::session))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
}

/// Routes that send mail or write on behalf of anonymous visitors.
pub fn strict_routes() -> Router<AppState> {
    Router::new()
        .route("/reviews", post(reviews::create))
        .route("/newsletter", post(newsletter::subscribe))
        .layer(strict_rate_limiter())
}

/// Create the session-backed storefront API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .route("/shipping/rates", post(shipping::rates))
        .nest("/checkout", checkout_routes())
        .nest("/orders", order_routes())
        .route("/reviews", get(reviews::index))
        .merge(strict_routes())
        .layer(api_rate_limiter())
}

/// Create the admin API router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin::orders))
        .route("/orders/{id}", get(admin::order))
        .route("/orders/{id}/status", post(admin::update_status))
        .route("/reviews/{id}", delete(admin::delete_review))
        .route("/stats", get(admin::stats))
        .layer(api_rate_limiter())
}

/// Create the webhook router.
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/stripe", post(webhooks::stripe))
}

/// Create the health check router.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
}
