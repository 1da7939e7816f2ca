//! The Okapi Store storefront library.
//!
//! JSON API for the catalog, cart, checkout, order lookup, reviews and
//! newsletter, the Stripe webhook that turns payments into Printful orders,
//! and a small admin API.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod printful;
pub mod routes;
pub mod services;
pub mod state;
pub mod stripe;

#[cfg(test)]
pub(crate) mod testing;

use axum::{Router, http::HeaderValue};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use crate::state::AppState;

/// Build the full application router.
///
/// The session layer only wraps the storefront API; the webhook and admin
/// routes are stateless. Production passes the `PostgresStore` layer from
/// `middleware::create_session_layer`.
pub fn app<Store>(state: AppState, session_layer: SessionManagerLayer<Store>) -> Router
where
    Store: SessionStore + Clone,
{
    let cors = cors_layer(&state.config().base_url);

    Router::new()
        .nest("/api", routes::api_routes().layer(session_layer))
        .nest("/api/webhooks", routes::webhook_routes())
        .nest("/admin/api", routes::admin_routes())
        .merge(routes::health_routes())
        .layer(cors)
        .layer(axum::middleware::from_fn(
            middleware::request_id_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<axum::body::Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            },
        ))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Only the storefront's own origin may call the API from a browser.
fn cors_layer(base_url: &str) -> CorsLayer {
    let origin = HeaderValue::from_str(base_url).map_or_else(
        |_| AllowOrigin::list(std::iter::empty::<HeaderValue>()),
        AllowOrigin::exact,
    );
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
}
