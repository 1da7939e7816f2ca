//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Every error body is JSON: `{"error": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use okapi_core::CartError;

use crate::db::RepositoryError;
use crate::printful::PrintfulError;
use crate::services::{
    AdminError, CatalogError, CheckoutError, MailchimpError, OrderError, PaymentIntentError,
    ReconcileError, ReviewError, ShippingError,
};
use crate::stripe::{MetadataError, StripeError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Stripe API operation failed.
    #[error("Stripe error: {0}")]
    Stripe(#[from] StripeError),

    /// Printful API operation failed.
    #[error("Printful error: {0}")]
    Printful(#[from] PrintfulError),

    /// Mailchimp API operation failed.
    #[error("Mailchimp error: {0}")]
    Mailchimp(#[from] MailchimpError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User may not access the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Optional integration is not configured.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Stripe(_) | Self::Printful(_) | Self::Mailchimp(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message safe to show to the client.
    fn public_message(&self) -> String {
        match self {
            // Don't expose internal error details to clients
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Stripe(_) => "Payment service error, please try again".to_string(),
            Self::Printful(_) => {
                "Could not reach our fulfillment partner, please try again".to_string()
            }
            Self::Mailchimp(_) => "Newsletter service error, please try again".to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Unavailable(msg) => msg.clone(),
            Self::RateLimited => "Too many requests, please slow down".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = serde_json::json!({ "error": self.public_message() });
        (status, Json(body)).into_response()
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session error: {err}"))
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => Self::NotFound("Product not found".to_string()),
            CatalogError::Upstream(e) => Self::Printful(e),
        }
    }
}

impl From<ShippingError> for AppError {
    fn from(err: ShippingError) -> Self {
        match err {
            ShippingError::Upstream(e) => Self::Printful(e),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<MetadataError> for AppError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::EmptyCart
            | MetadataError::MissingVariant(_)
            | MetadataError::TooLarge => Self::BadRequest(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PaymentIntentError> for AppError {
    fn from(err: PaymentIntentError) -> Self {
        match err {
            PaymentIntentError::Invalid(e) => e.into(),
            PaymentIntentError::Metadata(e) => e.into(),
            PaymentIntentError::Upstream(e) => Self::Stripe(e),
            PaymentIntentError::MissingClientSecret => Self::Internal(err.to_string()),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Invalid(e) => e.into(),
            CheckoutError::Metadata(e) => e.into(),
            CheckoutError::Upstream(e) => Self::Stripe(e),
            CheckoutError::Amount(_) => Self::BadRequest(err.to_string()),
            CheckoutError::MissingUrl => Self::Internal(err.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound => Self::NotFound(err.to_string()),
            OrderError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<ReviewError> for AppError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::OrderNotFound | ReviewError::NotFound => Self::NotFound(err.to_string()),
            ReviewError::Repository(e) => Self::Database(e),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::NotFound => Self::NotFound(err.to_string()),
            AdminError::InvalidTransition { .. } => Self::BadRequest(err.to_string()),
            AdminError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        // Any failure must be a 500 so that Stripe redelivers
        Self::Internal(err.to_string())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this once a session is bound to a user to associate errors with them.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
