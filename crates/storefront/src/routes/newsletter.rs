//! Newsletter subscription route handlers.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use okapi_core::Email;

use crate::error::{AppError, Result};
use crate::services::Subscription;
use crate::state::AppState;

/// Newsletter subscription request.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
}

/// Subscribe to the newsletter.
///
/// Existing subscribers are reported as a success.
#[instrument(skip_all)]
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<Value>> {
    let list = state
        .mailing_list()
        .ok_or_else(|| AppError::Unavailable("The newsletter is not available".to_string()))?;

    let email = Email::parse(&request.email)
        .map_err(|_| AppError::BadRequest("Please enter a valid email address".to_string()))?;

    let status = match list.subscribe(&email).await? {
        Subscription::Subscribed => {
            tracing::info!(domain = %email.domain(), "Newsletter subscription successful");
            "subscribed"
        }
        Subscription::AlreadySubscribed => {
            tracing::info!(domain = %email.domain(), "Email already subscribed");
            "already_subscribed"
        }
    };

    Ok(Json(json!({ "status": status })))
}
