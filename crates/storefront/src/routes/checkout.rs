//! Checkout route handlers: the embedded payment intent and the hosted
//! Stripe Checkout session.

use axum::{Json, extract::State};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::models::keys;
use crate::routes::cart::load_cart;
use crate::routes::shipping::load_quote;
use crate::services::checkout::CheckoutSessionView;
use crate::services::payment_intent::{PaymentIntentRequest, PaymentIntentResponse, StoredIntent};
use crate::state::AppState;

/// Create or update the checkout's payment intent.
#[instrument(skip_all, fields(rate = %request.shipping_rate_id))]
pub async fn payment_intent(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<PaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>> {
    let cart = load_cart(&session).await?;
    let quote = load_quote(&session).await?;
    let stored = session.get::<StoredIntent>(keys::PAYMENT_INTENT).await?;

    let intent = state
        .payment_intents()
        .sync(
            &cart,
            quote.as_ref(),
            stored.as_ref(),
            user.as_ref().map(|u| u.id),
            &request,
        )
        .await?;

    if stored.as_ref() != Some(&intent) {
        session.insert(keys::PAYMENT_INTENT, &intent).await?;
    }
    Ok(Json(PaymentIntentResponse::from(&intent)))
}

/// Create a hosted checkout session for the cart.
#[instrument(skip_all)]
pub async fn session(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<CheckoutSessionView>> {
    let cart = load_cart(&session).await?;
    let quote = load_quote(&session).await?;

    let view = state
        .checkout()
        .create_session(&cart, quote.as_ref(), user.as_ref())
        .await?;
    Ok(Json(view))
}
