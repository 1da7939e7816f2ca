//! Shipping rate route handlers.

use axum::{Json, extract::State};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::Result;
use crate::models::keys;
use crate::routes::cart::load_cart;
use crate::services::ShippingQuote;
use crate::services::shipping::ShippingAddress;
use crate::state::AppState;

/// Quote shipping rates for the session cart.
///
/// The quote is remembered so that the payment intent can only use a rate
/// that was actually offered for this address.
#[instrument(skip_all, fields(country = %address.country_code))]
pub async fn rates(
    State(state): State<AppState>,
    session: Session,
    Json(address): Json<ShippingAddress>,
) -> Result<Json<ShippingQuote>> {
    let cart = load_cart(&session).await?;
    let quote = state.shipping().quote(&cart, &address).await?;
    session.insert(keys::SHIPPING_QUOTE, &quote).await?;
    Ok(Json(quote))
}

/// Load the last shipping quote from the session.
pub(crate) async fn load_quote(session: &Session) -> Result<Option<ShippingQuote>> {
    Ok(session.get::<ShippingQuote>(keys::SHIPPING_QUOTE).await?)
}
