//! Hosted Stripe Checkout sessions.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use okapi_core::{AllowedCountries, Cart, PriceError, to_cents};

use super::shipping::{ShippingError, ShippingQuote, validate_cart};
use crate::models::CurrentUser;
use crate::stripe::{
    CheckoutLineItem, CheckoutSessionParams, CheckoutShippingOption, MetadataError,
    OrderMetadata, PaymentGateway, StripeError,
};

/// Errors returned while starting a hosted checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Invalid(#[from] ShippingError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("Invalid amount: {0}")]
    Amount(#[from] PriceError),
    #[error("Payment provider error: {0}")]
    Upstream(#[from] StripeError),
    #[error("Checkout session has no URL")]
    MissingUrl,
}

/// Where to send the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSessionView {
    pub id: String,
    pub url: String,
}

/// Starts Stripe-hosted checkouts for the session cart.
#[derive(Clone)]
pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
    allowed: AllowedCountries,
    base_url: String,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        allowed: AllowedCountries,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            allowed,
            base_url: base_url.into(),
        }
    }

    /// Create a checkout session for the cart.
    ///
    /// When the customer already has a shipping quote its default rate is
    /// offered as the fixed shipping option; Stripe collects the address
    /// restricted to the allowed countries.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` for an empty cart or a line without variant and
    /// `Upstream` when Stripe rejects the request.
    #[instrument(skip_all, fields(lines = cart.items().len()))]
    pub async fn create_session(
        &self,
        cart: &Cart,
        quote: Option<&ShippingQuote>,
        user: Option<&CurrentUser>,
    ) -> Result<CheckoutSessionView, CheckoutError> {
        validate_cart(cart)?;

        let rate = quote.and_then(ShippingQuote::default_rate);
        let shipping_amount = rate.map(|r| to_cents(r.price)).transpose()?.unwrap_or(0);
        let metadata = OrderMetadata::from_cart(
            cart,
            user.map(|u| u.id),
            shipping_amount,
            rate.map(|r| r.id.clone()),
        )?;

        let line_items = cart
            .items()
            .iter()
            .map(|item| {
                Ok(CheckoutLineItem {
                    name: item.name.clone(),
                    unit_amount: to_cents(item.price)?,
                    quantity: item.quantity,
                    image: item.image.clone(),
                })
            })
            .collect::<Result<Vec<_>, PriceError>>()?;

        let params = CheckoutSessionParams {
            currency: "eur".to_string(),
            line_items,
            shipping_option: rate.map(|r| CheckoutShippingOption {
                display_name: r.name.clone(),
                amount: shipping_amount,
                min_days: r.min_delivery_days,
                max_days: r.max_delivery_days,
            }),
            allowed_countries: self
                .allowed
                .codes()
                .iter()
                .map(ToString::to_string)
                .collect(),
            success_url: format!(
                "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
                self.base_url
            ),
            cancel_url: format!("{}/cart", self.base_url),
            customer_email: user.map(|u| u.email.to_string()),
            payment_metadata: metadata.to_metadata()?,
        };

        let session = self.gateway.create_checkout_session(&params).await?;
        let url = session.url.ok_or(CheckoutError::MissingUrl)?;
        info!(session = %session.id, "Checkout session created");

        Ok(CheckoutSessionView {
            id: session.id,
            url,
        })
    }
}
