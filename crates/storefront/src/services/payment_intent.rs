//! Keeps one Stripe payment intent in step with the checkout.
//!
//! The intent is created lazily and updated whenever the customer changes
//! address or shipping rate. Its metadata carries the cart snapshot that the
//! webhook later turns into an order.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use okapi_core::{AllowedCountries, Cart, Email, PriceError, UserId, to_cents};

use super::shipping::{ShippingAddress, ShippingError, ShippingQuote, validate_cart};
use crate::stripe::{
    MetadataError, OrderMetadata, PaymentGateway, PaymentIntent, PaymentIntentParams, StripeError,
};

/// Errors returned while syncing the payment intent.
#[derive(Debug, Error)]
pub enum PaymentIntentError {
    #[error(transparent)]
    Invalid(#[from] ShippingError),
    #[error("Please calculate shipping first")]
    QuoteRequired,
    #[error("The address changed since shipping was calculated")]
    AddressChanged,
    #[error("Unknown shipping option: {0}")]
    UnknownRate(String),
    #[error("Invalid email address")]
    InvalidEmail,
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("Invalid amount: {0}")]
    Amount(#[from] PriceError),
    #[error("Payment provider error: {0}")]
    Upstream(#[from] StripeError),
    #[error("Payment intent has no client secret")]
    MissingClientSecret,
}

/// The customer's current selection.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentRequest {
    pub shipping_rate_id: String,
    pub address: ShippingAddress,
    #[serde(default)]
    pub email: Option<String>,
}

/// The intent remembered in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIntent {
    pub id: String,
    pub client_secret: String,
    pub fingerprint: String,
    pub amount: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub shipping: Decimal,
}

/// What the checkout page needs to confirm the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    /// Amount in cents
    pub amount: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub shipping: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
}

impl From<&StoredIntent> for PaymentIntentResponse {
    fn from(stored: &StoredIntent) -> Self {
        Self {
            client_secret: stored.client_secret.clone(),
            amount: stored.amount,
            subtotal: stored.subtotal,
            shipping: stored.shipping,
            total: stored.subtotal + stored.shipping,
        }
    }
}

/// Creates or updates the checkout's payment intent.
#[derive(Clone)]
pub struct PaymentIntentSync {
    gateway: Arc<dyn PaymentGateway>,
    allowed: AllowedCountries,
}

impl PaymentIntentSync {
    #[must_use]
    pub fn new(gateway: Arc<dyn PaymentGateway>, allowed: AllowedCountries) -> Self {
        Self { gateway, allowed }
    }

    /// Bring the payment intent in line with the cart and selection.
    ///
    /// Returns the intent to remember in the session. The address and rate
    /// must match the session's shipping quote.
    ///
    /// # Errors
    ///
    /// Validation errors are returned before any Stripe call; `Upstream` when
    /// Stripe rejects the create or update.
    ///
    /// An unchanged selection reuses the stored intent without updating it,
    /// as long as Stripe still reports it as payable.
    #[instrument(skip_all, fields(rate = %request.shipping_rate_id))]
    pub async fn sync(
        &self,
        cart: &Cart,
        quote: Option<&ShippingQuote>,
        stored: Option<&StoredIntent>,
        user_id: Option<UserId>,
        request: &PaymentIntentRequest,
    ) -> Result<StoredIntent, PaymentIntentError> {
        validate_cart(cart)?;
        let address = request.address.normalized();
        address.validate(&self.allowed)?;
        if address.name.is_none() {
            return Err(ShippingError::MissingField("name").into());
        }
        let email = request
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .map(|e| Email::parse(e).map_err(|_| PaymentIntentError::InvalidEmail))
            .transpose()?;

        let quote = quote.ok_or(PaymentIntentError::QuoteRequired)?;
        if !same_destination(&quote.address, &address) {
            return Err(PaymentIntentError::AddressChanged);
        }
        let rate = quote
            .rate(&request.shipping_rate_id)
            .ok_or_else(|| PaymentIntentError::UnknownRate(request.shipping_rate_id.clone()))?;

        let subtotal = cart.subtotal();
        let amount = to_cents(subtotal + rate.price)?;
        let fingerprint = fingerprint(cart, &address, &rate.id, user_id, email.as_ref());

        // Only an intent that can still be paid is reused or updated
        let open = match stored {
            Some(stored) => self.open_intent(&stored.id).await,
            None => None,
        };
        if let Some(stored) = stored.filter(|s| open.is_some() && s.fingerprint == fingerprint) {
            debug!(intent = %stored.id, "Selection unchanged, reusing payment intent");
            return Ok(stored.clone());
        }

        let metadata =
            OrderMetadata::from_cart(cart, user_id, to_cents(rate.price)?, Some(rate.id.clone()))?;
        let params = PaymentIntentParams {
            amount,
            currency: "eur".to_string(),
            shipping: Some(address.to_stripe()),
            receipt_email: email.map(Email::into_inner),
            metadata: metadata.to_metadata()?,
        };

        let intent = if let Some(open) = open {
            let updated = self.gateway.update_payment_intent(&open.id, &params).await?;
            debug!(intent = %updated.id, amount, "Payment intent updated");
            updated
        } else {
            let created = self.gateway.create_payment_intent(&params).await?;
            info!(intent = %created.id, amount, "Payment intent created");
            created
        };

        Ok(StoredIntent {
            client_secret: intent
                .client_secret
                .ok_or(PaymentIntentError::MissingClientSecret)?,
            id: intent.id,
            fingerprint,
            amount,
            subtotal,
            shipping: rate.price,
        })
    }

    /// The stored intent, if Stripe still lets it be updated and paid.
    ///
    /// A failed retrieval counts as gone, so the caller starts a new intent.
    async fn open_intent(&self, id: &str) -> Option<PaymentIntent> {
        match self.gateway.retrieve_payment_intent(id).await {
            Ok(existing) if existing.status.is_updatable() => Some(existing),
            Ok(existing) => {
                info!(intent = %id, status = ?existing.status, "Payment intent no longer updatable");
                None
            }
            Err(e) => {
                warn!(intent = %id, error = %e, "Could not retrieve stored payment intent");
                None
            }
        }
    }
}

/// Name changes don't affect shipping, so only the destination is compared.
fn same_destination(quoted: &ShippingAddress, requested: &ShippingAddress) -> bool {
    quoted.address1 == requested.address1
        && quoted.address2 == requested.address2
        && quoted.city == requested.city
        && quoted.zip == requested.zip
        && quoted.country_code == requested.country_code
        && quoted.state_code == requested.state_code
}

/// Hex SHA-256 over everything that affects the intent.
fn fingerprint(
    cart: &Cart,
    address: &ShippingAddress,
    rate_id: &str,
    user_id: Option<UserId>,
    email: Option<&Email>,
) -> String {
    let payload = serde_json::json!({
        "cart": cart,
        "address": address,
        "rate": rate_id,
        "user": user_id.map(|id| id.get()),
        "email": email.map(Email::as_str),
    });
    hex::encode(Sha256::digest(payload.to_string().as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::shipping::rank_rates;
    use crate::services::shipping::tests::{address, tee_cart};
    use crate::printful::ShippingRate;
    use crate::stripe::PaymentIntentStatus;
    use crate::testing::FakePayments;

    fn quote() -> ShippingQuote {
        ShippingQuote {
            address: address("BE"),
            rates: rank_rates(vec![
                ShippingRate {
                    id: "STANDARD".to_string(),
                    name: "Flat Rate".to_string(),
                    rate: Decimal::new(495, 2),
                    currency: "EUR".to_string(),
                    min_delivery_days: Some(3),
                    max_delivery_days: Some(4),
                },
                ShippingRate {
                    id: "EXPRESS".to_string(),
                    name: "Express".to_string(),
                    rate: Decimal::new(1290, 2),
                    currency: "EUR".to_string(),
                    min_delivery_days: Some(1),
                    max_delivery_days: Some(2),
                },
            ]),
        }
    }

    fn request(rate: &str) -> PaymentIntentRequest {
        PaymentIntentRequest {
            shipping_rate_id: rate.to_string(),
            address: address("BE"),
            email: Some("ada@example.com".to_string()),
        }
    }

    fn sync(payments: &Arc<FakePayments>) -> PaymentIntentSync {
        PaymentIntentSync::new(payments.clone(), AllowedCountries::default())
    }

    #[tokio::test]
    async fn test_creates_intent_with_total_amount() {
        let payments = Arc::new(FakePayments::new());
        let stored = sync(&payments)
            .sync(&tee_cart(), Some(&quote()), None, Some(UserId::new(7)), &request("STANDARD"))
            .await
            .unwrap();

        // 2 x 25.00 + 12.00 + 4.95
        assert_eq!(stored.amount, 6695);
        let created = payments.created_intents();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].amount, 6695);
        assert_eq!(created[0].metadata.get("shipping_amount").map(String::as_str), Some("495"));
        assert_eq!(created[0].metadata.get("user_id").map(String::as_str), Some("7"));
        assert_eq!(created[0].receipt_email.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn test_identical_request_reuses_intent() {
        let payments = Arc::new(FakePayments::new());
        let service = sync(&payments);
        let first = service
            .sync(&tee_cart(), Some(&quote()), None, None, &request("STANDARD"))
            .await
            .unwrap();
        let second = service
            .sync(&tee_cart(), Some(&quote()), Some(&first), None, &request("STANDARD"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(payments.created_intents().len(), 1);
        assert!(payments.updated_intents().is_empty());
    }

    #[tokio::test]
    async fn test_paid_intent_not_reused_for_same_selection() {
        let payments = Arc::new(FakePayments::new());
        let service = sync(&payments);
        let first = service
            .sync(&tee_cart(), Some(&quote()), None, None, &request("STANDARD"))
            .await
            .unwrap();
        payments.set_status(&first.id, PaymentIntentStatus::Succeeded);

        let second = service
            .sync(&tee_cart(), Some(&quote()), Some(&first), None, &request("STANDARD"))
            .await
            .unwrap();
        assert_ne!(second.id, first.id);
        assert_ne!(second.client_secret, first.client_secret);
        assert_eq!(second.amount, first.amount);
        assert_eq!(payments.created_intents().len(), 2);
        assert!(payments.updated_intents().is_empty());
    }

    #[tokio::test]
    async fn test_missing_intent_replaced() {
        let payments = Arc::new(FakePayments::new());
        let gone = StoredIntent {
            id: "pi_expired".to_string(),
            client_secret: "pi_expired_secret".to_string(),
            fingerprint: String::new(),
            amount: 0,
            subtotal: Decimal::ZERO,
            shipping: Decimal::ZERO,
        };

        let stored = sync(&payments)
            .sync(&tee_cart(), Some(&quote()), Some(&gone), None, &request("STANDARD"))
            .await
            .unwrap();
        assert_ne!(stored.id, gone.id);
        assert_eq!(payments.created_intents().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_change_updates_open_intent() {
        let payments = Arc::new(FakePayments::new());
        let service = sync(&payments);
        let first = service
            .sync(&tee_cart(), Some(&quote()), None, None, &request("STANDARD"))
            .await
            .unwrap();
        let second = service
            .sync(&tee_cart(), Some(&quote()), Some(&first), None, &request("EXPRESS"))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.amount, 7490);
        assert_eq!(payments.updated_intents(), vec![(first.id.clone(), 7490)]);
    }

    #[tokio::test]
    async fn test_succeeded_intent_replaced() {
        let payments = Arc::new(FakePayments::new());
        let service = sync(&payments);
        let first = service
            .sync(&tee_cart(), Some(&quote()), None, None, &request("STANDARD"))
            .await
            .unwrap();
        payments.set_status(&first.id, PaymentIntentStatus::Succeeded);

        let second = service
            .sync(&tee_cart(), Some(&quote()), Some(&first), None, &request("EXPRESS"))
            .await
            .unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(payments.created_intents().len(), 2);
        assert!(payments.updated_intents().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_country_rejected_before_stripe() {
        let payments = Arc::new(FakePayments::new());
        let mut req = request("STANDARD");
        req.address = address("US");

        let result = sync(&payments)
            .sync(&tee_cart(), Some(&quote()), None, None, &req)
            .await;
        assert!(matches!(
            result,
            Err(PaymentIntentError::Invalid(ShippingError::UnsupportedCountry(_)))
        ));
        assert_eq!(payments.call_count(), 0);
    }

    #[tokio::test]
    async fn test_selection_must_match_quote() {
        let payments = Arc::new(FakePayments::new());
        let service = sync(&payments);

        assert!(matches!(
            service.sync(&tee_cart(), None, None, None, &request("STANDARD")).await,
            Err(PaymentIntentError::QuoteRequired)
        ));
        assert!(matches!(
            service
                .sync(&tee_cart(), Some(&quote()), None, None, &request("OVERNIGHT"))
                .await,
            Err(PaymentIntentError::UnknownRate(_))
        ));

        let mut moved = request("STANDARD");
        moved.address.zip = "2000".to_string();
        assert!(matches!(
            service.sync(&tee_cart(), Some(&quote()), None, None, &moved).await,
            Err(PaymentIntentError::AddressChanged)
        ));
        assert_eq!(payments.call_count(), 0);
    }
}
