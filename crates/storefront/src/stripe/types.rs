//! Stripe API resource types.
//!
//! Only the fields the storefront reads are modelled; unknown fields are
//! ignored by serde.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lifecycle of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl PaymentIntentStatus {
    /// Whether amount, shipping and metadata can still be changed.
    #[must_use]
    pub const fn is_updatable(self) -> bool {
        matches!(
            self,
            Self::RequiresPaymentMethod | Self::RequiresConfirmation | Self::RequiresAction
        )
    }
}

/// A postal address as Stripe represents it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Address {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    /// ISO 3166-1 alpha-2 code
    pub country: Option<String>,
}

/// Shipping recipient and address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShippingDetails {
    pub name: Option<String>,
    #[serde(default)]
    pub address: Address,
    pub phone: Option<String>,
}

/// A field that is either an object ID or the expanded object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

impl<T> Expandable<T> {
    /// The expanded object, if it was expanded.
    pub fn as_object(&self) -> Option<&T> {
        match self {
            Self::Id(_) => None,
            Self::Object(object) => Some(object),
        }
    }
}

/// Billing details attached to a charge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BillingDetails {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// A charge; only read through a payment intent's `latest_charge`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Charge {
    pub id: String,
    #[serde(default)]
    pub billing_details: BillingDetails,
    pub payment_intent: Option<String>,
}

/// A payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Amount in the smallest currency unit (cents)
    pub amount: i64,
    pub currency: String,
    pub status: PaymentIntentStatus,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub shipping: Option<ShippingDetails>,
    pub receipt_email: Option<String>,
    pub latest_charge: Option<Expandable<Charge>>,
}

impl PaymentIntent {
    /// Email the customer paid with: the charge's billing email, then the
    /// receipt email.
    #[must_use]
    pub fn billing_email(&self) -> Option<&str> {
        self.latest_charge
            .as_ref()
            .and_then(Expandable::as_object)
            .and_then(|charge| charge.billing_details.email.as_deref())
            .or(self.receipt_email.as_deref())
            .filter(|email| !email.trim().is_empty())
    }

    /// Name on the billing details, if the charge was expanded.
    #[must_use]
    pub fn billing_name(&self) -> Option<&str> {
        self.latest_charge
            .as_ref()
            .and_then(Expandable::as_object)
            .and_then(|charge| charge.billing_details.name.as_deref())
    }
}

/// Customer details collected by a hosted checkout session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Details collected on the hosted checkout page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CollectedInformation {
    pub shipping_details: Option<ShippingDetails>,
}

/// A hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_intent: Option<String>,
    pub customer_details: Option<CustomerDetails>,
    pub collected_information: Option<CollectedInformation>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// Shipping collected on the hosted page.
    #[must_use]
    pub fn shipping(&self) -> Option<&ShippingDetails> {
        self.collected_information
            .as_ref()
            .and_then(|info| info.shipping_details.as_ref())
    }
}

/// A webhook event envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

/// Payload of a webhook event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl Event {
    /// `id` of the event's object.
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(serde_json::Value::as_str)
    }

    /// A string field of the event's object.
    #[must_use]
    pub fn object_str(&self, field: &str) -> Option<&str> {
        self.data.object.get(field).and_then(serde_json::Value::as_str)
    }
}

/// Error body returned by the Stripe API.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub message: Option<String>,
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_intent_with_expanded_charge() {
        let json = serde_json::json!({
            "id": "pi_123",
            "object": "payment_intent",
            "amount": 5495,
            "currency": "eur",
            "status": "succeeded",
            "client_secret": "pi_123_secret_abc",
            "metadata": {"items": "[]", "items_count": "1"},
            "receipt_email": "receipt@example.com",
            "latest_charge": {
                "id": "ch_1",
                "billing_details": {"email": "billing@example.com", "name": "Ada"},
                "payment_intent": "pi_123"
            }
        });
        let intent: PaymentIntent = serde_json::from_value(json).unwrap();
        assert_eq!(intent.status, PaymentIntentStatus::Succeeded);
        assert_eq!(intent.billing_email(), Some("billing@example.com"));
        assert_eq!(intent.billing_name(), Some("Ada"));
    }

    #[test]
    fn test_billing_email_falls_back_to_receipt() {
        let json = serde_json::json!({
            "id": "pi_123",
            "amount": 100,
            "currency": "eur",
            "status": "succeeded",
            "receipt_email": "receipt@example.com",
            "latest_charge": "ch_1"
        });
        let intent: PaymentIntent = serde_json::from_value(json).unwrap();
        assert_eq!(intent.billing_email(), Some("receipt@example.com"));
    }

    #[test]
    fn test_unknown_status() {
        let status: PaymentIntentStatus = serde_json::from_str("\"requires_source\"").unwrap();
        assert_eq!(status, PaymentIntentStatus::Unknown);
        assert!(!status.is_updatable());
        assert!(PaymentIntentStatus::RequiresPaymentMethod.is_updatable());
        assert!(!PaymentIntentStatus::Succeeded.is_updatable());
    }

    #[test]
    fn test_event_accessors() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_1", "payment_intent": "pi_9"}}
        }))
        .unwrap();
        assert_eq!(event.kind, "charge.refunded");
        assert_eq!(event.object_id(), Some("ch_1"));
        assert_eq!(event.object_str("payment_intent"), Some("pi_9"));
    }
}
