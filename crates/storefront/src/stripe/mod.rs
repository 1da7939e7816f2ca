//! Stripe API client.
//!
//! A thin client over the handful of REST endpoints the checkout uses.
//! Requests are form-encoded with bracketed keys (`shipping[address][city]`)
//! and authenticated with the secret key as a bearer token.
//!
//! # Endpoints
//!
//! - `POST /v1/payment_intents` and `POST /v1/payment_intents/{id}`
//! - `GET /v1/payment_intents/{id}` (with `latest_charge` expanded)
//! - `POST /v1/checkout/sessions` and `GET /v1/checkout/sessions/{id}`

pub mod metadata;
pub mod types;
pub mod webhook;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;

use crate::config::StripeConfig;

pub use metadata::{MetadataError, MetadataItem, OrderMetadata};
pub use types::*;
pub use webhook::{SignatureError, verify_signature};

const BASE_URL: &str = "https://api.stripe.com/v1";

/// Errors that can occur when interacting with the Stripe API.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by Stripe.
    #[error("Rate limited")]
    RateLimited,

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Parameters for creating or updating a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntentParams {
    /// Amount in cents
    pub amount: i64,
    pub currency: String,
    pub shipping: Option<ShippingDetails>,
    pub receipt_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl PaymentIntentParams {
    fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), self.amount.to_string()),
            ("currency".to_string(), self.currency.clone()),
        ];
        if let Some(shipping) = &self.shipping {
            push_shipping(&mut form, "shipping", shipping);
        }
        if let Some(email) = &self.receipt_email {
            form.push(("receipt_email".to_string(), email.clone()));
        }
        push_metadata(&mut form, "metadata", &self.metadata);
        form
    }
}

/// One line of a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLineItem {
    pub name: String,
    /// Unit price in cents
    pub unit_amount: i64,
    pub quantity: u32,
    pub image: Option<String>,
}

/// A fixed shipping option offered on the hosted page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutShippingOption {
    pub display_name: String,
    /// Amount in cents
    pub amount: i64,
    pub min_days: Option<u32>,
    pub max_days: Option<u32>,
}

/// Parameters for creating a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionParams {
    pub currency: String,
    pub line_items: Vec<CheckoutLineItem>,
    pub shipping_option: Option<CheckoutShippingOption>,
    pub allowed_countries: Vec<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    /// Copied onto the payment intent the session creates
    pub payment_metadata: BTreeMap<String, String>,
}

impl CheckoutSessionParams {
    fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];

        for (i, item) in self.line_items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
            form.push((
                format!("{prefix}[price_data][currency]"),
                self.currency.clone(),
            ));
            form.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount.to_string(),
            ));
            form.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
            if let Some(image) = &item.image {
                form.push((
                    format!("{prefix}[price_data][product_data][images][0]"),
                    image.clone(),
                ));
            }
        }

        for (i, country) in self.allowed_countries.iter().enumerate() {
            form.push((
                format!("shipping_address_collection[allowed_countries][{i}]"),
                country.clone(),
            ));
        }

        if let Some(option) = &self.shipping_option {
            let prefix = "shipping_options[0][shipping_rate_data]";
            form.push((format!("{prefix}[type]"), "fixed_amount".to_string()));
            form.push((format!("{prefix}[display_name]"), option.display_name.clone()));
            form.push((
                format!("{prefix}[fixed_amount][amount]"),
                option.amount.to_string(),
            ));
            form.push((
                format!("{prefix}[fixed_amount][currency]"),
                self.currency.clone(),
            ));
            if let Some(min) = option.min_days {
                form.push((
                    format!("{prefix}[delivery_estimate][minimum][unit]"),
                    "business_day".to_string(),
                ));
                form.push((
                    format!("{prefix}[delivery_estimate][minimum][value]"),
                    min.to_string(),
                ));
            }
            if let Some(max) = option.max_days {
                form.push((
                    format!("{prefix}[delivery_estimate][maximum][unit]"),
                    "business_day".to_string(),
                ));
                form.push((
                    format!("{prefix}[delivery_estimate][maximum][value]"),
                    max.to_string(),
                ));
            }
        }

        if let Some(email) = &self.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }
        push_metadata(&mut form, "payment_intent_data[metadata]", &self.payment_metadata);
        form
    }
}

fn push_metadata(form: &mut Vec<(String, String)>, prefix: &str, map: &BTreeMap<String, String>) {
    for (key, value) in map {
        form.push((format!("{prefix}[{key}]"), value.clone()));
    }
}

fn push_shipping(form: &mut Vec<(String, String)>, prefix: &str, shipping: &ShippingDetails) {
    if let Some(name) = &shipping.name {
        form.push((format!("{prefix}[name]"), name.clone()));
    }
    if let Some(phone) = &shipping.phone {
        form.push((format!("{prefix}[phone]"), phone.clone()));
    }
    let address = &shipping.address;
    for (field, value) in [
        ("line1", &address.line1),
        ("line2", &address.line2),
        ("city", &address.city),
        ("postal_code", &address.postal_code),
        ("state", &address.state),
        ("country", &address.country),
    ] {
        if let Some(value) = value {
            form.push((format!("{prefix}[address][{field}]"), value.clone()));
        }
    }
}

/// Payment operations used by checkout and order reconciliation.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent with automatic payment methods.
    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
    ) -> Result<PaymentIntent, StripeError>;

    /// Update amount, shipping and metadata of an open payment intent.
    async fn update_payment_intent(
        &self,
        id: &str,
        params: &PaymentIntentParams,
    ) -> Result<PaymentIntent, StripeError>;

    /// Retrieve a payment intent with its latest charge expanded.
    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, StripeError>;

    /// Create a hosted checkout session.
    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<CheckoutSession, StripeError>;

    /// Retrieve a hosted checkout session.
    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, StripeError>;
}

/// Client for the Stripe REST API.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    /// Create a new Stripe API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(StripeClientInner {
                client,
                base_url: BASE_URL.to_string(),
                secret_key: config.secret_key.expose_secret().to_string(),
            }),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, StripeError> {
        let response = self
            .inner
            .client
            .post(format!("{}{path}", self.inner.base_url))
            .bearer_auth(&self.inner.secret_key)
            .form(form)
            .send()
            .await?;
        Self::handle(path, response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, StripeError> {
        let response = self
            .inner
            .client
            .get(format!("{}{path}", self.inner.base_url))
            .bearer_auth(&self.inner.secret_key)
            .query(query)
            .send()
            .await?;
        Self::handle(path, response).await
    }

    async fn handle<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(StripeError::RateLimited);
        }

        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body).map_or_else(
                |_| body.chars().take(200).collect(),
                |envelope| {
                    let error = envelope.error;
                    format!(
                        "{} ({})",
                        error.message.unwrap_or_default(),
                        error.code.or(error.kind).unwrap_or_default()
                    )
                },
            );
            tracing::error!(
                status = %status,
                path,
                message = %message,
                "Stripe API returned non-success status"
            );
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(StripeError::NotFound(path.to_string()));
            }
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse Stripe response"
            );
            StripeError::Parse(e.to_string())
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self, params), fields(amount = params.amount))]
    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
    ) -> Result<PaymentIntent, StripeError> {
        let mut form = params.to_form();
        form.push((
            "automatic_payment_methods[enabled]".to_string(),
            "true".to_string(),
        ));
        self.post("/payment_intents", &form).await
    }

    #[instrument(skip(self, params), fields(amount = params.amount))]
    async fn update_payment_intent(
        &self,
        id: &str,
        params: &PaymentIntentParams,
    ) -> Result<PaymentIntent, StripeError> {
        self.post(&format!("/payment_intents/{id}"), &params.to_form())
            .await
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, StripeError> {
        self.get(
            &format!("/payment_intents/{id}"),
            &[("expand[]", "latest_charge")],
        )
        .await
    }

    #[instrument(skip(self, params), fields(lines = params.line_items.len()))]
    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<CheckoutSession, StripeError> {
        self.post("/checkout/sessions", &params.to_form()).await
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, StripeError> {
        self.get(&format!("/checkout/sessions/{id}"), &[]).await
    }
}
