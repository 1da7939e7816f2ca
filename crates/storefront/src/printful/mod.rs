//! Printful API client.
//!
//! Printful is the source of truth for products and fulfillment. The client
//! covers the store product, shipping rate and order endpoints; caching
//! happens one level up in [`crate::services::catalog`].

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;

use okapi_core::ProductId;

use crate::config::PrintfulConfig;

pub use types::*;

/// Page size for the store product list.
const PAGE_SIZE: u64 = 100;

/// Errors that can occur when interacting with the Printful API.
#[derive(Debug, Error)]
pub enum PrintfulError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by Printful.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Fulfillment operations used by the catalog, shipping and order flows.
#[async_trait]
pub trait FulfillmentGateway: Send + Sync {
    /// All store products, across pages.
    async fn list_products(&self) -> Result<Vec<SyncProductSummary>, PrintfulError>;

    /// One store product with its variants.
    async fn get_product(&self, id: ProductId) -> Result<SyncProductDetail, PrintfulError>;

    /// Quote shipping for a recipient and catalog variants.
    async fn shipping_rates(
        &self,
        request: &ShippingRateRequest,
    ) -> Result<Vec<ShippingRate>, PrintfulError>;

    /// Create a draft order.
    async fn create_order(&self, request: &OrderRequest) -> Result<PrintfulOrder, PrintfulError>;

    /// Fetch an order by Printful ID or `@external_id`.
    async fn get_order(&self, key: &str) -> Result<PrintfulOrder, PrintfulError>;
}

/// Client for the Printful REST API.
#[derive(Clone)]
pub struct PrintfulClient {
    inner: Arc<PrintfulClientInner>,
}

struct PrintfulClientInner {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    store_id: Option<String>,
}

impl PrintfulClient {
    /// Create a new Printful API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &PrintfulConfig) -> Result<Self, PrintfulError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(PrintfulClientInner {
                client,
                base_url: config.base_url.clone(),
                api_token: config.api_token.expose_secret().to_string(),
                store_id: config.store_id.clone(),
            }),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .inner
            .client
            .request(method, format!("{}{path}", self.inner.base_url))
            .bearer_auth(&self.inner.api_token);
        match &self.inner.store_id {
            Some(store_id) => builder.header("X-PF-Store-Id", store_id),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, PrintfulError> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        Self::handle(path, response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, PrintfulError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await?;
        Self::handle(path, response).await
    }

    async fn handle<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<Envelope<T>, PrintfulError> {
        let status = response.status();

        // Check for rate limiting
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(PrintfulError::RateLimited(retry_after));
        }

        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| {
                    envelope
                        .error
                        .and_then(|e| e.message)
                        .or_else(|| envelope.result.and_then(|r| r.as_str().map(String::from)))
                })
                .unwrap_or_else(|| body.chars().take(200).collect());
            tracing::error!(
                status = %status,
                path,
                message = %message,
                "Printful API returned non-success status"
            );
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(PrintfulError::NotFound(path.to_string()));
            }
            return Err(PrintfulError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse Printful response"
            );
            PrintfulError::Parse(e.to_string())
        })
    }
}

#[async_trait]
impl FulfillmentGateway for PrintfulClient {
    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Vec<SyncProductSummary>, PrintfulError> {
        let mut products = Vec::new();
        let mut offset = 0;
        loop {
            let page: Envelope<Vec<SyncProductSummary>> = self
                .get(&format!("/store/products?offset={offset}&limit={PAGE_SIZE}"))
                .await?;
            let fetched = !page.result.is_empty();
            products.extend(page.result);

            match page.paging {
                Some(paging) if fetched && paging.offset + paging.limit < paging.total => {
                    offset = paging.offset + paging.limit;
                }
                _ => break,
            }
        }
        Ok(products)
    }

    #[instrument(skip(self))]
    async fn get_product(&self, id: ProductId) -> Result<SyncProductDetail, PrintfulError> {
        let envelope: Envelope<SyncProductDetail> =
            self.get(&format!("/store/products/{id}")).await?;
        Ok(envelope.result)
    }

    #[instrument(skip(self, request), fields(country = %request.recipient.country_code))]
    async fn shipping_rates(
        &self,
        request: &ShippingRateRequest,
    ) -> Result<Vec<ShippingRate>, PrintfulError> {
        let envelope: Envelope<Vec<ShippingRate>> = self.post("/shipping/rates", request).await?;
        Ok(envelope.result)
    }

    #[instrument(skip(self, request), fields(external_id = %request.external_id))]
    async fn create_order(&self, request: &OrderRequest) -> Result<PrintfulOrder, PrintfulError> {
        let envelope: Envelope<PrintfulOrder> = self.post("/orders", request).await?;
        Ok(envelope.result)
    }

    #[instrument(skip(self))]
    async fn get_order(&self, key: &str) -> Result<PrintfulOrder, PrintfulError> {
        let envelope: Envelope<PrintfulOrder> = self.get(&format!("/orders/{key}")).await?;
        Ok(envelope.result)
    }
}
