//! Mailchimp API client for newsletter subscriptions.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use okapi_core::Email;

use crate::config::MailchimpConfig;

/// Errors that can occur when interacting with the Mailchimp API.
#[derive(Debug, Error)]
pub enum MailchimpError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The API key has no `-<datacenter>` suffix.
    #[error("API key has no datacenter suffix")]
    InvalidApiKey,
}

/// Outcome of a subscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    Subscribed,
    AlreadySubscribed,
}

/// A mailing list audience.
#[async_trait]
pub trait MailingList: Send + Sync {
    /// Subscribe an address. Existing members are not an error.
    async fn subscribe(&self, email: &Email) -> Result<Subscription, MailchimpError>;
}

/// Mailchimp error body (RFC 7807 problem details).
#[derive(Debug, Deserialize)]
struct Problem {
    title: Option<String>,
    detail: Option<String>,
}

/// Mailchimp Marketing API client.
#[derive(Clone)]
pub struct MailchimpClient {
    client: reqwest::Client,
    members_url: String,
    api_key: SecretString,
}

impl MailchimpClient {
    /// Create a new Mailchimp client.
    ///
    /// # Errors
    ///
    /// Returns error if the key has no datacenter suffix or the HTTP client
    /// fails to build.
    pub fn new(config: &MailchimpConfig) -> Result<Self, MailchimpError> {
        let datacenter = datacenter(config.api_key.expose_secret())
            .ok_or(MailchimpError::InvalidApiKey)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            members_url: format!(
                "https://{datacenter}.api.mailchimp.com/3.0/lists/{}/members",
                config.list_id
            ),
            api_key: config.api_key.clone(),
        })
    }
}

/// Datacenter from an API key such as `0123abcd-us21`.
fn datacenter(api_key: &str) -> Option<&str> {
    api_key
        .rsplit_once('-')
        .map(|(_, dc)| dc)
        .filter(|dc| !dc.is_empty() && dc.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[async_trait]
impl MailingList for MailchimpClient {
    #[tracing::instrument(skip(self, email), fields(domain = %email.domain()))]
    async fn subscribe(&self, email: &Email) -> Result<Subscription, MailchimpError> {
        let body = serde_json::json!({
            "email_address": email.as_str(),
            "status": "subscribed",
        });

        let response = self
            .client
            .post(&self.members_url)
            .basic_auth("anystring", Some(self.api_key.expose_secret()))
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            return Ok(Subscription::Subscribed);
        }

        let text = response.text().await.unwrap_or_default();
        let problem = serde_json::from_str::<Problem>(&text).ok();

        if status == reqwest::StatusCode::BAD_REQUEST
            && problem
                .as_ref()
                .and_then(|p| p.title.as_deref())
                .is_some_and(|title| title == "Member Exists")
        {
            return Ok(Subscription::AlreadySubscribed);
        }

        let message = problem
            .and_then(|p| p.detail)
            .unwrap_or_else(|| text.chars().take(200).collect());
        tracing::warn!(status = %status, message = %message, "Mailchimp subscribe failed");
        Err(MailchimpError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datacenter() {
        assert_eq!(datacenter("0123456789abcdef-us21"), Some("us21"));
        assert_eq!(datacenter("no-dash-at-all-us6"), Some("us6"));
        assert_eq!(datacenter("nodatacenter"), None);
        assert_eq!(datacenter("trailing-"), None);
    }

    #[test]
    fn test_client_url() {
        let client = MailchimpClient::new(&MailchimpConfig {
            api_key: SecretString::from("0123456789abcdef-us21"),
            list_id: "a1b2c3".to_string(),
        });
        assert!(matches!(
            client.map(|c| c.members_url),
            Ok(url) if url == "https://us21.api.mailchimp.com/3.0/lists/a1b2c3/members"
        ));
    }
}
