//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `STRIPE_SECRET_KEY` - Stripe secret API key (`sk_...`)
//! - `STRIPE_WEBHOOK_SECRET` - Stripe webhook signing secret (`whsec_...`)
//! - `PRINTFUL_API_TOKEN` - Printful private token
//! - `ADMIN_API_TOKEN` - Bearer token for the admin dashboard API (high entropy)
//! - `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD` - SMTP relay for order emails
//! - `EMAIL_FROM` - Sender address for order emails
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STRIPE_WEBHOOK_TOLERANCE_SECS` - Accepted webhook clock skew (default: 300)
//! - `PRINTFUL_STORE_ID` - Printful store ID (needed for multi-store tokens)
//! - `PRINTFUL_API_URL` - Printful API base URL (default: `https://api.printful.com`)
//! - `SMTP_PORT` - SMTP port (default: 587)
//! - `MAILCHIMP_API_KEY`, `MAILCHIMP_LIST_ID` - Newsletter audience (disabled when absent)
//! - `SHIPPING_ALLOWED_COUNTRIES` - Comma-separated ISO codes (default: BE,NL,LU,FR,DE)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use okapi_core::AllowedCountries;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_ADMIN_TOKEN_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Bearer token guarding `/admin/api`
    pub admin_token: SecretString,
    /// Stripe configuration
    pub stripe: StripeConfig,
    /// Printful configuration
    pub printful: PrintfulConfig,
    /// SMTP configuration for order emails
    pub email: EmailConfig,
    /// Mailchimp configuration (newsletter disabled when `None`)
    pub mailchimp: Option<MailchimpConfig>,
    /// Countries the store ships to
    pub allowed_countries: AllowedCountries,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
}

/// Stripe API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key
    pub secret_key: SecretString,
    /// Webhook endpoint signing secret
    pub webhook_secret: SecretString,
    /// Maximum accepted age of a webhook signature timestamp, in seconds
    pub webhook_tolerance_secs: i64,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .finish()
    }
}

/// Printful API configuration.
#[derive(Clone)]
pub struct PrintfulConfig {
    /// Private token (bearer)
    pub api_token: SecretString,
    /// Store ID sent as `X-PF-Store-Id`
    pub store_id: Option<String>,
    /// API base URL
    pub base_url: String,
}

impl std::fmt::Debug for PrintfulConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintfulConfig")
            .field("api_token", &"[REDACTED]")
            .field("store_id", &self.store_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// SMTP configuration for transactional email.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Mailchimp audience configuration.
#[derive(Clone)]
pub struct MailchimpConfig {
    /// API key; the datacenter is the suffix after the last `-`
    pub api_key: SecretString,
    /// Audience (list) ID
    pub list_id: String,
}

impl std::fmt::Debug for MailchimpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailchimpConfig")
            .field("api_key", &"[REDACTED]")
            .field("list_id", &self.list_id)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = database_url_from_env()?;
        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_string(), e.to_string())
        })?;

        let admin_token = get_validated_secret("ADMIN_API_TOKEN")?;
        validate_min_length(&admin_token, "ADMIN_API_TOKEN", MIN_ADMIN_TOKEN_LENGTH)?;

        let allowed_countries = AllowedCountries::parse_list(&get_env_or_default(
            "SHIPPING_ALLOWED_COUNTRIES",
            AllowedCountries::DEFAULT,
        ))
        .map_err(|e| {
            ConfigError::InvalidEnvVar("SHIPPING_ALLOWED_COUNTRIES".to_string(), e.to_string())
        })?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            admin_token,
            stripe: StripeConfig::from_env()?,
            printful: PrintfulConfig::from_env()?,
            email: EmailConfig::from_env()?,
            mailchimp: MailchimpConfig::from_env()?,
            allowed_countries,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret_key = get_prefixed_secret("STRIPE_SECRET_KEY", &["sk_", "rk_"])?;
        let webhook_secret = get_prefixed_secret("STRIPE_WEBHOOK_SECRET", &["whsec_"])?;
        Ok(Self {
            secret_key,
            webhook_secret,
            webhook_tolerance_secs: parse_env("STRIPE_WEBHOOK_TOLERANCE_SECS", "300")?,
        })
    }
}

impl PrintfulConfig {
    /// Load the Printful settings on their own (used by `okapi-cli catalog sync`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the token is missing or looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_token: get_validated_secret("PRINTFUL_API_TOKEN")?,
            store_id: get_optional_env("PRINTFUL_STORE_ID"),
            base_url: get_env_or_default("PRINTFUL_API_URL", "https://api.printful.com")
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            smtp_host: get_required_env("SMTP_HOST")?,
            smtp_port: parse_env("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("EMAIL_FROM")?,
        })
    }
}

impl MailchimpConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        match (
            get_optional_env("MAILCHIMP_API_KEY"),
            get_optional_env("MAILCHIMP_LIST_ID"),
        ) {
            (Some(api_key), Some(list_id)) => {
                if !api_key.contains('-') {
                    return Err(ConfigError::InvalidEnvVar(
                        "MAILCHIMP_API_KEY".to_string(),
                        "missing datacenter suffix (e.g. -us21)".to_string(),
                    ));
                }
                Ok(Some(Self {
                    api_key: SecretString::from(api_key),
                    list_id,
                }))
            }
            (None, None) => Ok(None),
            (Some(_), None) => Err(ConfigError::MissingEnvVar("MAILCHIMP_LIST_ID".to_string())),
            (None, Some(_)) => Err(ConfigError::MissingEnvVar("MAILCHIMP_API_KEY".to_string())),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// The storefront database URL (`STOREFRONT_DATABASE_URL`, then `DATABASE_URL`).
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    get_database_url("STOREFRONT_DATABASE_URL")
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Load a secret that must start with one of the given prefixes.
fn get_prefixed_secret(key: &str, prefixes: &[&str]) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    if !prefixes.iter().any(|p| value.starts_with(p)) {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a value starting with one of {prefixes:?}"),
        ));
    }
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

/// Validate that a secret meets minimum length requirements.
fn validate_min_length(
    secret: &SecretString,
    var_name: &str,
    min_length: usize,
) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < min_length {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {min_length} characters (got {})",
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
