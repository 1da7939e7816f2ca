//! Transactional email.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and plain text
//! templates.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use okapi_core::format_euro_price;

use crate::config::EmailConfig;
use crate::models::OrderWithItems;

/// One rendered order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationLine {
    pub name: String,
    pub quantity: u32,
    pub total: String,
}

/// Everything the confirmation email shows, already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    pub to: String,
    pub order_id: String,
    pub customer_name: String,
    pub lines: Vec<ConfirmationLine>,
    pub subtotal: String,
    pub shipping: String,
    pub shipping_method: Option<String>,
    pub total: String,
    pub address_lines: Vec<String>,
    pub order_url: String,
}

impl OrderConfirmation {
    /// Build the confirmation for a stored order.
    #[must_use]
    pub fn new(order: &OrderWithItems, base_url: &str) -> Self {
        let o = &order.order;
        let address = &o.shipping_address;
        let mut address_lines = vec![address.name.clone(), address.line1.clone()];
        address_lines.extend(address.line2.clone());
        address_lines.push(
            format!(
                "{} {} {}",
                address.postal_code,
                address.city,
                address.state.as_deref().unwrap_or_default()
            )
            .trim_end()
            .to_string(),
        );
        address_lines.push(address.country.clone());

        Self {
            to: o.email.to_string(),
            order_id: o.id.to_string(),
            customer_name: address
                .name
                .split_whitespace()
                .next()
                .unwrap_or("there")
                .to_string(),
            lines: order
                .items
                .iter()
                .map(|item| ConfirmationLine {
                    name: item.name.clone(),
                    quantity: item.quantity,
                    total: format_euro_price(item.line_total()),
                })
                .collect(),
            subtotal: format_euro_price(o.subtotal),
            shipping: format_euro_price(o.shipping),
            shipping_method: o.shipping_method.clone(),
            total: format_euro_price(o.total),
            address_lines,
            order_url: format!("{base_url}/orders/{}?email={}", o.id, o.email),
        }
    }
}

/// HTML template for the order confirmation.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    order_id: &'a str,
    customer_name: &'a str,
    lines: &'a [ConfirmationLine],
    subtotal: &'a str,
    shipping: &'a str,
    shipping_method: Option<&'a str>,
    total: &'a str,
    address_lines: &'a [String],
    order_url: &'a str,
}

/// Plain text template for the order confirmation.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    order_id: &'a str,
    customer_name: &'a str,
    lines: &'a [ConfirmationLine],
    subtotal: &'a str,
    shipping: &'a str,
    shipping_method: Option<&'a str>,
    total: &'a str,
    address_lines: &'a [String],
    order_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Sends customer-facing email.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the order confirmation.
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), EmailError>;
}

/// SMTP-backed [`Mailer`].
#[derive(Clone)]
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// Create a new mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), EmailError> {
        let (html, text) = render_confirmation(confirmation)?;
        self.send_multipart_email(
            &confirmation.to,
            &format!("Your Okapi Store order #{}", confirmation.order_id),
            text,
            html,
        )
        .await
    }
}

/// Render the HTML and plain text bodies.
fn render_confirmation(c: &OrderConfirmation) -> Result<(String, String), askama::Error> {
    let html = OrderConfirmationHtml {
        order_id: &c.order_id,
        customer_name: &c.customer_name,
        lines: &c.lines,
        subtotal: &c.subtotal,
        shipping: &c.shipping,
        shipping_method: c.shipping_method.as_deref(),
        total: &c.total,
        address_lines: &c.address_lines,
        order_url: &c.order_url,
    }
    .render()?;
    let text = OrderConfirmationText {
        order_id: &c.order_id,
        customer_name: &c.customer_name,
        lines: &c.lines,
        subtotal: &c.subtotal,
        shipping: &c.shipping,
        shipping_method: c.shipping_method.as_deref(),
        total: &c.total,
        address_lines: &c.address_lines,
        order_url: &c.order_url,
    }
    .render()?;
    Ok((html, text))
}
