//! Turns Stripe webhook events into local orders and Printful drafts.
//!
//! `stripe_payment_id` is unique, so every event for a payment resolves to
//! the same order row. An order without a Printful id is an attempt that
//! failed after the local write; redelivery resumes it at the Printful step.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use okapi_core::{Email, OrderId, OrderStatus, UserId, from_cents};

use super::email::{Mailer, OrderConfirmation};
use crate::db::{OrderStore, RepositoryError, UserStore};
use crate::models::order::fulfillment_key;
use crate::models::{NewOrder, NewOrderItem, Order, OrderWithItems, ShippingSnapshot, User};
use crate::printful::{
    FulfillmentGateway, OrderItemRequest, OrderRequest, PrintfulError, Recipient, RetailCosts,
};
use crate::stripe::{
    Event, MetadataError, OrderMetadata, PaymentGateway, PaymentIntent, PaymentIntentStatus,
    ShippingDetails, StripeError,
};

/// Errors that make the webhook fail so that Stripe retries.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Stripe error: {0}")]
    Stripe(#[from] StripeError),
    #[error("Printful error: {0}")]
    Fulfillment(#[from] PrintfulError),
    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Unreadable payment metadata: {0}")]
    Metadata(#[from] MetadataError),
    #[error("Payment {0} has no shipping address")]
    MissingShipping(String),
    #[error("Payment {0} has no usable email address")]
    MissingEmail(String),
    #[error("Event {0} has no object id")]
    MissingObject(String),
}

/// What handling an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new order was created and sent to Printful.
    Created(OrderId),
    /// An earlier partial attempt was completed.
    Resumed(OrderId),
    /// The payment was already fully reconciled.
    Duplicate(OrderId),
    /// An existing order changed status.
    StatusChanged(OrderId, OrderStatus),
    /// Nothing to do for this event.
    Ignored,
}

/// Handles Stripe events for orders.
#[derive(Clone)]
pub struct OrderReconciler {
    payments: Arc<dyn PaymentGateway>,
    fulfillment: Arc<dyn FulfillmentGateway>,
    orders: Arc<dyn OrderStore>,
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    base_url: String,
}

impl OrderReconciler {
    #[must_use]
    pub fn new(
        payments: Arc<dyn PaymentGateway>,
        fulfillment: Arc<dyn FulfillmentGateway>,
        orders: Arc<dyn OrderStore>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            payments,
            fulfillment,
            orders,
            users,
            mailer,
            base_url: base_url.into(),
        }
    }

    /// Dispatch a verified event.
    ///
    /// # Errors
    ///
    /// Any error before the order is fully reconciled. Confirmation email
    /// failures are logged, not returned.
    #[instrument(skip_all, fields(event_id = %event.id, kind = %event.kind))]
    pub async fn handle_event(&self, event: &Event) -> Result<Outcome, ReconcileError> {
        let object_id = || {
            event
                .object_id()
                .ok_or_else(|| ReconcileError::MissingObject(event.id.clone()))
        };

        match event.kind.as_str() {
            "payment_intent.succeeded" => self.reconcile_payment(object_id()?, None).await,
            "checkout.session.completed" => {
                let session_id = object_id()?;
                let payment_intent = match event.object_str("payment_intent") {
                    Some(id) => Some(id.to_string()),
                    None => {
                        self.payments
                            .retrieve_checkout_session(session_id)
                            .await?
                            .payment_intent
                    }
                };
                match payment_intent {
                    Some(payment_intent) => {
                        self.reconcile_payment(&payment_intent, Some(session_id))
                            .await
                    }
                    None => {
                        warn!(session = %session_id, "Checkout session has no payment intent");
                        Ok(Outcome::Ignored)
                    }
                }
            }
            "payment_intent.payment_failed" => {
                self.mark_payment(object_id()?, OrderStatus::Failed).await
            }
            "charge.refunded" => match event.object_str("payment_intent") {
                Some(payment_intent) => {
                    self.mark_payment(payment_intent, OrderStatus::Refunded)
                        .await
                }
                None => {
                    warn!("Refunded charge has no payment intent");
                    Ok(Outcome::Ignored)
                }
            },
            other => {
                debug!(kind = %other, "Ignoring unhandled event type");
                Ok(Outcome::Ignored)
            }
        }
    }

    /// Produce exactly one reconciled order for a succeeded payment.
    #[instrument(skip(self))]
    async fn reconcile_payment(
        &self,
        payment_intent_id: &str,
        session_id: Option<&str>,
    ) -> Result<Outcome, ReconcileError> {
        if let Some(existing) = self.orders.find_by_payment_intent(payment_intent_id).await? {
            return self.resume(existing, session_id).await;
        }

        let intent = self.payments.retrieve_payment_intent(payment_intent_id).await?;
        if intent.status != PaymentIntentStatus::Succeeded {
            info!(status = ?intent.status, "Payment not succeeded yet, waiting for its own event");
            return Ok(Outcome::Ignored);
        }

        let metadata = OrderMetadata::from_metadata(&intent.metadata)?;
        let (shipping, email) = self.buyer(&intent, session_id).await?;
        let user = self.resolve_user(metadata.user_id, &email).await?;
        let new_order = build_order(&intent, &metadata, session_id, user.id, email, &shipping)?;

        let order = match self.orders.create_with_items(&new_order).await {
            Ok(order) => order,
            Err(RepositoryError::Conflict(_)) => {
                // Another delivery of this payment won the insert
                let existing = self
                    .orders
                    .find_by_payment_intent(payment_intent_id)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                info!(order_id = %existing.order.id, "Concurrent delivery already created the order");
                return Ok(Outcome::Duplicate(existing.order.id));
            }
            Err(e) => return Err(e.into()),
        };

        let id = order.order.id;
        info!(order_id = %id, user_id = %user.id, "Order created");
        if order.order.amount_charged != order.order.total {
            warn!(
                order_id = %id,
                total = %order.order.total,
                charged = %order.order.amount_charged,
                "Order total differs from the charged amount"
            );
        }

        self.fulfill(order, false).await?;
        Ok(Outcome::Created(id))
    }

    /// Handle a payment that already has an order.
    async fn resume(
        &self,
        existing: OrderWithItems,
        session_id: Option<&str>,
    ) -> Result<Outcome, ReconcileError> {
        let id = existing.order.id;
        if let Some(session_id) = session_id
            && existing.order.stripe_session_id.is_none()
        {
            self.orders.set_checkout_session(id, session_id).await?;
        }

        if existing.order.is_fulfilled() {
            debug!(order_id = %id, "Payment already reconciled");
            return Ok(Outcome::Duplicate(id));
        }

        info!(order_id = %id, "Resuming order without Printful id");
        self.fulfill(existing, true).await?;
        Ok(Outcome::Resumed(id))
    }

    /// Create the Printful draft, record it and send the confirmation.
    ///
    /// A resumed order may already exist at Printful if only the local
    /// update failed, so it is looked up by external id first.
    async fn fulfill(&self, order: OrderWithItems, resumed: bool) -> Result<(), ReconcileError> {
        let external_id = order.order.id.to_string();

        let existing = if resumed {
            match self
                .fulfillment
                .get_order(&fulfillment_key(&external_id))
                .await
            {
                Ok(found) => Some(found),
                Err(PrintfulError::NotFound(_)) => None,
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        let printful = match existing {
            Some(found) => found,
            None => {
                self.fulfillment
                    .create_order(&fulfillment_request(&order))
                    .await?
            }
        };

        let updated = self
            .orders
            .attach_fulfillment(order.order.id, &external_id, Some(printful.id))
            .await?;
        info!(order_id = %updated.id, printful_order = printful.id, "Order sent to Printful");

        let confirmed = OrderWithItems {
            order: updated,
            items: order.items,
        };
        let confirmation = OrderConfirmation::new(&confirmed, &self.base_url);
        if let Err(e) = self.mailer.send_order_confirmation(&confirmation).await {
            error!(order_id = %confirmed.order.id, error = %e, "Failed to send order confirmation");
        }
        Ok(())
    }

    /// Shipping address and email for the payment.
    ///
    /// Hosted checkout collects the address on the session rather than the
    /// payment intent.
    async fn buyer(
        &self,
        intent: &PaymentIntent,
        session_id: Option<&str>,
    ) -> Result<(ShippingDetails, Email), ReconcileError> {
        let session = match session_id {
            Some(session_id) if intent.shipping.is_none() || intent.billing_email().is_none() => {
                Some(self.payments.retrieve_checkout_session(session_id).await?)
            }
            _ => None,
        };

        let shipping = intent
            .shipping
            .clone()
            .or_else(|| session.as_ref().and_then(|s| s.shipping().cloned()))
            .ok_or_else(|| ReconcileError::MissingShipping(intent.id.clone()))?;

        let email = intent
            .billing_email()
            .or_else(|| {
                session
                    .as_ref()
                    .and_then(|s| s.customer_details.as_ref())
                    .and_then(|c| c.email.as_deref())
            })
            .and_then(|raw| Email::parse(raw).ok())
            .ok_or_else(|| ReconcileError::MissingEmail(intent.id.clone()))?;

        Ok((shipping, email))
    }

    /// The owner of a new order: the session user, an account with the
    /// billing email, or a new guest.
    async fn resolve_user(
        &self,
        user_id: Option<UserId>,
        email: &Email,
    ) -> Result<User, ReconcileError> {
        if let Some(id) = user_id {
            match self.users.get(id).await? {
                Some(user) => return Ok(user),
                None => warn!(user_id = %id, "Metadata references unknown user"),
            }
        }
        if let Some(user) = self.users.find_by_email(email).await? {
            return Ok(user);
        }
        Ok(self.users.get_or_create_guest(email).await?)
    }

    /// Move the order for a payment to `status`, if there is one.
    #[instrument(skip(self))]
    async fn mark_payment(
        &self,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> Result<Outcome, ReconcileError> {
        let Some(existing) = self.orders.find_by_payment_intent(payment_intent_id).await? else {
            info!("No order for payment, nothing to update");
            return Ok(Outcome::Ignored);
        };
        let order: Order = existing.order;

        if order.status == status {
            return Ok(Outcome::Ignored);
        }
        if !order.status.can_transition_to(status) {
            warn!(order_id = %order.id, from = %order.status, to = %status, "Ignoring status change");
            return Ok(Outcome::Ignored);
        }

        let updated = self.orders.set_status(order.id, status).await?;
        info!(order_id = %updated.id, status = %status, "Order status updated from payment event");
        Ok(Outcome::StatusChanged(updated.id, status))
    }
}

/// The local order for a succeeded payment.
fn build_order(
    intent: &PaymentIntent,
    metadata: &OrderMetadata,
    session_id: Option<&str>,
    user_id: UserId,
    email: Email,
    shipping: &ShippingDetails,
) -> Result<NewOrder, ReconcileError> {
    let address = &shipping.address;
    let required = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .ok_or_else(|| ReconcileError::MissingShipping(intent.id.clone()))
    };

    let shipping_address = ShippingSnapshot {
        name: shipping
            .name
            .clone()
            .or_else(|| intent.billing_name().map(String::from))
            .unwrap_or_default(),
        line1: required(&address.line1)?,
        line2: address.line2.clone().filter(|l| !l.trim().is_empty()),
        city: required(&address.city)?,
        postal_code: required(&address.postal_code)?,
        state: address.state.clone().filter(|s| !s.trim().is_empty()),
        country: required(&address.country)?.to_ascii_uppercase(),
    };

    Ok(NewOrder {
        user_id,
        email,
        stripe_payment_id: intent.id.clone(),
        stripe_session_id: session_id.map(String::from),
        shipping: from_cents(metadata.shipping_amount),
        amount_charged: from_cents(intent.amount),
        shipping_method: metadata.shipping_method.clone(),
        shipping_address,
        items: metadata
            .items
            .iter()
            .map(|item| NewOrderItem {
                product_id: item.product_id,
                variant_id: item.variant_id,
                name: item.name.clone(),
                quantity: item.quantity,
                price: item.price,
                image: item.image.clone(),
            })
            .collect(),
    })
}

/// The Printful draft for a stored order.
fn fulfillment_request(order: &OrderWithItems) -> OrderRequest {
    let o = &order.order;
    let address = &o.shipping_address;
    OrderRequest {
        external_id: o.id.to_string(),
        shipping: o.shipping_method.clone(),
        recipient: Recipient {
            name: Some(address.name.clone()).filter(|n| !n.is_empty()),
            address1: address.line1.clone(),
            address2: address.line2.clone(),
            city: address.city.clone(),
            state_code: address.state.clone(),
            country_code: address.country.clone(),
            zip: address.postal_code.clone(),
            email: Some(o.email.to_string()),
        },
        items: order
            .items
            .iter()
            .map(|item| OrderItemRequest {
                sync_variant_id: item.variant_id,
                quantity: item.quantity,
                retail_price: item.price,
                name: item.name.clone(),
            })
            .collect(),
        retail_costs: RetailCosts {
            subtotal: o.subtotal,
            shipping: o.shipping,
            total: o.total,
        },
    }
}
