//! Customer-facing order lookup.
//!
//! Local orders are merged with live Printful status. Printful being down
//! never hides an order: the fulfillment part is simply left empty.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{instrument, warn};

use okapi_core::OrderId;

use crate::db::{OrderStore, RepositoryError, UserStore};
use crate::models::{CurrentUser, Order, OrderWithItems};
use crate::printful::{FulfillmentGateway, PrintfulOrder};

/// Errors returned by order lookups.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found")]
    NotFound,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// An order with its live fulfillment status.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderWithItems,
    pub fulfillment: Option<PrintfulOrder>,
}

/// Result of a lookup.
#[derive(Debug, Clone)]
pub struct OrderLookup {
    pub detail: OrderDetail,
    /// Set when the visitor proved ownership by email and should be
    /// remembered as the order's owner.
    pub bind: Option<CurrentUser>,
}

/// Read access to a customer's orders.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    users: Arc<dyn UserStore>,
    fulfillment: Arc<dyn FulfillmentGateway>,
}

impl OrderService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        users: Arc<dyn UserStore>,
        fulfillment: Arc<dyn FulfillmentGateway>,
    ) -> Self {
        Self {
            orders,
            users,
            fulfillment,
        }
    }

    /// Look up an order for the session user or by email.
    ///
    /// Orders the visitor may not see are reported as missing.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` for unknown or inaccessible orders.
    #[instrument(skip(self, viewer, email), fields(order_id = %id))]
    pub async fn lookup(
        &self,
        id: OrderId,
        viewer: Option<&CurrentUser>,
        email: Option<&str>,
    ) -> Result<OrderLookup, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;

        let owned = viewer.is_some_and(|v| v.id == order.order.user_id);
        let email_match = email.is_some_and(|raw| order.order.email.matches(raw));
        if !owned && !email_match {
            return Err(OrderError::NotFound);
        }

        let bind = if owned {
            None
        } else {
            self.users
                .get(order.order.user_id)
                .await?
                .map(|user| CurrentUser {
                    id: user.id,
                    email: user.email,
                })
        };

        let fulfillment = self.fulfillment_status(&order.order).await;
        Ok(OrderLookup {
            detail: OrderDetail { order, fulfillment },
            bind,
        })
    }

    /// Orders of the session user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` on database failure.
    pub async fn list_for_user(&self, user: &CurrentUser) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_for_user(user.id).await?)
    }

    async fn fulfillment_status(&self, order: &Order) -> Option<PrintfulOrder> {
        let key = order.fulfillment_key()?;
        match self.fulfillment.get_order(&key).await {
            Ok(printful) => Some(printful),
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Printful status unavailable");
                None
            }
        }
    }
}
