//! Back-office operations behind the admin API.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use okapi_core::{OrderId, OrderStatus};

use crate::db::{OrderStats, OrderStore, RepositoryError, ReviewStore};
use crate::models::{Order, OrderWithItems};

/// Upper bound for order listings.
pub const MAX_LIST_LIMIT: i64 = 200;

/// Default order listing size.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Errors returned by admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Order not found")]
    NotFound,
    #[error("Cannot move an order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// An order with its bookkeeping check.
#[derive(Debug, Clone, Serialize)]
pub struct AdminOrderView {
    #[serde(flatten)]
    pub order: OrderWithItems,
    pub stripe_payment_id: String,
    pub totals_consistent: bool,
}

/// Dashboard figures.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    #[serde(flatten)]
    pub orders: OrderStats,
    pub reviews: i64,
}

/// Admin access to orders and statistics.
#[derive(Clone)]
pub struct AdminService {
    orders: Arc<dyn OrderStore>,
    reviews: Arc<dyn ReviewStore>,
}

impl AdminService {
    #[must_use]
    pub fn new(orders: Arc<dyn OrderStore>, reviews: Arc<dyn ReviewStore>) -> Self {
        Self { orders, reviews }
    }

    /// Recent orders, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Repository` on database failure.
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: Option<i64>,
    ) -> Result<Vec<Order>, AdminError> {
        let limit = limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        Ok(self.orders.list(status, limit).await?)
    }

    /// One order with its consistency flag.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` for unknown orders.
    pub async fn order(&self, id: OrderId) -> Result<AdminOrderView, AdminError> {
        let order = self.orders.get(id).await?.ok_or(AdminError::NotFound)?;
        Ok(AdminOrderView {
            stripe_payment_id: order.order.stripe_payment_id.clone(),
            totals_consistent: order.totals_consistent(),
            order,
        })
    }

    /// Move an order to a new status.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::InvalidTransition` when leaving a terminal status.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, AdminError> {
        let current = self.orders.get(id).await?.ok_or(AdminError::NotFound)?;
        let from = current.order.status;
        if !from.can_transition_to(status) {
            return Err(AdminError::InvalidTransition { from, to: status });
        }
        let updated = self.orders.set_status(id, status).await?;
        info!(order_id = %id, from = %from, to = %status, "Order status changed by admin");
        Ok(updated)
    }

    /// Order counts, revenue and review count.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Repository` on database failure.
    pub async fn stats(&self) -> Result<DashboardStats, AdminError> {
        Ok(DashboardStats {
            orders: self.orders.stats().await?,
            reviews: self.reviews.count().await?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::testing::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, AdminService) {
        let store = Arc::new(MemoryStore::new());
        let service = AdminService::new(store.clone(), store.clone());
        (store, service)
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let (store, admin) = setup();
        let owner = store.insert_user("ada@example.com", false);
        let id = store.insert_order(owner, "ada@example.com", Some("1"));

        let shipped = admin.update_status(id, OrderStatus::Shipped).await.unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);

        admin.update_status(id, OrderStatus::Cancelled).await.unwrap();
        assert!(matches!(
            admin.update_status(id, OrderStatus::Processing).await,
            Err(AdminError::InvalidTransition { .. })
        ));
        assert!(matches!(
            admin.update_status(OrderId::new(404), OrderStatus::Shipped).await,
            Err(AdminError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_order_view_flags_charge_mismatch() {
        let (store, admin) = setup();
        let owner = store.insert_user("ada@example.com", false);
        let id = store.insert_order(owner, "ada@example.com", None);
        assert!(admin.order(id).await.unwrap().totals_consistent);

        store.set_amount_charged(id, Decimal::new(100, 2));
        assert!(!admin.order(id).await.unwrap().totals_consistent);
    }

    #[tokio::test]
    async fn test_stats_exclude_refunds_from_revenue() {
        let (store, admin) = setup();
        let owner = store.insert_user("ada@example.com", false);
        let kept = store.insert_order(owner, "ada@example.com", Some("1"));
        let refunded = store.insert_order(owner, "ada@example.com", Some("2"));
        admin.update_status(refunded, OrderStatus::Refunded).await.unwrap();

        let stats = admin.stats().await.unwrap();
        assert_eq!(stats.orders.revenue, Decimal::new(5495, 2));
        assert!(stats.orders.by_status.contains(&(OrderStatus::Refunded, 1)));
        assert_eq!(stats.reviews, 0);
        assert_eq!(admin.list_orders(None, None).await.unwrap().len(), 2);
        assert_eq!(
            admin
                .list_orders(Some(OrderStatus::Processing), Some(10))
                .await
                .unwrap()
                .iter()
                .map(|o| o.id)
                .collect::<Vec<_>>(),
            vec![kept]
        );
    }
}
