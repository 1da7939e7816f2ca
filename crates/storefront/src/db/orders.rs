//! Order repository.
//!
//! Orders are only ever inserted together with their items and the product
//! rows they reference, inside one transaction.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use okapi_core::{OrderId, OrderItemId, OrderStatus, ProductId, UserId, VariantId};

use super::{OrderStats, OrderStore, RepositoryError, parse_stored_email};
use crate::models::{NewOrder, Order, OrderItem, OrderWithItems, ShippingSnapshot};

const ORDER_COLUMNS: &str = "id, status, subtotal, shipping, total, amount_charged, \
     stripe_session_id, stripe_payment_id, printful_id, printful_order_id, user_id, email, \
     shipping_method, shipping_name, shipping_line1, shipping_line2, shipping_city, \
     shipping_postal_code, shipping_state, shipping_country, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, variant_id, name, quantity, price";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i32,
    status: OrderStatus,
    subtotal: Decimal,
    shipping: Decimal,
    total: Decimal,
    amount_charged: Decimal,
    stripe_session_id: Option<String>,
    stripe_payment_id: String,
    printful_id: Option<String>,
    printful_order_id: Option<i64>,
    user_id: i32,
    email: String,
    shipping_method: Option<String>,
    shipping_name: String,
    shipping_line1: String,
    shipping_line2: Option<String>,
    shipping_city: String,
    shipping_postal_code: String,
    shipping_state: Option<String>,
    shipping_country: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId::new(row.id),
            status: row.status,
            subtotal: row.subtotal,
            shipping: row.shipping,
            total: row.total,
            amount_charged: row.amount_charged,
            stripe_session_id: row.stripe_session_id,
            stripe_payment_id: row.stripe_payment_id,
            printful_id: row.printful_id,
            printful_order_id: row.printful_order_id,
            user_id: UserId::new(row.user_id),
            email: parse_stored_email(&row.email)?,
            shipping_method: row.shipping_method,
            shipping_address: ShippingSnapshot {
                name: row.shipping_name,
                line1: row.shipping_line1,
                line2: row.shipping_line2,
                city: row.shipping_city,
                postal_code: row.shipping_postal_code,
                state: row.shipping_state,
                country: row.shipping_country,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_id: i64,
    variant_id: i64,
    name: String,
    quantity: i32,
    price: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "negative quantity {} on order item {}",
                row.quantity, row.id
            ))
        })?;
        Ok(Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            variant_id: VariantId::new(row.variant_id),
            name: row.name,
            quantity,
            price: row.price,
        })
    }
}

/// Repository for order database operations.
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn items_for(&self, order: Order) -> Result<OrderWithItems, RepositoryError> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM okapi.order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order.id)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(OrderItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OrderWithItems { order, items })
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        id: OrderId,
    ) -> Result<Order, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM okapi.orders WHERE {clause}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(RepositoryError::NotFound).and_then(Order::try_from)
    }
}

/// Insert placeholder product rows for products not known locally.
///
/// Existing rows are left untouched; `okapi-cli catalog sync` owns updates.
async fn ensure_products(
    tx: &mut Transaction<'_, Postgres>,
    order: &NewOrder,
) -> Result<(), RepositoryError> {
    let mut seen = HashSet::new();
    for item in order.items.iter().filter(|i| seen.insert(i.product_id)) {
        sqlx::query(
            r"
            INSERT INTO okapi.products (id, name, price, image)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(item.product_id)
        .bind(&item.name)
        .bind(item.price)
        .bind(item.image.as_deref())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn get(&self, id: OrderId) -> Result<Option<OrderWithItems>, RepositoryError> {
        match self.fetch_one_where("id = $1", id).await {
            Ok(order) => self.items_for(order).await.map(Some),
            Err(RepositoryError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM okapi.orders WHERE stripe_payment_id = $1"
        ))
        .bind(payment_intent_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.items_for(Order::try_from(row)?).await.map(Some),
            None => Ok(None),
        }
    }

    async fn create_with_items(
        &self,
        order: &NewOrder,
    ) -> Result<OrderWithItems, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        ensure_products(&mut tx, order).await?;

        let row: OrderRow = sqlx::query_as(&format!(
            r"
            INSERT INTO okapi.orders (
                status, subtotal, shipping, total, amount_charged, stripe_session_id,
                stripe_payment_id, user_id, email, shipping_method, shipping_name,
                shipping_line1, shipping_line2, shipping_city, shipping_postal_code,
                shipping_state, shipping_country
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(OrderStatus::Pending)
        .bind(order.subtotal())
        .bind(order.shipping)
        .bind(order.total())
        .bind(order.amount_charged)
        .bind(order.stripe_session_id.as_deref())
        .bind(&order.stripe_payment_id)
        .bind(order.user_id)
        .bind(order.email.as_str())
        .bind(order.shipping_method.as_deref())
        .bind(&order.shipping_address.name)
        .bind(&order.shipping_address.line1)
        .bind(order.shipping_address.line2.as_deref())
        .bind(&order.shipping_address.city)
        .bind(&order.shipping_address.postal_code)
        .bind(order.shipping_address.state.as_deref())
        .bind(&order.shipping_address.country)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "order for this payment intent"))?;

        let created = Order::try_from(row)?;

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                RepositoryError::DataCorruption(format!("quantity {} out of range", item.quantity))
            })?;
            let row: OrderItemRow = sqlx::query_as(&format!(
                r"
                INSERT INTO okapi.order_items (order_id, product_id, variant_id, name, quantity, price)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {ITEM_COLUMNS}
                "
            ))
            .bind(created.id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(&item.name)
            .bind(quantity)
            .bind(item.price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(OrderItem::try_from(row)?);
        }

        tx.commit().await?;

        Ok(OrderWithItems {
            order: created,
            items,
        })
    }

    async fn attach_fulfillment(
        &self,
        id: OrderId,
        printful_id: &str,
        printful_order_id: Option<i64>,
    ) -> Result<Order, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r"
            UPDATE okapi.orders
            SET printful_id = $2, printful_order_id = $3, status = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(printful_id)
        .bind(printful_order_id)
        .bind(OrderStatus::Processing)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(RepositoryError::NotFound).and_then(Order::try_from)
    }

    async fn set_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r"
            UPDATE okapi.orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(RepositoryError::NotFound).and_then(Order::try_from)
    }

    async fn set_checkout_session(
        &self,
        id: OrderId,
        session_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE okapi.orders SET stripe_session_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM okapi.orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn list(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM okapi.orders
            WHERE ($1::okapi.order_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "
        ))
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        let by_status: Vec<(OrderStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM okapi.orders GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let revenue: Decimal = sqlx::query_scalar(
            r"
            SELECT COALESCE(SUM(total), 0) FROM okapi.orders
            WHERE status NOT IN ('refunded', 'failed')
            ",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OrderStats { by_status, revenue })
    }
}
