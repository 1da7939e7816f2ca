//! In-memory fakes of the gateway and store traits for service tests.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use okapi_core::{
    Email, OrderId, OrderItemId, OrderStatus, ProductId, ReviewId, UserId, VariantId,
};

use crate::config::{EmailConfig, PrintfulConfig, StorefrontConfig, StripeConfig};
use crate::db::{OrderStats, OrderStore, RepositoryError, ReviewStore, UserStore};
use crate::models::order::tests::sample_order;
use crate::models::{NewOrder, NewReview, Order, OrderItem, OrderWithItems, Review, User};
use crate::printful::{
    CatalogProductRef, FulfillmentGateway, OrderRequest, PrintfulError, PrintfulOrder,
    ShippingRate, ShippingRateRequest, SyncProductDetail, SyncProductSummary, SyncVariant,
};
use crate::services::email::{EmailError, Mailer, OrderConfirmation};
use crate::services::mailchimp::{MailchimpError, MailingList, Subscription};
use crate::services::shipping::tests::{address, tee_cart};
use crate::stripe::{
    CheckoutSession, CheckoutSessionParams, OrderMetadata, PaymentGateway, PaymentIntent,
    PaymentIntentParams, PaymentIntentStatus, StripeError,
};

// --- Printful ---

/// Printful with a small fixed catalog.
#[derive(Default)]
pub struct FakeFulfillment {
    products: Vec<SyncProductDetail>,
    orders: Mutex<Vec<(PrintfulOrder, Option<OrderRequest>)>>,
    last_rate_request: Mutex<Option<ShippingRateRequest>>,
    product_calls: AtomicUsize,
    total_calls: AtomicUsize,
    fail_rates: AtomicBool,
    fail_orders: AtomicBool,
    fail_lookups: AtomicBool,
}

fn variant(
    id: i64,
    product: i64,
    name: &str,
    catalog: i64,
    price: Decimal,
    size: Option<&str>,
) -> SyncVariant {
    SyncVariant {
        id: VariantId::new(id),
        external_id: None,
        sync_product_id: ProductId::new(product),
        name: name.to_string(),
        variant_id: catalog,
        retail_price: price,
        currency: Some("EUR".to_string()),
        is_ignored: false,
        sku: None,
        product: Some(CatalogProductRef {
            variant_id: catalog,
            product_id: 71,
            image: Some(format!("https://files.cdn.printful.com/{catalog}.png")),
            name: None,
        }),
        files: Vec::new(),
        size: size.map(String::from),
        color: Some("Black".to_string()),
        availability_status: Some("active".to_string()),
    }
}

fn product(id: i64, name: &str, ignored: bool, variants: Vec<SyncVariant>) -> SyncProductDetail {
    SyncProductDetail {
        sync_product: SyncProductSummary {
            id: ProductId::new(id),
            external_id: None,
            name: name.to_string(),
            variants: u32::try_from(variants.len()).unwrap(),
            synced: u32::try_from(variants.len()).unwrap(),
            thumbnail_url: Some(format!("https://files.cdn.printful.com/thumb-{id}.png")),
            is_ignored: ignored,
        },
        sync_variants: variants,
    }
}

impl FakeFulfillment {
    /// Tee (1) with three sizes, mug (2) and an ignored product (3).
    pub fn with_catalog() -> Self {
        Self {
            products: vec![
                product(
                    1,
                    "Okapi tee",
                    false,
                    vec![
                        variant(10, 1, "Okapi tee / S", 4010, Decimal::new(2500, 2), Some("S")),
                        variant(11, 1, "Okapi tee / M", 4011, Decimal::new(2500, 2), Some("M")),
                        variant(12, 1, "Okapi tee / XL", 4012, Decimal::new(2750, 2), Some("XL")),
                    ],
                ),
                product(
                    2,
                    "Okapi mug",
                    false,
                    vec![variant(20, 2, "Okapi mug", 1320, Decimal::new(1200, 2), None)],
                ),
                product(
                    3,
                    "Retired mug",
                    true,
                    vec![variant(30, 3, "Retired mug", 1320, Decimal::new(900, 2), None)],
                ),
            ],
            ..Self::default()
        }
    }

    pub fn product_calls(&self) -> usize {
        self.product_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn last_rate_request(&self) -> Option<ShippingRateRequest> {
        self.last_rate_request.lock().unwrap().clone()
    }

    pub fn created_orders(&self) -> Vec<OrderRequest> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, request)| request.clone())
            .collect()
    }

    pub fn fail_rates(&self) {
        self.fail_rates.store(true, Ordering::SeqCst);
    }

    pub fn fail_orders(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Seed an existing Printful order reachable under `key`.
    pub fn insert_order(&self, key: &str, status: &str) {
        let mut orders = self.orders.lock().unwrap();
        let id = 9000 + i64::try_from(orders.len()).unwrap();
        orders.push((
            PrintfulOrder {
                id,
                external_id: key.strip_prefix('@').map(String::from),
                status: status.to_string(),
                shipping: Some("STANDARD".to_string()),
                shipping_service_name: Some("Flat Rate".to_string()),
                created: Some(Utc::now()),
                shipments: Vec::new(),
            },
            None,
        ));
    }

    fn call(&self) {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn unavailable() -> PrintfulError {
        PrintfulError::Api {
            status: 500,
            message: "Printful is down".to_string(),
        }
    }
}

#[async_trait]
impl FulfillmentGateway for FakeFulfillment {
    async fn list_products(&self) -> Result<Vec<SyncProductSummary>, PrintfulError> {
        self.call();
        Ok(self
            .products
            .iter()
            .map(|p| p.sync_product.clone())
            .collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<SyncProductDetail, PrintfulError> {
        self.call();
        self.product_calls.fetch_add(1, Ordering::SeqCst);
        self.products
            .iter()
            .find(|p| p.sync_product.id == id)
            .cloned()
            .ok_or_else(|| PrintfulError::NotFound(format!("/store/products/{id}")))
    }

    async fn shipping_rates(
        &self,
        request: &ShippingRateRequest,
    ) -> Result<Vec<ShippingRate>, PrintfulError> {
        self.call();
        *self.last_rate_request.lock().unwrap() = Some(request.clone());
        if self.fail_rates.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(vec![
            ShippingRate {
                id: "EXPRESS".to_string(),
                name: "Express".to_string(),
                rate: Decimal::new(1290, 2),
                currency: "EUR".to_string(),
                min_delivery_days: Some(1),
                max_delivery_days: Some(2),
            },
            ShippingRate {
                id: "STANDARD".to_string(),
                name: "Flat Rate".to_string(),
                rate: Decimal::new(495, 2),
                currency: "EUR".to_string(),
                min_delivery_days: Some(3),
                max_delivery_days: Some(5),
            },
        ])
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<PrintfulOrder, PrintfulError> {
        self.call();
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let mut orders = self.orders.lock().unwrap();
        let order = PrintfulOrder {
            id: 9000 + i64::try_from(orders.len()).unwrap(),
            external_id: Some(request.external_id.clone()),
            status: "draft".to_string(),
            shipping: request.shipping.clone(),
            shipping_service_name: None,
            created: Some(Utc::now()),
            shipments: Vec::new(),
        };
        orders.push((order.clone(), Some(request.clone())));
        Ok(order)
    }

    async fn get_order(&self, key: &str) -> Result<PrintfulOrder, PrintfulError> {
        self.call();
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let orders = self.orders.lock().unwrap();
        let found = match key.strip_prefix('@') {
            Some(external) => orders
                .iter()
                .find(|(o, _)| o.external_id.as_deref() == Some(external)),
            None => orders
                .iter()
                .find(|(o, _)| key.parse::<i64>().is_ok_and(|id| id == o.id)),
        };
        found
            .map(|(o, _)| o.clone())
            .ok_or_else(|| PrintfulError::NotFound(format!("/orders/{key}")))
    }
}

// --- Stripe ---

#[derive(Default)]
struct PaymentsInner {
    intents: HashMap<String, PaymentIntent>,
    created: Vec<PaymentIntentParams>,
    updated: Vec<(String, i64)>,
    sessions: Vec<CheckoutSessionParams>,
    next_id: usize,
}

/// Stripe keeping intents in memory.
#[derive(Default)]
pub struct FakePayments {
    inner: Mutex<PaymentsInner>,
    calls: AtomicUsize,
}

fn intent_from_params(id: String, params: &PaymentIntentParams) -> PaymentIntent {
    PaymentIntent {
        client_secret: Some(format!("{id}_secret_test")),
        id,
        amount: params.amount,
        currency: params.currency.clone(),
        status: PaymentIntentStatus::RequiresPaymentMethod,
        metadata: params.metadata.clone().into_iter().collect(),
        shipping: params.shipping.clone(),
        receipt_email: params.receipt_email.clone(),
        latest_charge: None,
    }
}

impl FakePayments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn created_intents(&self) -> Vec<PaymentIntentParams> {
        self.inner.lock().unwrap().created.clone()
    }

    pub fn updated_intents(&self) -> Vec<(String, i64)> {
        self.inner.lock().unwrap().updated.clone()
    }

    pub fn created_sessions(&self) -> Vec<CheckoutSessionParams> {
        self.inner.lock().unwrap().sessions.clone()
    }

    pub fn set_status(&self, id: &str, status: PaymentIntentStatus) {
        if let Some(intent) = self.inner.lock().unwrap().intents.get_mut(id) {
            intent.status = status;
        }
    }

    /// Change what Stripe reports as charged, in cents.
    pub fn set_amount(&self, id: &str, amount: i64) {
        if let Some(intent) = self.inner.lock().unwrap().intents.get_mut(id) {
            intent.amount = amount;
        }
    }

    /// A succeeded payment for the test cart (tee x2, mug) with standard
    /// shipping, as the checkout would have created it.
    pub fn insert_succeeded_intent(&self, user_id: Option<UserId>) -> String {
        let metadata = OrderMetadata::from_cart(&tee_cart(), user_id, 495, Some("STANDARD".into()))
            .unwrap()
            .to_metadata()
            .unwrap();
        let params = PaymentIntentParams {
            amount: 6695,
            currency: "eur".to_string(),
            shipping: Some(address("BE").to_stripe()),
            receipt_email: Some("ada@example.com".to_string()),
            metadata,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = format!("pi_paid_{}", inner.next_id);
        let mut intent = intent_from_params(id.clone(), &params);
        intent.status = PaymentIntentStatus::Succeeded;
        inner.intents.insert(id.clone(), intent);
        id
    }

    fn call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
    ) -> Result<PaymentIntent, StripeError> {
        self.call();
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let intent = intent_from_params(format!("pi_test_{}", inner.next_id), params);
        inner.created.push(params.clone());
        inner.intents.insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn update_payment_intent(
        &self,
        id: &str,
        params: &PaymentIntentParams,
    ) -> Result<PaymentIntent, StripeError> {
        self.call();
        let mut inner = self.inner.lock().unwrap();
        let intent = inner
            .intents
            .get_mut(id)
            .ok_or_else(|| StripeError::NotFound(id.to_string()))?;
        intent.amount = params.amount;
        intent.metadata = params.metadata.clone().into_iter().collect();
        intent.shipping = params.shipping.clone();
        let updated = intent.clone();
        inner.updated.push((id.to_string(), params.amount));
        Ok(updated)
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, StripeError> {
        self.call();
        self.inner
            .lock()
            .unwrap()
            .intents
            .get(id)
            .cloned()
            .ok_or_else(|| StripeError::NotFound(id.to_string()))
    }

    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<CheckoutSession, StripeError> {
        self.call();
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = format!("cs_test_{}", inner.next_id);
        inner.sessions.push(params.clone());
        Ok(CheckoutSession {
            url: Some(format!("https://checkout.stripe.com/c/pay/{id}")),
            id,
            payment_intent: None,
            customer_details: None,
            collected_information: None,
            metadata: HashMap::new(),
        })
    }

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, StripeError> {
        self.call();
        Err(StripeError::NotFound(id.to_string()))
    }
}

// --- Email and newsletter ---

/// Mailer recording what it would have sent.
#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<OrderConfirmation>>,
    failing: AtomicBool,
}

impl FakeMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OrderConfirmation> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), EmailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmailError::InvalidAddress(confirmation.to.clone()));
        }
        self.sent.lock().unwrap().push(confirmation.clone());
        Ok(())
    }
}

/// Mailing list remembering its members.
#[derive(Default)]
pub struct FakeMailingList {
    members: Mutex<Vec<Email>>,
}

impl FakeMailingList {
    pub fn members(&self) -> Vec<Email> {
        self.members.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailingList for FakeMailingList {
    async fn subscribe(&self, email: &Email) -> Result<Subscription, MailchimpError> {
        let mut members = self.members.lock().unwrap();
        if members.contains(email) {
            return Ok(Subscription::AlreadySubscribed);
        }
        members.push(email.clone());
        Ok(Subscription::Subscribed)
    }
}

// --- Database ---

#[derive(Default)]
struct StoreInner {
    users: Vec<User>,
    orders: Vec<OrderWithItems>,
    reviews: Vec<Review>,
    next_user: i32,
    next_order: i32,
    next_item: i32,
    next_review: i32,
}

impl StoreInner {
    fn order_mut(&mut self, id: OrderId) -> Result<&mut OrderWithItems, RepositoryError> {
        self.orders
            .iter_mut()
            .find(|o| o.order.id == id)
            .ok_or(RepositoryError::NotFound)
    }

    fn add_user(&mut self, email: Email, is_guest: bool) -> User {
        self.next_user += 1;
        let now = Utc::now();
        let user = User {
            id: UserId::new(self.next_user),
            email,
            is_guest,
            created_at: now,
            updated_at: now,
        };
        self.users.push(user.clone());
        user
    }
}

/// Orders, users and reviews in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, email: &str, is_guest: bool) -> UserId {
        self.inner
            .lock()
            .unwrap()
            .add_user(Email::parse(email).unwrap(), is_guest)
            .id
    }

    pub fn user(&self, id: UserId) -> Option<User> {
        self.inner
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
    }

    /// A processing order like `sample_order` (tee x2, 54.95 total).
    pub fn insert_order(&self, owner: UserId, email: &str, printful_id: Option<&str>) -> OrderId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_order += 1;
        let id = OrderId::new(inner.next_order);

        let mut order = sample_order(printful_id);
        order.order.id = id;
        order.order.user_id = owner;
        order.order.email = Email::parse(email).unwrap();
        order.order.stripe_payment_id = format!("pi_seed_{id}");
        for item in &mut order.items {
            inner.next_item += 1;
            item.id = OrderItemId::new(inner.next_item);
            item.order_id = id;
        }
        inner.orders.push(order);
        id
    }

    pub fn order(&self, id: OrderId) -> Option<OrderWithItems> {
        self.inner
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| o.order.id == id)
            .cloned()
    }

    pub fn order_count(&self) -> usize {
        self.inner.lock().unwrap().orders.len()
    }

    pub fn set_amount_charged(&self, id: OrderId, amount: Decimal) {
        if let Ok(order) = self.inner.lock().unwrap().order_mut(id) {
            order.order.amount_charged = amount;
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get(&self, id: OrderId) -> Result<Option<OrderWithItems>, RepositoryError> {
        Ok(self.order(id))
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| o.order.stripe_payment_id == payment_intent_id)
            .cloned())
    }

    async fn create_with_items(
        &self,
        new: &NewOrder,
    ) -> Result<OrderWithItems, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .orders
            .iter()
            .any(|o| o.order.stripe_payment_id == new.stripe_payment_id)
        {
            return Err(RepositoryError::Conflict("order already exists".to_string()));
        }

        inner.next_order += 1;
        let id = OrderId::new(inner.next_order);
        let now = Utc::now();
        let mut items = Vec::new();
        for item in &new.items {
            inner.next_item += 1;
            items.push(OrderItem {
                id: OrderItemId::new(inner.next_item),
                order_id: id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                name: item.name.clone(),
                quantity: item.quantity,
                price: item.price,
            });
        }
        let order = OrderWithItems {
            order: Order {
                id,
                status: OrderStatus::Pending,
                subtotal: new.subtotal(),
                shipping: new.shipping,
                total: new.total(),
                amount_charged: new.amount_charged,
                stripe_session_id: new.stripe_session_id.clone(),
                stripe_payment_id: new.stripe_payment_id.clone(),
                printful_id: None,
                printful_order_id: None,
                user_id: new.user_id,
                email: new.email.clone(),
                shipping_method: new.shipping_method.clone(),
                shipping_address: new.shipping_address.clone(),
                created_at: now,
                updated_at: now,
            },
            items,
        };
        inner.orders.push(order.clone());
        Ok(order)
    }

    async fn attach_fulfillment(
        &self,
        id: OrderId,
        printful_id: &str,
        printful_order_id: Option<i64>,
    ) -> Result<Order, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let order = inner.order_mut(id)?;
        order.order.printful_id = Some(printful_id.to_string());
        order.order.printful_order_id = printful_order_id;
        order.order.status = OrderStatus::Processing;
        Ok(order.order.clone())
    }

    async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let order = inner.order_mut(id)?;
        order.order.status = status;
        Ok(order.order.clone())
    }

    async fn set_checkout_session(
        &self,
        id: OrderId,
        session_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        inner.order_mut(id)?.order.stripe_session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .orders
            .iter()
            .rev()
            .filter(|o| o.order.user_id == user_id)
            .map(|o| o.order.clone())
            .collect())
    }

    async fn list(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .orders
            .iter()
            .rev()
            .filter(|o| status.is_none_or(|s| o.order.status == s))
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|o| o.order.clone())
            .collect())
    }

    async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        let by_status = OrderStatus::ALL
            .into_iter()
            .filter_map(|status| {
                let count = inner
                    .orders
                    .iter()
                    .filter(|o| o.order.status == status)
                    .count();
                (count > 0).then(|| (status, i64::try_from(count).unwrap()))
            })
            .collect();
        let revenue = inner
            .orders
            .iter()
            .filter(|o| !matches!(o.order.status, OrderStatus::Refunded | OrderStatus::Failed))
            .map(|o| o.order.total)
            .sum();
        Ok(OrderStats { by_status, revenue })
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.user(id))
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| &u.email == email)
            .cloned())
    }

    async fn get_or_create_guest(&self, email: &Email) -> Result<User, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.iter().find(|u| &u.email == email) {
            return Ok(user.clone());
        }
        Ok(inner.add_user(email.clone(), true))
    }

    async fn promote_guest(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter_mut()
            .find(|u| &u.email == email)
            .map(|user| {
                user.is_guest = false;
                user.clone()
            }))
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn create(&self, review: &NewReview) -> Result<Review, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.reviews.iter().any(|r| {
            r.order_id == review.order_id
                && r.product_id == review.product_id
                && r.variant_id == review.variant_id
                && r.email == review.email
        }) {
            return Err(RepositoryError::Conflict("review already exists".to_string()));
        }
        inner.next_review += 1;
        let created = Review {
            id: ReviewId::new(inner.next_review),
            order_id: review.order_id,
            product_id: review.product_id,
            variant_id: review.variant_id,
            email: review.email.clone(),
            rating: review.rating,
            title: review.title.clone(),
            content: review.content.clone(),
            created_at: Utc::now(),
        };
        inner.reviews.push(created.clone());
        Ok(created)
    }

    async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Review>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .reviews
            .iter()
            .rev()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: ReviewId) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.reviews.len();
        inner.reviews.retain(|r| r.id != id);
        Ok(inner.reviews.len() != before)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(i64::try_from(self.inner.lock().unwrap().reviews.len()).unwrap())
    }
}

// --- Application ---

pub const ADMIN_TOKEN: &str = "kQ7vN2xR9mT4pL8wZ3yH6jB1cF5dG0sA";
pub const WEBHOOK_SECRET: &str = "whsec_okapi_test_endpoint";

fn secret(value: &str) -> secrecy::SecretString {
    secrecy::SecretString::from(value.to_string())
}

/// Configuration that never reaches a real service.
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: secret("postgres://okapi@localhost/okapi_test"),
        host: "127.0.0.1".parse().unwrap(),
        port: 3000,
        base_url: "https://okapistore.be".to_string(),
        admin_token: secret(ADMIN_TOKEN),
        stripe: StripeConfig {
            secret_key: secret("sk_test_okapi"),
            webhook_secret: secret(WEBHOOK_SECRET),
            webhook_tolerance_secs: 300,
        },
        printful: PrintfulConfig {
            api_token: secret("printful-test-token"),
            store_id: None,
            base_url: "http://127.0.0.1:9".to_string(),
        },
        email: EmailConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 2525,
            smtp_username: "okapi".to_string(),
            smtp_password: secret("smtp-test-password"),
            from_address: "orders@okapistore.be".to_string(),
        },
        mailchimp: None,
        allowed_countries: okapi_core::AllowedCountries::default(),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// The full router over fakes, in-memory sessions and a pool that never
/// connects.
pub struct TestApp {
    pub router: axum::Router,
    pub payments: Arc<FakePayments>,
    pub store: Arc<MemoryStore>,
    pub fulfillment: Arc<FakeFulfillment>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = test_config();
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://okapi@localhost/okapi_test")
            .unwrap();

        let payments = Arc::new(FakePayments::new());
        let fulfillment = Arc::new(FakeFulfillment::with_catalog());
        let store = Arc::new(MemoryStore::new());
        let gateways = crate::state::Gateways {
            payments: payments.clone(),
            fulfillment: fulfillment.clone(),
            mailer: Arc::new(FakeMailer::new()),
            mailing_list: None,
            orders: store.clone(),
            users: store.clone(),
            reviews: store.clone(),
        };

        let session_layer =
            crate::middleware::session_layer(tower_sessions::MemoryStore::default(), &config);
        let state = crate::state::AppState::with_gateways(config, pool, gateways);

        Self {
            router: crate::app(state, session_layer),
            payments,
            store,
            fulfillment,
        }
    }

    /// A new visitor without a session cookie.
    pub fn visitor(&self) -> Visitor<'_> {
        Visitor {
            app: self,
            cookie: None,
        }
    }
}

/// A browser-like client that replays its session cookie.
pub struct Visitor<'a> {
    app: &'a TestApp,
    cookie: Option<String>,
}

impl Visitor<'_> {
    /// Send a JSON request, returning the status and the JSON body
    /// (`Null` when empty).
    pub async fn send(
        &mut self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (axum::http::StatusCode, serde_json::Value) {
        use axum::body::{Body, to_bytes};
        use axum::http::{Request, header};
        use tower::ServiceExt;

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-real-ip", "203.0.113.9");
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.router.clone().oneshot(request).await.unwrap();
        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_string());
        }

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
