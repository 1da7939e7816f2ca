//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{OrderRepository, OrderStore, ReviewRepository, ReviewStore, UserRepository, UserStore};
use crate::printful::{FulfillmentGateway, PrintfulClient, PrintfulError};
use crate::services::email::EmailError;
use crate::services::{
    AdminService, CatalogService, CheckoutService, MailchimpClient, MailchimpError, Mailer,
    MailingList, OrderReconciler, OrderService, PaymentIntentSync, ReviewService,
    ShippingCalculator, SmtpMailer,
};
use crate::stripe::{PaymentGateway, StripeClient, StripeError};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("stripe client: {0}")]
    Stripe(#[from] StripeError),
    #[error("printful client: {0}")]
    Printful(#[from] PrintfulError),
    #[error("mailchimp client: {0}")]
    Mailchimp(#[from] MailchimpError),
    #[error("smtp: {0}")]
    Email(#[from] EmailError),
}

/// External collaborators, swappable in tests.
pub struct Gateways {
    pub payments: Arc<dyn PaymentGateway>,
    pub fulfillment: Arc<dyn FulfillmentGateway>,
    pub mailer: Arc<dyn Mailer>,
    pub mailing_list: Option<Arc<dyn MailingList>>,
    pub orders: Arc<dyn OrderStore>,
    pub users: Arc<dyn UserStore>,
    pub reviews: Arc<dyn ReviewStore>,
}

impl Gateways {
    /// Real clients and Postgres repositories.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client or the SMTP relay cannot be built.
    pub fn from_config(config: &StorefrontConfig, pool: &PgPool) -> Result<Self, StateError> {
        let mailing_list: Option<Arc<dyn MailingList>> = match &config.mailchimp {
            Some(mailchimp) => Some(Arc::new(MailchimpClient::new(mailchimp)?)),
            None => None,
        };
        let mailer = SmtpMailer::new(&config.email).map_err(EmailError::from)?;

        Ok(Self {
            payments: Arc::new(StripeClient::new(&config.stripe)?),
            fulfillment: Arc::new(PrintfulClient::new(&config.printful)?),
            mailer: Arc::new(mailer),
            mailing_list,
            orders: Arc::new(OrderRepository::new(pool.clone())),
            users: Arc::new(UserRepository::new(pool.clone())),
            reviews: Arc::new(ReviewRepository::new(pool.clone())),
        })
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections, configuration and services.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    catalog: CatalogService,
    shipping: ShippingCalculator,
    payment_intents: PaymentIntentSync,
    checkout: CheckoutService,
    reconciler: OrderReconciler,
    orders: OrderService,
    reviews: ReviewService,
    admin: AdminService,
    mailing_list: Option<Arc<dyn MailingList>>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if an external client cannot be configured.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let gateways = Gateways::from_config(&config, &pool)?;
        Ok(Self::with_gateways(config, pool, gateways))
    }

    /// Assemble the services over the given collaborators.
    #[must_use]
    pub fn with_gateways(config: StorefrontConfig, pool: PgPool, gateways: Gateways) -> Self {
        let Gateways {
            payments,
            fulfillment,
            mailer,
            mailing_list,
            orders,
            users,
            reviews,
        } = gateways;
        let allowed = config.allowed_countries.clone();

        let catalog = CatalogService::new(Arc::clone(&fulfillment));
        let shipping =
            ShippingCalculator::new(catalog.clone(), Arc::clone(&fulfillment), allowed.clone());
        let payment_intents = PaymentIntentSync::new(Arc::clone(&payments), allowed.clone());
        let checkout = CheckoutService::new(Arc::clone(&payments), allowed, &config.base_url);
        let reconciler = OrderReconciler::new(
            payments,
            Arc::clone(&fulfillment),
            Arc::clone(&orders),
            Arc::clone(&users),
            mailer,
            &config.base_url,
        );
        let order_service = OrderService::new(Arc::clone(&orders), users, fulfillment);
        let review_service = ReviewService::new(Arc::clone(&reviews), Arc::clone(&orders));
        let admin = AdminService::new(orders, reviews);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                catalog,
                shipping,
                payment_intents,
                checkout,
                reconciler,
                orders: order_service,
                reviews: review_service,
                admin,
                mailing_list,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn shipping(&self) -> &ShippingCalculator {
        &self.inner.shipping
    }

    #[must_use]
    pub fn payment_intents(&self) -> &PaymentIntentSync {
        &self.inner.payment_intents
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    #[must_use]
    pub fn reconciler(&self) -> &OrderReconciler {
        &self.inner.reconciler
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn reviews(&self) -> &ReviewService {
        &self.inner.reviews
    }

    #[must_use]
    pub fn admin(&self) -> &AdminService {
        &self.inner.admin
    }

    /// The newsletter audience, if configured.
    #[must_use]
    pub fn mailing_list(&self) -> Option<&dyn MailingList> {
        self.inner.mailing_list.as_deref()
    }
}
