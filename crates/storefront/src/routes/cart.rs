//! Cart route handlers.
//!
//! The cart lives in the session. Names, prices and images come from the
//! catalog, never from the client.

use axum::{Json, extract::State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use okapi_core::{Cart, CartItem, ProductId, VariantId, format_euro_price};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::keys;
use crate::state::AppState;

/// Cart as returned to the client.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartItem>,
    #[serde(with = "rust_decimal::serde::str")]
    pub subtotal: Decimal,
    pub subtotal_label: String,
    pub item_count: u32,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart.items().to_vec(),
            subtotal: cart.subtotal(),
            subtotal_label: format_euro_price(cart.subtotal()),
            item_count: cart.item_count(),
        }
    }
}

/// Add to cart request.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// Set quantity request.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

/// Remove line request.
#[derive(Debug, Deserialize)]
pub struct RemoveItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
}

// =============================================================================
// Session Helpers
// =============================================================================

/// Load the cart from the session, or an empty one.
pub(crate) async fn load_cart(session: &Session) -> Result<Cart> {
    Ok(session.get::<Cart>(keys::CART).await?.unwrap_or_default())
}

/// Store the cart. A changed cart invalidates the last shipping quote and
/// the payment intent built from it.
async fn save_cart(session: &Session, cart: &Cart) -> Result<()> {
    session.insert(keys::CART, cart).await?;
    session.remove::<serde_json::Value>(keys::SHIPPING_QUOTE).await?;
    session.remove::<serde_json::Value>(keys::PAYMENT_INTENT).await?;
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// Show the cart.
#[instrument(skip(session))]
pub async fn show(session: Session) -> Result<Json<CartView>> {
    let cart = load_cart(&session).await?;
    Ok(Json(CartView::from(&cart)))
}

/// Add an item, merging with an existing line.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartView>> {
    let product = state.catalog().get_product(request.product_id).await?;

    let item = match request.variant_id {
        Some(variant_id) => {
            let variant = product
                .variant(variant_id)
                .ok_or_else(|| AppError::NotFound("Variant not found".to_string()))?;
            if !variant.in_stock {
                return Err(AppError::BadRequest(format!("{} is out of stock", variant.name)));
            }
            CartItem {
                product_id: request.product_id,
                variant_id: Some(variant_id),
                name: variant.name.clone(),
                price: variant.price,
                quantity: request.quantity.unwrap_or(1),
                image: variant
                    .image
                    .clone()
                    .or_else(|| product.summary.thumbnail.clone()),
            }
        }
        None => CartItem {
            product_id: request.product_id,
            variant_id: None,
            name: product.summary.name.clone(),
            price: product.summary.price_from,
            quantity: request.quantity.unwrap_or(1),
            image: product.summary.thumbnail.clone(),
        },
    };

    let mut cart = load_cart(&session).await?;
    let name = item.name.clone();
    cart.add(item)?;
    save_cart(&session, &cart).await?;

    add_breadcrumb("cart", "Added to cart", Some(&[("item", name.as_str())]));
    Ok(Json(CartView::from(&cart)))
}

/// Set the quantity of a line. Zero removes it.
#[instrument(skip(session))]
pub async fn update(
    session: Session,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&session).await?;
    if !cart.set_quantity(request.product_id, request.variant_id, request.quantity)? {
        return Err(AppError::NotFound("Item is not in your cart".to_string()));
    }
    save_cart(&session, &cart).await?;
    Ok(Json(CartView::from(&cart)))
}

/// Remove a line.
#[instrument(skip(session))]
pub async fn remove(
    session: Session,
    Json(request): Json<RemoveItemRequest>,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&session).await?;
    if cart.remove(request.product_id, request.variant_id) {
        save_cart(&session, &cart).await?;
    }
    Ok(Json(CartView::from(&cart)))
}

/// Empty the cart.
#[instrument(skip(session))]
pub async fn clear(session: Session) -> Result<Json<CartView>> {
    let cart = Cart::new();
    save_cart(&session, &cart).await?;
    Ok(Json(CartView::from(&cart)))
}
