//! Line-item types and shared validation helpers.
//!
//! Cart lines are identified by [`CartKey`] - `(product_id, variant_id)`,
//! the normalized-catalog scheme. The key is applied uniformly to add, merge,
//! and diff so the same product/variant pair can never occupy two rows.
//! Wishlist entries carry no variant granularity and are keyed by product ID
//! alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use faithline_core::{Price, ProductId, VariantId};

use crate::config::CartLimits;
use crate::error::ValidationError;

/// The identity key of a cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CartKey {
    /// Product the line refers to.
    pub product_id: ProductId,
    /// Chosen variant, if the product has variants.
    pub variant_id: Option<VariantId>,
}

/// A line in the in-memory cart.
///
/// This is also the guest persistence format: the local store holds a
/// JSON-serialized array of these under the cart key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// Product ID.
    pub product_id: ProductId,
    /// Variant ID, when a specific variant was chosen.
    pub variant_id: Option<VariantId>,
    /// Display name at the time the item was added.
    pub product_name: String,
    /// Primary image URL.
    pub product_image: String,
    /// Unit price.
    pub unit_price: Price,
    /// Quantity, within `1..=max_quantity_per_item`.
    pub quantity: u32,
    /// Variant size label, if any.
    pub size: Option<String>,
    /// Variant color label, if any.
    pub color: Option<String>,
    /// When the line was first added.
    pub added_at: DateTime<Utc>,
    /// Whether the item was in stock when loaded.
    pub in_stock: bool,
}

impl LineItem {
    /// The line's identity key.
    #[must_use]
    pub const fn key(&self) -> CartKey {
        CartKey {
            product_id: self.product_id,
            variant_id: self.variant_id,
        }
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> rust_decimal::Decimal {
        self.unit_price.line_total(self.quantity)
    }
}

/// An entry in the in-memory wishlist.
///
/// Also the guest persistence format for the wishlist key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistItem {
    /// Product ID (the identity key - wishlists have no variant granularity).
    pub product_id: ProductId,
    /// Display name at the time the item was added.
    pub product_name: String,
    /// Primary image URL.
    pub product_image: String,
    /// Unit price for display.
    pub unit_price: Price,
    /// When the entry was added.
    pub added_at: DateTime<Utc>,
    /// Whether the product was in stock when loaded.
    pub in_stock: bool,
}

/// Caller-supplied payload for `CartEngine::add`.
///
/// Product details are optional: a bare input (no `product_name`) is
/// enriched from the catalog, which also runs the stock checks. An input
/// that names the product must carry the price too; a name without a
/// price is rejected as an invalid price, not half-enriched.
#[derive(Debug, Clone)]
pub struct CartItemInput {
    /// Product to add.
    pub product_id: ProductId,
    /// Chosen variant, if any.
    pub variant_id: Option<VariantId>,
    /// Display name; fetched from the catalog when absent.
    pub product_name: Option<String>,
    /// Image URL; filled from the catalog on a bare input.
    pub product_image: Option<String>,
    /// Unit price; required alongside `product_name`, otherwise fetched
    /// from the catalog.
    pub unit_price: Option<rust_decimal::Decimal>,
    /// Quantity; defaults to 1.
    pub quantity: Option<u32>,
    /// Size label override.
    pub size: Option<String>,
    /// Color label override.
    pub color: Option<String>,
    /// Stock flag; defaults to true.
    pub in_stock: Option<bool>,
}

impl CartItemInput {
    /// A bare input for `product_id`; everything else enriched or defaulted.
    #[must_use]
    pub const fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            variant_id: None,
            product_name: None,
            product_image: None,
            unit_price: None,
            quantity: None,
            size: None,
            color: None,
            in_stock: None,
        }
    }

    /// Set the variant.
    #[must_use]
    pub const fn with_variant(mut self, variant_id: VariantId) -> Self {
        self.variant_id = Some(variant_id);
        self
    }

    /// Set the quantity.
    #[must_use]
    pub const fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }
}

impl From<&LineItem> for CartItemInput {
    /// The merge-replay payload: every known detail carried over so the
    /// normal `add` path needs no catalog round trip.
    fn from(item: &LineItem) -> Self {
        Self {
            product_id: item.product_id,
            variant_id: item.variant_id,
            product_name: Some(item.product_name.clone()),
            product_image: Some(item.product_image.clone()),
            unit_price: Some(item.unit_price.amount()),
            quantity: Some(item.quantity),
            size: item.size.clone(),
            color: item.color.clone(),
            in_stock: Some(item.in_stock),
        }
    }
}

impl From<&WishlistItem> for CartItemInput {
    /// The move-to-cart payload: known details carried over, quantity 1.
    fn from(item: &WishlistItem) -> Self {
        Self {
            product_id: item.product_id,
            variant_id: None,
            product_name: Some(item.product_name.clone()),
            product_image: Some(item.product_image.clone()),
            unit_price: Some(item.unit_price.amount()),
            quantity: Some(1),
            size: None,
            color: None,
            in_stock: Some(item.in_stock),
        }
    }
}

/// Caller-supplied payload for `WishlistEngine::toggle`.
#[derive(Debug, Clone)]
pub struct WishlistItemInput {
    /// Product to toggle.
    pub product_id: ProductId,
    /// Display name; fetched from the catalog when absent.
    pub product_name: Option<String>,
    /// Image URL; fetched from the catalog when absent.
    pub product_image: Option<String>,
    /// Unit price; fetched from the catalog when absent.
    pub unit_price: Option<rust_decimal::Decimal>,
    /// Stock flag; defaults to true.
    pub in_stock: Option<bool>,
}

impl WishlistItemInput {
    /// A bare input for `product_id`.
    #[must_use]
    pub const fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            product_name: None,
            product_image: None,
            unit_price: None,
            in_stock: None,
        }
    }
}

/// Validate a price amount into a [`Price`].
pub(crate) fn validate_price(
    amount: rust_decimal::Decimal,
) -> Result<Price, ValidationError> {
    Price::new(amount).map_err(|_| ValidationError::InvalidPrice)
}

/// Normalize a requested quantity: default 1, reject zero and values above
/// the per-line cap.
pub(crate) fn normalize_quantity(
    requested: Option<u32>,
    limits: &CartLimits,
) -> Result<u32, ValidationError> {
    let quantity = requested.unwrap_or(1);
    if quantity == 0 || quantity > limits.max_quantity_per_item {
        return Err(ValidationError::InvalidQuantity {
            max: limits.max_quantity_per_item,
        });
    }
    Ok(quantity)
}
