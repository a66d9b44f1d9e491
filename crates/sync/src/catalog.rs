//! Product catalog adapter.
//!
//! The engines treat the catalog as an external collaborator: it answers
//! product/variant lookups so `add`/`toggle` inputs that arrive with only an
//! ID can be enriched (name, image, price, stock) before validation. The
//! stock rules live here because both engines apply them identically.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use faithline_core::{ProductId, VariantId};

use crate::error::StoreError;
use crate::store::RestClient;

/// What happens when a variant's inventory reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InventoryPolicy {
    /// Refuse purchases once inventory is exhausted.
    #[default]
    Deny,
    /// Keep selling (backorder).
    Continue,
}

/// A purchasable variant of a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Variant ID.
    pub id: VariantId,
    /// Owning product.
    pub product_id: ProductId,
    /// Variant price; falls back to the product base price when absent.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Size label.
    #[serde(default)]
    pub size: Option<String>,
    /// Color label.
    #[serde(default)]
    pub color: Option<String>,
    /// Whether the variant is currently offered.
    pub is_active: bool,
    /// Out-of-stock behavior.
    #[serde(default)]
    pub inventory_policy: InventoryPolicy,
    /// Units on hand.
    pub inventory_quantity: i64,
}

impl Variant {
    /// Whether this variant can be added to a cart right now.
    #[must_use]
    pub const fn purchasable(&self) -> bool {
        !matches!(self.inventory_policy, InventoryPolicy::Deny if self.inventory_quantity < 1)
    }
}

/// A catalog product with its variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Primary image URL.
    #[serde(default)]
    pub main_image: String,
    /// Price used when no variant is chosen or the variant has no price.
    pub base_price: Decimal,
    /// Whether the product is currently listed.
    pub is_active: bool,
    /// Whether inventory is tracked at all.
    #[serde(default)]
    pub track_inventory: bool,
    /// Whether sales continue once tracked inventory hits zero.
    #[serde(default)]
    pub continue_selling_when_out_of_stock: bool,
    /// Variants, possibly empty.
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl Product {
    /// The unit price for a chosen variant (or the base price without one).
    #[must_use]
    pub fn effective_price(&self, variant: Option<&Variant>) -> Decimal {
        variant
            .and_then(|v| v.price)
            .unwrap_or(self.base_price)
    }

    /// Whether the product, bought without picking a variant, is in stock.
    #[must_use]
    pub fn sellable_without_variant(&self) -> bool {
        if !self.track_inventory || self.continue_selling_when_out_of_stock {
            return true;
        }
        self.total_inventory() > 0
    }

    /// Display-level stock flag (any variant in stock, or untracked).
    #[must_use]
    pub fn in_stock(&self) -> bool {
        if self.variants.is_empty() {
            return !self.track_inventory || self.continue_selling_when_out_of_stock;
        }
        self.variants.iter().any(|v| v.inventory_quantity > 0)
    }

    fn total_inventory(&self) -> i64 {
        self.variants.iter().map(|v| v.inventory_quantity).sum()
    }
}

/// Read access to the product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Fetch a product with its variants. `Ok(None)` means no such product.
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Fetch a single variant. `Ok(None)` means no such variant.
    async fn variant(&self, id: VariantId) -> Result<Option<Variant>, StoreError>;
}

/// In-memory catalog for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    products: Mutex<HashMap<ProductId, Product>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a product.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the lock panicked.
    pub fn put(&self, product: Product) {
        self.products
            .lock()
            .expect("catalog lock")
            .insert(product.id, product);
    }
}

#[async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.products.lock().expect("catalog lock").get(&id).cloned())
    }

    async fn variant(&self, id: VariantId) -> Result<Option<Variant>, StoreError> {
        Ok(self
            .products
            .lock()
            .expect("catalog lock")
            .values()
            .flat_map(|p| p.variants.iter())
            .find(|v| v.id == id)
            .cloned())
    }
}

/// Cache key for catalog lookups.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Product(ProductId),
    Variant(VariantId),
}

/// Cached catalog values.
#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<Product>),
    Variant(Box<Variant>),
}

/// REST-backed catalog with a short-TTL read cache.
///
/// Products and variants are cached for 5 minutes; the cart only needs them
/// at add/load time, so staleness is bounded and harmless.
#[derive(Clone)]
pub struct RestCatalog {
    client: RestClient,
    cache: Cache<CacheKey, CacheValue>,
}

impl RestCatalog {
    /// Wrap a shared REST client.
    #[must_use]
    pub fn new(client: RestClient) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self { client, cache }
    }
}

#[async_trait]
impl ProductCatalog for RestCatalog {
    #[instrument(skip(self))]
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            return Ok(Some(*product));
        }

        let mut rows: Vec<Product> = self
            .client
            .select(
                "products",
                &[
                    ("id", format!("eq.{id}")),
                    ("select", "*,variants:product_variants(*)".to_owned()),
                ],
            )
            .await?;

        let Some(product) = rows.pop() else {
            return Ok(None);
        };
        self.cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(Some(product))
    }

    #[instrument(skip(self))]
    async fn variant(&self, id: VariantId) -> Result<Option<Variant>, StoreError> {
        let key = CacheKey::Variant(id);
        if let Some(CacheValue::Variant(variant)) = self.cache.get(&key).await {
            return Ok(Some(*variant));
        }

        let mut rows: Vec<Variant> = self
            .client
            .select(
                "product_variants",
                &[("id", format!("eq.{id}")), ("select", "*".to_owned())],
            )
            .await?;

        let Some(variant) = rows.pop() else {
            return Ok(None);
        };
        self.cache
            .insert(key, CacheValue::Variant(Box::new(variant.clone())))
            .await;
        Ok(Some(variant))
    }
}
