//! Shared fixtures for the Faithline integration tests.
//!
//! Everything runs against the in-memory adapters: the local store stands in
//! for browser `localStorage` (including cross-tab events), the memory
//! stores for the remote row collections, and the memory catalog for the
//! product API. The tests wire real engines over these and drive whole
//! scenarios: guest sessions, merge-on-login, partial remote failures.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use rust_decimal::Decimal;

use faithline_core::{Price, ProductId};
use faithline_sync::cart::CartEngine;
use faithline_sync::catalog::{InventoryPolicy, MemoryCatalog, Product, ProductCatalog, Variant};
use faithline_sync::events::{EngineEvents, RecordingEvents};
use faithline_sync::identity::{self, IdentityHandle};
use faithline_sync::store::{
    CartStore, LocalStore, MemoryCartStore, MemoryLocalStore, MemoryWishlistStore, WishlistStore,
};
use faithline_sync::wishlist::WishlistEngine;
use faithline_sync::{CartItemInput, LineItem, SyncConfig, WishlistItem, WishlistItemInput};

/// Install a test subscriber so engine logs show up under
/// `RUST_LOG=faithline_sync=debug cargo test -- --nocapture`.
/// Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One simulated browsing session: shared backends plus an identity handle.
///
/// Engines built from the same harness share the local store, the remote
/// stores, and the catalog, so cross-engine and "page reload" scenarios can
/// be expressed by building a second engine over the same harness.
pub struct Harness {
    /// Identity provider side of the gate.
    pub handle: IdentityHandle,
    /// Simulated `localStorage`.
    pub local: Arc<MemoryLocalStore>,
    /// Product catalog.
    pub catalog: Arc<MemoryCatalog>,
    /// Remote `cart_items` collection.
    pub cart_store: Arc<MemoryCartStore>,
    /// Remote `wishlist_items` collection.
    pub wishlist_store: Arc<MemoryWishlistStore>,
    /// Recorded cart-engine callbacks.
    pub cart_events: Arc<RecordingEvents>,
    /// Recorded wishlist-engine callbacks.
    pub wishlist_events: Arc<RecordingEvents>,
    config: SyncConfig,
}

impl Harness {
    /// A harness with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    /// A harness with custom limits/keys.
    #[must_use]
    pub fn with_config(config: SyncConfig) -> Self {
        let (handle, _gate) = identity::channel();
        Self {
            handle,
            local: Arc::new(MemoryLocalStore::new()),
            catalog: Arc::new(MemoryCatalog::new()),
            cart_store: Arc::new(MemoryCartStore::new()),
            wishlist_store: Arc::new(MemoryWishlistStore::new()),
            cart_events: Arc::new(RecordingEvents::new()),
            wishlist_events: Arc::new(RecordingEvents::new()),
            config,
        }
    }

    /// A cart engine over this session's backends (not yet initialized).
    #[must_use]
    pub fn cart(&self) -> CartEngine {
        CartEngine::new(
            self.config.clone(),
            self.handle.gate(),
            Arc::clone(&self.cart_store) as Arc<dyn CartStore>,
            Arc::clone(&self.local) as Arc<dyn LocalStore>,
            Arc::clone(&self.catalog) as Arc<dyn ProductCatalog>,
            Arc::clone(&self.cart_events) as Arc<dyn EngineEvents>,
        )
    }

    /// A wishlist engine over this session's backends (not yet initialized).
    #[must_use]
    pub fn wishlist(&self) -> WishlistEngine {
        WishlistEngine::new(
            self.config.clone(),
            self.handle.gate(),
            Arc::clone(&self.wishlist_store) as Arc<dyn WishlistStore>,
            Arc::clone(&self.local) as Arc<dyn LocalStore>,
            Arc::clone(&self.catalog) as Arc<dyn ProductCatalog>,
            Arc::clone(&self.wishlist_events) as Arc<dyn EngineEvents>,
        )
    }

    /// Seed the guest cart key directly, as another tab/session would.
    ///
    /// # Panics
    ///
    /// Panics if the items fail to serialize.
    pub fn seed_guest_cart(&self, items: &[LineItem]) {
        let payload = serde_json::to_string(items).expect("encode guest cart");
        self.local.set("cart", &payload);
    }

    /// Seed the guest wishlist key directly.
    ///
    /// # Panics
    ///
    /// Panics if the items fail to serialize.
    pub fn seed_guest_wishlist(&self, items: &[WishlistItem]) {
        let payload = serde_json::to_string(items).expect("encode guest wishlist");
        self.local.set("wishlist", &payload);
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// A fully specified cart input (no catalog enrichment needed).
#[must_use]
pub fn cart_input(product_id: ProductId, quantity: u32, cents: i64) -> CartItemInput {
    CartItemInput {
        product_id,
        variant_id: None,
        product_name: Some("Linen Shirt".to_owned()),
        product_image: Some("/img/linen.webp".to_owned()),
        unit_price: Some(Decimal::new(cents, 2)),
        quantity: Some(quantity),
        size: None,
        color: None,
        in_stock: Some(true),
    }
}

/// A fully specified wishlist input.
#[must_use]
pub fn wishlist_input(product_id: ProductId, cents: i64) -> WishlistItemInput {
    WishlistItemInput {
        product_id,
        product_name: Some("Linen Shirt".to_owned()),
        product_image: Some("/img/linen.webp".to_owned()),
        unit_price: Some(Decimal::new(cents, 2)),
        in_stock: Some(true),
    }
}

/// A guest-persisted cart line.
///
/// # Panics
///
/// Panics if `cents` is negative.
#[must_use]
pub fn line_item(product_id: ProductId, quantity: u32, cents: i64) -> LineItem {
    LineItem {
        product_id,
        variant_id: None,
        product_name: "Linen Shirt".to_owned(),
        product_image: "/img/linen.webp".to_owned(),
        unit_price: Price::new(Decimal::new(cents, 2)).expect("non-negative price"),
        quantity,
        size: None,
        color: None,
        added_at: chrono::Utc::now(),
        in_stock: true,
    }
}

/// A guest-persisted wishlist entry.
///
/// # Panics
///
/// Panics if `cents` is negative.
#[must_use]
pub fn wishlist_entry(product_id: ProductId, cents: i64) -> WishlistItem {
    WishlistItem {
        product_id,
        product_name: "Linen Shirt".to_owned(),
        product_image: "/img/linen.webp".to_owned(),
        unit_price: Price::new(Decimal::new(cents, 2)).expect("non-negative price"),
        added_at: chrono::Utc::now(),
        in_stock: true,
    }
}

/// An active, stocked catalog product with one variant.
#[must_use]
pub fn listed_product(cents: i64, stock: i64) -> Product {
    let id = ProductId::generate();
    Product {
        id,
        name: "Twill Chore Coat".to_owned(),
        main_image: "/img/chore.webp".to_owned(),
        base_price: Decimal::new(cents, 2),
        is_active: true,
        track_inventory: true,
        continue_selling_when_out_of_stock: false,
        variants: vec![Variant {
            id: faithline_core::VariantId::generate(),
            product_id: id,
            price: None,
            size: Some("M".to_owned()),
            color: None,
            is_active: true,
            inventory_policy: InventoryPolicy::Deny,
            inventory_quantity: stock,
        }],
    }
}
