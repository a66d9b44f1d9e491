//! Storage backends for the reconciliation engines.
//!
//! Two kinds of storage exist:
//!
//! - [`LocalStore`] - synchronous key-value persistence scoped to the
//!   browsing context. The guest backend, and the universal fallback when
//!   remote persistence fails.
//! - [`CartStore`] / [`WishlistStore`] - asynchronous CRUD against the named
//!   remote collections (`cart_items`, `wishlist_items`). Every call is an
//!   independent network round trip with its own outcome; the engines layer
//!   diff/rollback semantics on top.
//!
//! Remote rows use the normalized schema: only identity and quantity live in
//! the row, product details are re-joined through the catalog on load.

mod local;
mod memory;
mod rest;

pub use local::{LocalStore, MemoryLocalStore};
pub use memory::{MemoryCartStore, MemoryWishlistStore};
pub use rest::{RestCartStore, RestClient, RestConfig, RestWishlistStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use faithline_core::{ProductId, RowId, UserId, VariantId};

use crate::error::StoreError;

/// A persisted cart row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartRow {
    /// Server-assigned row ID.
    pub id: RowId,
    /// Owning user.
    pub user_id: UserId,
    /// Product ID.
    pub product_id: ProductId,
    /// Variant ID, if a variant was chosen.
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    /// Line quantity.
    pub quantity: u32,
    /// Server-assigned creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A cart row to insert (no server-assigned fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCartRow {
    /// Owning user.
    pub user_id: UserId,
    /// Product ID.
    pub product_id: ProductId,
    /// Variant ID, if a variant was chosen.
    pub variant_id: Option<VariantId>,
    /// Line quantity.
    pub quantity: u32,
}

/// A persisted wishlist row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistRow {
    /// Server-assigned row ID.
    pub id: RowId,
    /// Owning user.
    pub user_id: UserId,
    /// Product ID (the identity key).
    pub product_id: ProductId,
    /// Server-assigned creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A wishlist row to insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWishlistRow {
    /// Owning user.
    pub user_id: UserId,
    /// Product ID.
    pub product_id: ProductId,
}

/// Remote `cart_items` collection.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Fetch all of a user's rows.
    async fn list(&self, user_id: UserId) -> Result<Vec<CartRow>, StoreError>;

    /// Insert new rows.
    async fn insert(&self, rows: Vec<NewCartRow>) -> Result<(), StoreError>;

    /// Update the quantity of an existing row.
    async fn update_quantity(&self, id: RowId, quantity: u32) -> Result<(), StoreError>;

    /// Delete rows by ID.
    async fn delete(&self, ids: Vec<RowId>) -> Result<(), StoreError>;

    /// Delete all of a user's rows.
    async fn delete_all(&self, user_id: UserId) -> Result<(), StoreError>;
}

/// Remote `wishlist_items` collection.
#[async_trait]
pub trait WishlistStore: Send + Sync {
    /// Fetch all of a user's rows.
    async fn list(&self, user_id: UserId) -> Result<Vec<WishlistRow>, StoreError>;

    /// Insert new rows.
    async fn insert(&self, rows: Vec<NewWishlistRow>) -> Result<(), StoreError>;

    /// Delete all of a user's rows.
    async fn delete_all(&self, user_id: UserId) -> Result<(), StoreError>;
}
