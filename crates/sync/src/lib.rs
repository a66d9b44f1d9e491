//! Faithline Sync - cart and wishlist reconciliation engines.
//!
//! The storefront keeps shopping state in two places: a synchronous local
//! store for guests (browser `localStorage` in production) and a remote
//! row store for signed-in customers. The engines in this crate own the
//! in-memory collections and reconcile the two backends:
//!
//! - **Load**: wait for the identity gate to resolve, then read from the
//!   account collection (enriched through the product catalog) or the guest
//!   local store.
//! - **Merge-on-login**: a non-empty guest collection found at startup for an
//!   authenticated user is merged into the account collection; the guest key
//!   is cleared only after the merged state is durably persisted somewhere.
//! - **Mutate**: add/remove/set-quantity/clear (cart) and
//!   toggle/remove/move-to-cart (wishlist) apply optimistically in memory,
//!   then persist. Cart persistence is diff-based (insert/update/delete
//!   sets); wishlist persistence is full-replace with a backup.
//! - **Fail**: partial remote failures roll back to the pre-save snapshot;
//!   an unrecoverable rollback falls back to the local store so state is
//!   never silently lost.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use faithline_sync::{CartEngine, CartItemInput, SyncConfig, identity};
//! use faithline_sync::store::{MemoryCartStore, MemoryLocalStore};
//! use faithline_sync::catalog::MemoryCatalog;
//! use faithline_sync::events::NoopEvents;
//!
//! let (handle, gate) = identity::channel();
//! let mut cart = CartEngine::new(
//!     SyncConfig::default(),
//!     gate,
//!     Arc::new(MemoryCartStore::new()),
//!     Arc::new(MemoryLocalStore::new()),
//!     Arc::new(MemoryCatalog::new()),
//!     Arc::new(NoopEvents),
//! );
//! handle.resolve_anonymous();
//! cart.init().await;
//! cart.add(CartItemInput::new(product_id)).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod cart;
pub mod config;
pub mod diff;
pub mod error;
pub mod events;
pub mod identity;
pub mod item;
pub mod store;
pub mod wishlist;

pub use cart::{CartEngine, LoadState, StorageBackend};
pub use config::{CartLimits, SyncConfig};
pub use error::{Result, SyncError, ValidationError};
pub use identity::{IdentityGate, IdentityHandle, SessionState};
pub use item::{CartItemInput, CartKey, LineItem, WishlistItem, WishlistItemInput};
pub use wishlist::{MoveReport, ToggleOutcome, WishlistEngine};
