//! Wishlist reconciliation engine.
//!
//! Same lifecycle as the cart engine (identity gate, backend selection,
//! merge-on-login, cross-tab reload) but a simpler data model: entries are
//! keyed by product ID alone and carry no quantity, so account persistence
//! is a full replace of the user's rows rather than a diff. A backup of the
//! pre-save rows is taken first and restored when the replace fails partway.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, instrument, warn};

use faithline_core::{Price, ProductId, UserId};

use crate::cart::{CartEngine, LoadState, StorageBackend};
use crate::catalog::ProductCatalog;
use crate::config::SyncConfig;
use crate::error::{Result, StoreError, SyncError, ValidationError};
use crate::events::{EngineEvents, Notice};
use crate::identity::{IdentityGate, SessionState};
use crate::item::{CartItemInput, WishlistItem, WishlistItemInput, validate_price};
use crate::store::{LocalStore, NewWishlistRow, WishlistRow, WishlistStore};

/// What a [`WishlistEngine::toggle`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The product was not on the list and has been added.
    Added,
    /// The product was on the list and has been removed.
    Removed,
}

/// Summary of a [`WishlistEngine::move_all_to_cart`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveReport {
    /// Entries added to the cart.
    pub moved: usize,
    /// Entries the cart rejected (limits, stock); dropped with the rest of
    /// the list.
    pub skipped: usize,
}

/// The wishlist reconciliation engine.
pub struct WishlistEngine {
    items: Vec<WishlistItem>,
    state: LoadState,
    backend: StorageBackend,
    config: SyncConfig,
    identity: IdentityGate,
    store: Arc<dyn WishlistStore>,
    local: Arc<dyn LocalStore>,
    catalog: Arc<dyn ProductCatalog>,
    events: Arc<dyn EngineEvents>,
}

impl WishlistEngine {
    /// Create an engine. Call [`WishlistEngine::init`] before mutating.
    #[must_use]
    pub fn new(
        config: SyncConfig,
        identity: IdentityGate,
        store: Arc<dyn WishlistStore>,
        local: Arc<dyn LocalStore>,
        catalog: Arc<dyn ProductCatalog>,
        events: Arc<dyn EngineEvents>,
    ) -> Self {
        Self {
            items: Vec::new(),
            state: LoadState::Uninitialized,
            backend: StorageBackend::Guest,
            config,
            identity,
            store,
            local,
            catalog,
            events,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Resolve identity, pick the backend, and load the initial collection.
    ///
    /// Never fails; remote errors degrade to a local-store read.
    #[instrument(skip(self))]
    pub async fn init(&mut self) {
        self.state = LoadState::Loading;

        match self.identity.wait_resolved(self.config.identity_wait).await {
            SessionState::Authenticated(user_id) => {
                self.backend = StorageBackend::Account(user_id);
                let guest_items = self.read_local();
                if guest_items.is_empty() {
                    self.state = LoadState::AccountRemote;
                    self.load_account(user_id).await;
                } else {
                    self.state = LoadState::Merging;
                    self.merge_guest_into_account(user_id, guest_items).await;
                }
            }
            SessionState::Anonymous | SessionState::Unresolved => {
                self.backend = StorageBackend::Guest;
                self.state = LoadState::GuestLocal;
                self.items = self.read_local();
            }
        }

        self.state = LoadState::Ready;
        self.events.refresh();
    }

    /// React to a cross-tab change of the guest wishlist key.
    pub fn handle_storage_event(&mut self, key: &str) {
        if key != self.config.wishlist_storage_key || self.backend != StorageBackend::Guest {
            return;
        }
        self.items = self.read_local();
        self.events.refresh();
    }

    /// Drop account state after sign-out.
    pub fn reset_to_guest(&mut self) {
        self.backend = StorageBackend::Guest;
        self.items.clear();
        self.local.remove(&self.config.wishlist_storage_key);
        self.events.refresh();
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The in-memory collection, in display order.
    #[must_use]
    pub fn items(&self) -> &[WishlistItem] {
        &self.items
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether `product_id` is on the list (drives the heart-icon state).
    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.items.iter().any(|item| item.product_id == product_id)
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LoadState {
        self.state
    }

    /// The backend selected at init.
    #[must_use]
    pub const fn backend(&self) -> StorageBackend {
        self.backend
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add the product if absent, remove it if present.
    ///
    /// Adding a bare input (no name/price) enriches it from the catalog,
    /// which rejects unlisted and out-of-stock products. Removal never
    /// consults the catalog: a product that has since been delisted can
    /// still be taken off the list.
    ///
    /// # Errors
    ///
    /// [`SyncError::Validation`] for rejected input;
    /// [`SyncError::Persistence`] when the remote save failed.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn toggle(&mut self, input: WishlistItemInput) -> Result<ToggleOutcome> {
        if input.product_id.is_nil() {
            let err = ValidationError::MissingProductId;
            self.events.notify(Notice::Error(err.to_string()));
            return Err(err.into());
        }

        if self.contains(input.product_id) {
            self.remove(input.product_id).await?;
            return Ok(ToggleOutcome::Removed);
        }

        let item = match self.resolve_input(input).await {
            Ok(item) => item,
            Err(err) => {
                self.notify_failure(&err, "Failed to update wishlist. Please try again.");
                return Err(err);
            }
        };
        self.items.push(item);

        match self.persist().await {
            Ok(()) => {
                self.events.refresh();
                self.events
                    .notify(Notice::Success("Added to wishlist!".to_owned()));
                Ok(ToggleOutcome::Added)
            }
            Err(err) => {
                self.refresh_if_mutated(&err);
                self.notify_failure(&err, "Failed to update wishlist. Please try again.");
                Err(err)
            }
        }
    }

    /// Remove the product from the list. A product not on the list is a
    /// no-op, not an error.
    ///
    /// # Errors
    ///
    /// [`SyncError::Persistence`] when the remote save failed.
    #[instrument(skip(self))]
    pub async fn remove(&mut self, product_id: ProductId) -> Result<()> {
        let before = self.items.len();
        self.items.retain(|item| item.product_id != product_id);
        if self.items.len() == before {
            return Ok(());
        }

        match self.persist().await {
            Ok(()) => {
                self.events.refresh();
                self.events
                    .notify(Notice::Success("Removed from wishlist".to_owned()));
                Ok(())
            }
            Err(err) => {
                self.refresh_if_mutated(&err);
                self.notify_failure(&err, "Failed to update wishlist. Please try again.");
                Err(err)
            }
        }
    }

    /// Empty the wishlist and persist the empty state.
    ///
    /// # Errors
    ///
    /// [`SyncError::Persistence`] when the remote save failed.
    #[instrument(skip(self))]
    pub async fn clear(&mut self) -> Result<()> {
        self.items.clear();
        let result = self.persist().await;
        self.events.refresh();
        result
    }

    /// Move one entry into the cart: add it there, then remove it here.
    ///
    /// The wishlist entry survives when the cart rejects the add (limits,
    /// stock), so nothing is lost on failure.
    ///
    /// # Errors
    ///
    /// Whatever `CartEngine::add` returned, or
    /// [`SyncError::Persistence`] from the wishlist removal.
    #[instrument(skip(self, cart))]
    pub async fn move_to_cart(&mut self, cart: &mut CartEngine, product_id: ProductId) -> Result<()> {
        let Some(item) = self
            .items
            .iter()
            .find(|item| item.product_id == product_id)
        else {
            return Ok(());
        };

        cart.add(CartItemInput::from(item)).await?;
        self.remove(product_id).await
    }

    /// Move every entry into the cart, then clear the list.
    ///
    /// Best effort: per-entry cart rejections are counted and logged, not
    /// fatal, and the whole list is cleared afterwards regardless. A caller
    /// that wants rejected entries kept should move them one at a time with
    /// [`WishlistEngine::move_to_cart`].
    ///
    /// # Errors
    ///
    /// [`SyncError::Persistence`] when persisting the emptied wishlist
    /// failed (the cart additions have already happened).
    #[instrument(skip(self, cart))]
    pub async fn move_all_to_cart(&mut self, cart: &mut CartEngine) -> Result<MoveReport> {
        let mut report = MoveReport::default();

        for item in self.items.clone() {
            match cart.add(CartItemInput::from(&item)).await {
                Ok(()) => report.moved += 1,
                Err(err) => {
                    report.skipped += 1;
                    warn!(product_id = %item.product_id, error = %err, "entry not moved to cart");
                }
            }
        }

        if self.items.is_empty() {
            return Ok(report);
        }

        self.items.clear();
        let result = self.persist().await;
        self.events.refresh();
        match result {
            Ok(()) => {
                self.events.notify(Notice::Success(format!(
                    "{} items moved to cart",
                    report.moved
                )));
                Ok(report)
            }
            Err(err) => {
                self.notify_failure(&err, "Failed to update wishlist. Please try again.");
                Err(err)
            }
        }
    }

    // =========================================================================
    // Input resolution
    // =========================================================================

    /// Enrich and validate a toggle input into an entry.
    async fn resolve_input(&self, input: WishlistItemInput) -> Result<WishlistItem> {
        if let Some(amount) = input.unit_price
            && input.product_name.is_some()
        {
            return Ok(WishlistItem {
                product_id: input.product_id,
                product_name: input.product_name.unwrap_or_default(),
                product_image: input.product_image.unwrap_or_default(),
                unit_price: validate_price(amount)?,
                added_at: Utc::now(),
                in_stock: input.in_stock.unwrap_or(true),
            });
        }

        let product = self
            .catalog
            .product(input.product_id)
            .await
            .map_err(|err| {
                warn!(error = %err, "catalog lookup failed during toggle");
                ValidationError::ProductUnavailable
            })?
            .filter(|product| product.is_active)
            .ok_or(ValidationError::ProductUnavailable)?;
        if !product.in_stock() {
            return Err(ValidationError::OutOfStock.into());
        }

        Ok(WishlistItem {
            product_id: product.id,
            product_name: product.name,
            product_image: product.main_image,
            unit_price: validate_price(product.base_price)?,
            added_at: Utc::now(),
            in_stock: true,
        })
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Read the guest collection; unreadable JSON counts as empty.
    fn read_local(&self) -> Vec<WishlistItem> {
        let Some(raw) = self.local.get(&self.config.wishlist_storage_key) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "unreadable guest wishlist, treating as empty");
                Vec::new()
            }
        }
    }

    /// Load the account collection, degrading to the local store on error.
    async fn load_account(&mut self, user_id: UserId) {
        match self.fetch_account_items(user_id).await {
            Ok(items) => self.items = items,
            Err(err) => {
                warn!(error = %err, "failed to load remote wishlist, reading local store");
                self.items = self.read_local();
            }
        }
    }

    async fn fetch_account_items(
        &self,
        user_id: UserId,
    ) -> std::result::Result<Vec<WishlistItem>, StoreError> {
        let rows = self.store.list(user_id).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(self.item_from_row(row).await);
        }
        Ok(items)
    }

    /// Join a row with its product. Like the cart, a product missing from
    /// the catalog still yields an entry so the user can remove it.
    async fn item_from_row(&self, row: WishlistRow) -> WishlistItem {
        let product = match self.catalog.product(row.product_id).await {
            Ok(product) => product,
            Err(err) => {
                warn!(product_id = %row.product_id, error = %err, "catalog lookup failed during load");
                None
            }
        };

        WishlistItem {
            product_id: row.product_id,
            product_name: product
                .as_ref()
                .map_or_else(|| "Unknown Product".to_owned(), |p| p.name.clone()),
            product_image: product
                .as_ref()
                .map_or_else(String::new, |p| p.main_image.clone()),
            unit_price: product
                .as_ref()
                .and_then(|p| Price::new(p.base_price).ok())
                .unwrap_or(Price::ZERO),
            added_at: row.created_at,
            in_stock: product.as_ref().is_none_or(crate::catalog::Product::in_stock),
        }
    }

    // =========================================================================
    // Merge-on-login
    // =========================================================================

    /// Merge the guest list into the account list: union by product ID,
    /// remote entries first. The guest key is cleared only after the merged
    /// state persisted, or after the fallback replay finished.
    #[instrument(skip(self, guest_items), fields(guest_count = guest_items.len()))]
    async fn merge_guest_into_account(&mut self, user_id: UserId, guest_items: Vec<WishlistItem>) {
        match self.try_merge(user_id, &guest_items).await {
            Ok(()) => {
                self.local.remove(&self.config.wishlist_storage_key);
            }
            Err(err) => {
                warn!(error = %err, "wishlist merge failed, replaying guest entries individually");
                self.load_account(user_id).await;
                for item in guest_items {
                    if self.contains(item.product_id) {
                        continue;
                    }
                    // Ensure-present, never toggle: a replayed entry that is
                    // already on the account list must not flip off.
                    self.items.push(item.clone());
                    if let Err(replay_err) = self.persist().await {
                        warn!(
                            product_id = %item.product_id,
                            error = %replay_err,
                            "guest wishlist entry dropped during merge replay"
                        );
                        self.items.retain(|i| i.product_id != item.product_id);
                    }
                }
                self.local.remove(&self.config.wishlist_storage_key);
            }
        }
    }

    async fn try_merge(&mut self, user_id: UserId, guest_items: &[WishlistItem]) -> Result<()> {
        let mut merged = self.fetch_account_items(user_id).await?;

        for guest in guest_items {
            if !merged.iter().any(|item| item.product_id == guest.product_id) {
                merged.push(guest.clone());
            }
        }

        self.items = merged;
        self.persist_account(user_id).await
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    async fn persist(&mut self) -> Result<()> {
        match self.backend {
            StorageBackend::Guest => self.write_local(),
            StorageBackend::Account(user_id) => self.persist_account(user_id).await,
        }
    }

    fn write_local(&self) -> Result<()> {
        let payload = serde_json::to_string(&self.items)
            .map_err(crate::error::LocalStoreError::Encode)?;
        self.local.set(&self.config.wishlist_storage_key, &payload);
        Ok(())
    }

    /// Full replace of the user's remote rows, with a backup.
    ///
    /// The pre-save rows are fetched first; then delete-all and a bulk
    /// insert of the current entries. When either step fails the backup is
    /// reinserted; when even that fails the in-memory state goes to the
    /// local store and the original error surfaces with
    /// `rolled_back: false`.
    async fn persist_account(&mut self, user_id: UserId) -> Result<()> {
        let backup = match self.store.list(user_id).await {
            Ok(rows) => rows,
            Err(source) => {
                warn!(error = %source, "could not fetch wishlist rows before save, caching locally");
                self.cache_locally();
                return Err(SyncError::Persistence {
                    source,
                    rolled_back: false,
                });
            }
        };

        match self.replace_rows(user_id).await {
            Ok(()) => Ok(()),
            Err(source) => {
                error!(error = %source, "wishlist save failed, restoring backup");
                match self.restore(user_id, &backup).await {
                    Ok(()) => Err(SyncError::Persistence {
                        source,
                        rolled_back: true,
                    }),
                    Err(restore_err) => {
                        error!(error = %restore_err, "wishlist restore failed, caching locally");
                        self.cache_locally();
                        Err(SyncError::Persistence {
                            source,
                            rolled_back: false,
                        })
                    }
                }
            }
        }
    }

    async fn replace_rows(&self, user_id: UserId) -> std::result::Result<(), StoreError> {
        self.store.delete_all(user_id).await?;
        if self.items.is_empty() {
            return Ok(());
        }
        let rows = self
            .items
            .iter()
            .map(|item| NewWishlistRow {
                user_id,
                product_id: item.product_id,
            })
            .collect();
        self.store.insert(rows).await
    }

    /// Reinsert the backup rows (as fresh rows; the old IDs are gone).
    async fn restore(
        &self,
        user_id: UserId,
        backup: &[WishlistRow],
    ) -> std::result::Result<(), StoreError> {
        self.store.delete_all(user_id).await?;
        if backup.is_empty() {
            return Ok(());
        }
        let rows = backup
            .iter()
            .map(|row| NewWishlistRow {
                user_id,
                product_id: row.product_id,
            })
            .collect();
        self.store.insert(rows).await
    }

    fn cache_locally(&self) {
        if let Err(err) = self.write_local() {
            error!(error = %err, "emergency local cache write failed");
        }
    }

    /// A failed persist keeps the optimistic mutation in memory, so the UI
    /// still has to repaint; a validation failure never touched the state.
    fn refresh_if_mutated(&self, err: &SyncError) {
        if matches!(err, SyncError::Persistence { .. } | SyncError::Local(_)) {
            self.events.refresh();
        }
    }

    fn notify_failure(&self, err: &SyncError, persistence_message: &str) {
        let message = match err {
            SyncError::Validation(validation) => validation.to_string(),
            _ => persistence_message.to_owned(),
        };
        self.events.notify(Notice::Error(message));
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::catalog::{InventoryPolicy, MemoryCatalog, Product, Variant};
    use crate::events::RecordingEvents;
    use crate::identity;
    use crate::store::{MemoryLocalStore, MemoryWishlistStore};

    use super::*;

    struct Fixture {
        engine: WishlistEngine,
        store: Arc<MemoryWishlistStore>,
        local: Arc<MemoryLocalStore>,
        catalog: Arc<MemoryCatalog>,
        events: Arc<RecordingEvents>,
        handle: identity::IdentityHandle,
    }

    fn fixture() -> Fixture {
        let (handle, gate) = identity::channel();
        let store = Arc::new(MemoryWishlistStore::new());
        let local = Arc::new(MemoryLocalStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let events = Arc::new(RecordingEvents::new());
        let engine = WishlistEngine::new(
            SyncConfig::default(),
            gate,
            Arc::clone(&store) as Arc<dyn WishlistStore>,
            Arc::clone(&local) as Arc<dyn LocalStore>,
            Arc::clone(&catalog) as Arc<dyn ProductCatalog>,
            Arc::clone(&events) as Arc<dyn EngineEvents>,
        );
        Fixture {
            engine,
            store,
            local,
            catalog,
            events,
            handle,
        }
    }

    async fn guest_fixture() -> Fixture {
        let fx = fixture();
        fx.handle.resolve_anonymous();
        let mut fx = fx;
        fx.engine.init().await;
        fx
    }

    fn input(product_id: ProductId) -> WishlistItemInput {
        WishlistItemInput {
            product_id,
            product_name: Some("Merino Scarf".to_owned()),
            product_image: Some("/img/scarf.webp".to_owned()),
            unit_price: Some(Decimal::new(3500, 2)),
            in_stock: Some(true),
        }
    }

    fn catalog_product(in_stock: bool) -> Product {
        Product {
            id: ProductId::generate(),
            name: "Quilted Vest".to_owned(),
            main_image: "/img/vest.webp".to_owned(),
            base_price: Decimal::new(7000, 2),
            is_active: true,
            track_inventory: true,
            continue_selling_when_out_of_stock: false,
            variants: vec![Variant {
                id: faithline_core::VariantId::generate(),
                product_id: ProductId::generate(),
                price: None,
                size: None,
                color: None,
                is_active: true,
                inventory_policy: InventoryPolicy::Deny,
                inventory_quantity: if in_stock { 5 } else { 0 },
            }],
        }
    }

    #[tokio::test]
    async fn test_toggle_adds_then_removes() {
        let mut fx = guest_fixture().await;
        let product = ProductId::generate();

        let outcome = fx.engine.toggle(input(product)).await.expect("add");
        assert_eq!(outcome, ToggleOutcome::Added);
        assert!(fx.engine.contains(product));

        let outcome = fx.engine.toggle(input(product)).await.expect("remove");
        assert_eq!(outcome, ToggleOutcome::Removed);
        assert!(!fx.engine.contains(product));
        assert!(fx.engine.is_empty());

        let notices = fx.events.notices();
        assert_eq!(
            notices,
            vec![
                Notice::Success("Added to wishlist!".to_owned()),
                Notice::Success("Removed from wishlist".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_toggle_persists_to_guest_key() {
        let mut fx = guest_fixture().await;
        fx.engine
            .toggle(input(ProductId::generate()))
            .await
            .expect("add");

        let raw = fx.local.get("wishlist").expect("written");
        let saved: Vec<WishlistItem> = serde_json::from_str(&raw).expect("decode");
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_enriches_from_catalog_and_checks_stock() {
        let mut fx = guest_fixture().await;

        let listed = catalog_product(true);
        let listed_id = listed.id;
        fx.catalog.put(listed);
        fx.engine
            .toggle(WishlistItemInput::new(listed_id))
            .await
            .expect("enriched add");
        assert_eq!(fx.engine.items()[0].product_name, "Quilted Vest");
        assert_eq!(
            fx.engine.items()[0].unit_price.amount(),
            Decimal::new(7000, 2)
        );

        let sold_out = catalog_product(false);
        let sold_out_id = sold_out.id;
        fx.catalog.put(sold_out);
        let err = fx
            .engine
            .toggle(WishlistItemInput::new(sold_out_id))
            .await
            .expect_err("out of stock");
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::OutOfStock)
        ));

        let mut delisted = catalog_product(true);
        delisted.is_active = false;
        let delisted_id = delisted.id;
        fx.catalog.put(delisted);
        let err = fx
            .engine
            .toggle(WishlistItemInput::new(delisted_id))
            .await
            .expect_err("inactive");
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::ProductUnavailable)
        ));

        let err = fx
            .engine
            .toggle(WishlistItemInput::new(ProductId::generate()))
            .await
            .expect_err("unknown");
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::ProductUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_toggle_removes_delisted_product_without_catalog() {
        let mut fx = guest_fixture().await;
        let product = ProductId::generate();
        fx.engine.toggle(input(product)).await.expect("add");

        // Removal of a product no longer in the catalog still works.
        let outcome = fx
            .engine
            .toggle(WishlistItemInput::new(product))
            .await
            .expect("remove");
        assert_eq!(outcome, ToggleOutcome::Removed);
    }

    #[tokio::test]
    async fn test_remove_absent_product_is_noop() {
        let mut fx = guest_fixture().await;
        fx.engine
            .remove(ProductId::generate())
            .await
            .expect("no-op");
        assert!(fx.events.notices().is_empty());
    }

    #[tokio::test]
    async fn test_account_full_replace_rewrites_rows() {
        let user = UserId::generate();
        let fx = fixture();
        fx.handle.resolve_authenticated(user);
        let mut fx = fx;
        fx.engine.init().await;

        let first = ProductId::generate();
        let second = ProductId::generate();
        fx.engine.toggle(input(first)).await.expect("first");
        fx.engine.toggle(input(second)).await.expect("second");
        assert_eq!(fx.store.rows().len(), 2);

        fx.engine.toggle(input(first)).await.expect("remove first");
        let rows = fx.store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id, second);
    }

    #[tokio::test]
    async fn test_account_save_failure_restores_backup() {
        let user = UserId::generate();
        let fx = fixture();
        let kept = ProductId::generate();
        fx.store
            .insert(vec![NewWishlistRow {
                user_id: user,
                product_id: kept,
            }])
            .await
            .expect("seed remote");
        fx.handle.resolve_authenticated(user);
        let mut fx = fx;
        fx.engine.init().await;
        assert_eq!(fx.engine.len(), 1);

        // The bulk insert of the replacement fails; the backup comes back.
        fx.store.fail_next_insert();
        let err = fx
            .engine
            .toggle(input(ProductId::generate()))
            .await
            .expect_err("insert refused");
        assert!(matches!(
            err,
            SyncError::Persistence {
                rolled_back: true,
                ..
            }
        ));

        let rows = fx.store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id, kept);
    }

    #[tokio::test]
    async fn test_failed_account_save_still_refreshes_ui() {
        let user = UserId::generate();
        let fx = fixture();
        fx.handle.resolve_authenticated(user);
        let mut fx = fx;
        fx.engine.init().await;
        let before = fx.events.refresh_count();

        fx.store.fail_next_insert();
        fx.engine
            .toggle(input(ProductId::generate()))
            .await
            .expect_err("insert refused");

        // The optimistic entry stays in memory, so the view must repaint.
        assert_eq!(fx.engine.len(), 1);
        assert!(fx.events.refresh_count() > before);
    }

    #[tokio::test]
    async fn test_merge_on_login_unions_by_product() {
        let user = UserId::generate();
        let shared = ProductId::generate();
        let guest_only = ProductId::generate();

        let fx = fixture();
        fx.store
            .insert(vec![NewWishlistRow {
                user_id: user,
                product_id: shared,
            }])
            .await
            .expect("seed remote");
        let guest_list = vec![
            WishlistItem {
                product_id: shared,
                product_name: "Shared Knit".to_owned(),
                product_image: String::new(),
                unit_price: Price::new(Decimal::new(5400, 2)).expect("price"),
                added_at: Utc::now(),
                in_stock: true,
            },
            WishlistItem {
                product_id: guest_only,
                product_name: "Guest Cap".to_owned(),
                product_image: String::new(),
                unit_price: Price::new(Decimal::new(2200, 2)).expect("price"),
                added_at: Utc::now(),
                in_stock: true,
            },
        ];
        fx.local
            .set("wishlist", &serde_json::to_string(&guest_list).expect("encode"));

        fx.handle.resolve_authenticated(user);
        let mut fx = fx;
        fx.engine.init().await;

        assert_eq!(fx.engine.len(), 2);
        assert!(fx.engine.contains(shared));
        assert!(fx.engine.contains(guest_only));
        assert_eq!(fx.local.get("wishlist"), None);

        let rows = fx.store.rows();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_merge_fallback_ensures_presence_without_toggling_off() {
        let user = UserId::generate();
        let shared = ProductId::generate();

        let fx = fixture();
        fx.store
            .insert(vec![NewWishlistRow {
                user_id: user,
                product_id: shared,
            }])
            .await
            .expect("seed remote");
        let guest_list = vec![WishlistItem {
            product_id: shared,
            product_name: "Shared Knit".to_owned(),
            product_image: String::new(),
            unit_price: Price::new(Decimal::new(5400, 2)).expect("price"),
            added_at: Utc::now(),
            in_stock: true,
        }];
        fx.local
            .set("wishlist", &serde_json::to_string(&guest_list).expect("encode"));

        // First list call fails so the merge takes the fallback path.
        fx.store.fail_next_list();
        fx.handle.resolve_authenticated(user);
        let mut fx = fx;
        fx.engine.init().await;

        // The shared product stays on the list exactly once.
        assert_eq!(fx.engine.len(), 1);
        assert!(fx.engine.contains(shared));
        assert_eq!(fx.local.get("wishlist"), None);
        assert_eq!(fx.store.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_event_reloads_guest_wishlist() {
        let mut fx = guest_fixture().await;
        assert!(fx.engine.is_empty());

        let other_tab = vec![WishlistItem {
            product_id: ProductId::generate(),
            product_name: "Suede Loafers".to_owned(),
            product_image: String::new(),
            unit_price: Price::new(Decimal::new(12000, 2)).expect("price"),
            added_at: Utc::now(),
            in_stock: true,
        }];
        fx.local.external_set(
            "wishlist",
            &serde_json::to_string(&other_tab).expect("encode"),
        );

        fx.engine.handle_storage_event("wishlist");
        assert_eq!(fx.engine.len(), 1);

        fx.engine.handle_storage_event("cart");
        assert_eq!(fx.engine.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_to_guest_clears_state_and_key() {
        let mut fx = guest_fixture().await;
        fx.engine
            .toggle(input(ProductId::generate()))
            .await
            .expect("add");
        assert!(fx.local.get("wishlist").is_some());

        fx.engine.reset_to_guest();
        assert!(fx.engine.is_empty());
        assert_eq!(fx.local.get("wishlist"), None);
    }

    mod move_to_cart {
        use crate::cart::CartEngine;
        use crate::events::NoopEvents;
        use crate::store::{CartStore, MemoryCartStore};

        use super::*;

        async fn guest_cart(
            handle: &identity::IdentityHandle,
            local: &Arc<MemoryLocalStore>,
            catalog: &Arc<MemoryCatalog>,
        ) -> CartEngine {
            let mut cart = CartEngine::new(
                SyncConfig::default(),
                handle.gate(),
                Arc::new(MemoryCartStore::new()) as Arc<dyn CartStore>,
                Arc::clone(local) as Arc<dyn LocalStore>,
                Arc::clone(catalog) as Arc<dyn ProductCatalog>,
                Arc::new(NoopEvents),
            );
            cart.init().await;
            cart
        }

        #[tokio::test]
        async fn test_move_to_cart_transfers_single_entry() {
            let mut fx = guest_fixture().await;
            let mut cart = guest_cart(&fx.handle, &fx.local, &fx.catalog).await;

            let product = ProductId::generate();
            fx.engine.toggle(input(product)).await.expect("add");

            fx.engine
                .move_to_cart(&mut cart, product)
                .await
                .expect("move");

            assert!(!fx.engine.contains(product));
            assert_eq!(cart.unique_count(), 1);
            assert_eq!(cart.items()[0].product_id, product);
            assert_eq!(cart.items()[0].quantity, 1);
        }

        #[tokio::test]
        async fn test_move_to_cart_keeps_entry_when_cart_rejects() {
            let mut config = SyncConfig::default();
            config.limits.max_unique_products = 0;
            let mut fx = guest_fixture().await;
            let (handle, gate) = identity::channel();
            handle.resolve_anonymous();
            let mut cart = CartEngine::new(
                config,
                gate,
                Arc::new(MemoryCartStore::new()) as Arc<dyn CartStore>,
                Arc::clone(&fx.local) as Arc<dyn LocalStore>,
                Arc::clone(&fx.catalog) as Arc<dyn ProductCatalog>,
                Arc::new(NoopEvents),
            );
            cart.init().await;

            let product = ProductId::generate();
            fx.engine.toggle(input(product)).await.expect("add");

            fx.engine
                .move_to_cart(&mut cart, product)
                .await
                .expect_err("cart full");
            assert!(fx.engine.contains(product));
            assert_eq!(cart.unique_count(), 0);
        }

        #[tokio::test]
        async fn test_move_all_reports_moved_and_skipped() {
            let mut config = SyncConfig::default();
            config.limits.max_unique_products = 1;
            let mut fx = guest_fixture().await;
            let (handle, gate) = identity::channel();
            handle.resolve_anonymous();
            let mut cart = CartEngine::new(
                config,
                gate,
                Arc::new(MemoryCartStore::new()) as Arc<dyn CartStore>,
                Arc::clone(&fx.local) as Arc<dyn LocalStore>,
                Arc::clone(&fx.catalog) as Arc<dyn ProductCatalog>,
                Arc::new(NoopEvents),
            );
            cart.init().await;

            let first = ProductId::generate();
            let second = ProductId::generate();
            fx.engine.toggle(input(first)).await.expect("first");
            fx.engine.toggle(input(second)).await.expect("second");

            let report = fx
                .engine
                .move_all_to_cart(&mut cart)
                .await
                .expect("move all");

            // The one-line cart takes the first entry and rejects the
            // second; the list is cleared either way.
            assert_eq!(report, MoveReport { moved: 1, skipped: 1 });
            assert_eq!(cart.unique_count(), 1);
            assert_eq!(cart.items()[0].product_id, first);
            assert!(cart.items().iter().all(|i| i.product_id != second));
            assert!(fx.engine.is_empty());
        }
    }
}
