//! Cart reconciliation engine.
//!
//! Owns the in-memory cart and reconciles it across the guest local store
//! and the account `cart_items` collection. Mutations apply optimistically
//! in memory, then persist; account persistence is diff-based with rollback
//! to the pre-save snapshot on partial failure, falling back to the local
//! store when even the rollback fails.
//!
//! Mutations take `&mut self` and complete their persistence before
//! returning, so a single engine instance cannot interleave two saves: each
//! diff is computed against remote state that already reflects the previous
//! mutation.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, instrument, warn};

use faithline_core::{Price, UserId, VariantId};

use crate::catalog::ProductCatalog;
use crate::config::SyncConfig;
use crate::diff::{CartDiff, compute_cart_diff};
use crate::error::{Result, StoreError, SyncError, ValidationError};
use crate::events::{EngineEvents, Notice};
use crate::identity::{IdentityGate, SessionState};
use crate::item::{CartItemInput, LineItem, normalize_quantity, validate_price};
use crate::store::{CartRow, CartStore, LocalStore, NewCartRow};

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Constructed, `init` not called yet.
    Uninitialized,
    /// Waiting for the identity gate / fetching the initial collection.
    Loading,
    /// Loading the guest collection from the local store.
    GuestLocal,
    /// Loading the account collection from the remote store.
    AccountRemote,
    /// Merging a guest collection into the account collection.
    Merging,
    /// Initial load complete; the engine serves mutations.
    Ready,
}

/// Which backend owns the collection for this engine lifecycle.
///
/// Selected once at `init` from the resolved identity; it changes at most
/// once more, back to `Guest`, on sign-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Unauthenticated: the local store under the guest key.
    Guest,
    /// Authenticated: the remote collection scoped to this user.
    Account(UserId),
}

/// A fully resolved and validated `add` candidate.
struct ResolvedItem {
    variant_id: Option<VariantId>,
    product_name: String,
    product_image: String,
    unit_price: Price,
    quantity: u32,
    size: Option<String>,
    color: Option<String>,
    in_stock: bool,
}

/// The cart reconciliation engine.
pub struct CartEngine {
    items: Vec<LineItem>,
    state: LoadState,
    backend: StorageBackend,
    config: SyncConfig,
    identity: IdentityGate,
    store: Arc<dyn CartStore>,
    local: Arc<dyn LocalStore>,
    catalog: Arc<dyn ProductCatalog>,
    events: Arc<dyn EngineEvents>,
}

impl CartEngine {
    /// Create an engine. Call [`CartEngine::init`] before mutating.
    #[must_use]
    pub fn new(
        config: SyncConfig,
        identity: IdentityGate,
        store: Arc<dyn CartStore>,
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
    /// Never fails: remote load errors degrade to a local-store read and an
    /// unresolved identity gate degrades to guest mode, both logged.
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

    /// React to a cross-tab change of the guest cart key.
    ///
    /// The presentation adapter forwards local-store change events here;
    /// keys other than the cart key, and events while authenticated, are
    /// ignored (the remote collection is authoritative then).
    pub fn handle_storage_event(&mut self, key: &str) {
        if key != self.config.cart_storage_key || self.backend != StorageBackend::Guest {
            return;
        }
        self.items = self.read_local();
        self.events.refresh();
    }

    /// Drop account state after sign-out: empty guest collection, guest
    /// key cleared (the session's cart belongs to the account, not to the
    /// next guest on this machine).
    pub fn reset_to_guest(&mut self) {
        self.backend = StorageBackend::Guest;
        self.items.clear();
        self.local.remove(&self.config.cart_storage_key);
        self.events.refresh();
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The in-memory collection, in display order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Sum of `unit_price * quantity` over all lines.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.items.iter().map(LineItem::line_total).sum()
    }

    /// Sum of quantities over all lines (the badge number).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0, |count, item| count.saturating_add(item.quantity))
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn unique_count(&self) -> usize {
        self.items.len()
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

    /// Add an item (or increase an existing line's quantity).
    ///
    /// Inputs missing a product name are enriched from the catalog, which
    /// also applies the stock rules. The mutation is validated against the
    /// per-line, unique-line, and total-quantity caps; a cap violation
    /// reverts the in-memory change before any persistence is attempted.
    ///
    /// # Errors
    ///
    /// [`SyncError::Validation`] for rejected input or an exceeded cap;
    /// [`SyncError::Persistence`] when the remote save failed (after
    /// rollback or local fallback).
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn add(&mut self, input: CartItemInput) -> Result<()> {
        match self.try_add(input).await {
            Ok(()) => {
                self.events.refresh();
                self.events
                    .notify(Notice::Success("Item added to cart!".to_owned()));
                Ok(())
            }
            Err(err) => {
                self.refresh_if_mutated(&err);
                self.notify_failure(&err, "Failed to add item. Please try again.");
                Err(err)
            }
        }
    }

    async fn try_add(&mut self, input: CartItemInput) -> Result<()> {
        if input.product_id.is_nil() {
            return Err(ValidationError::MissingProductId.into());
        }
        let product_id = input.product_id;
        let resolved = self.resolve_input(input).await?;
        let quantity = resolved.quantity;
        let limits = self.config.limits;

        let existing_index = self.items.iter().position(|item| {
            item.product_id == product_id && item.variant_id == resolved.variant_id
        });

        match existing_index {
            Some(index) => {
                let Some(item) = self.items.get_mut(index) else {
                    return Err(SyncError::OutOfRange {
                        index,
                        len: self.items.len(),
                    });
                };
                let new_quantity = item.quantity.saturating_add(quantity);
                if new_quantity > limits.max_quantity_per_item {
                    return Err(ValidationError::PerItemLimit {
                        max: limits.max_quantity_per_item,
                    }
                    .into());
                }
                item.quantity = new_quantity;
            }
            None => {
                if self.items.len() >= limits.max_unique_products as usize {
                    return Err(ValidationError::UniqueItemLimit {
                        max: limits.max_unique_products,
                    }
                    .into());
                }
                self.items.push(LineItem {
                    product_id,
                    variant_id: resolved.variant_id,
                    product_name: resolved.product_name,
                    product_image: resolved.product_image,
                    unit_price: resolved.unit_price,
                    quantity,
                    size: resolved.size,
                    color: resolved.color,
                    added_at: Utc::now(),
                    in_stock: resolved.in_stock,
                });
            }
        }

        if self.item_count() > limits.max_total_items {
            // Revert before anything reaches storage: no partial commit.
            match existing_index {
                Some(index) => {
                    if let Some(item) = self.items.get_mut(index) {
                        item.quantity -= quantity;
                    }
                }
                None => {
                    self.items.pop();
                }
            }
            return Err(ValidationError::TotalItemLimit {
                max: limits.max_total_items,
            }
            .into());
        }

        self.persist().await
    }

    /// Remove the line at `index`.
    ///
    /// # Errors
    ///
    /// [`SyncError::OutOfRange`] for an invalid index (the collection is
    /// untouched); [`SyncError::Persistence`] when the save failed.
    #[instrument(skip(self))]
    pub async fn remove(&mut self, index: usize) -> Result<()> {
        if index >= self.items.len() {
            error!(index, len = self.items.len(), "invalid cart item index");
            return Err(SyncError::OutOfRange {
                index,
                len: self.items.len(),
            });
        }
        self.items.remove(index);

        match self.persist().await {
            Ok(()) => {
                self.events.refresh();
                Ok(())
            }
            Err(err) => {
                self.refresh_if_mutated(&err);
                self.notify_failure(&err, "Failed to remove item. Please try again.");
                Err(err)
            }
        }
    }

    /// Set the quantity of the line at `index`. Zero delegates to
    /// [`CartEngine::remove`].
    ///
    /// # Errors
    ///
    /// [`SyncError::Validation`] when the new quantity violates the
    /// per-line or total cap (the collection is untouched);
    /// [`SyncError::OutOfRange`] / [`SyncError::Persistence`] as for
    /// `remove`.
    #[instrument(skip(self))]
    pub async fn set_quantity(&mut self, index: usize, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return self.remove(index).await;
        }

        let limits = self.config.limits;
        let Some(current) = self.items.get(index) else {
            return Err(SyncError::OutOfRange {
                index,
                len: self.items.len(),
            });
        };
        let old_quantity = current.quantity;

        if quantity > limits.max_quantity_per_item {
            let err = ValidationError::PerItemLimit {
                max: limits.max_quantity_per_item,
            };
            self.events.notify(Notice::Error(err.to_string()));
            return Err(err.into());
        }

        let projected = self
            .item_count()
            .saturating_sub(old_quantity)
            .saturating_add(quantity);
        if projected > limits.max_total_items {
            let err = ValidationError::TotalItemLimit {
                max: limits.max_total_items,
            };
            self.events.notify(Notice::Error(err.to_string()));
            return Err(err.into());
        }

        if let Some(item) = self.items.get_mut(index) {
            item.quantity = quantity;
        }

        match self.persist().await {
            Ok(()) => {
                self.events.refresh();
                Ok(())
            }
            Err(err) => {
                self.refresh_if_mutated(&err);
                self.notify_failure(&err, "Failed to update quantity. Please try again.");
                Err(err)
            }
        }
    }

    /// Empty the cart and persist the empty state.
    ///
    /// The UI refresh fires even when the save fails (the in-memory cart
    /// is empty either way; the failure went to the local fallback).
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

    // =========================================================================
    // Input resolution
    // =========================================================================

    /// Enrich and validate an `add` input into a candidate line.
    async fn resolve_input(&self, input: CartItemInput) -> Result<ResolvedItem> {
        let quantity = normalize_quantity(input.quantity, &self.config.limits)?;

        if input.product_name.is_some() {
            let amount = input.unit_price.ok_or(ValidationError::InvalidPrice)?;
            return Ok(ResolvedItem {
                variant_id: input.variant_id,
                product_name: input.product_name.unwrap_or_default(),
                product_image: input.product_image.unwrap_or_default(),
                unit_price: validate_price(amount)?,
                quantity,
                size: input.size,
                color: input.color,
                in_stock: input.in_stock.unwrap_or(true),
            });
        }

        // Bare input: join the catalog for details and stock checks.
        let product = self
            .catalog
            .product(input.product_id)
            .await
            .map_err(|err| {
                warn!(error = %err, "catalog lookup failed during add");
                ValidationError::ProductUnavailable
            })?
            .ok_or(ValidationError::ProductUnavailable)?;

        let (variant_id, unit_price, size, color) = match input.variant_id {
            Some(id) => {
                let variant = self
                    .catalog
                    .variant(id)
                    .await
                    .map_err(|err| {
                        warn!(error = %err, "catalog lookup failed during add");
                        ValidationError::ProductUnavailable
                    })?
                    .filter(|variant| variant.is_active)
                    .ok_or(ValidationError::ProductUnavailable)?;
                if !variant.purchasable() {
                    return Err(ValidationError::OutOfStock.into());
                }
                let price = product.effective_price(Some(&variant));
                (Some(id), validate_price(price)?, variant.size, variant.color)
            }
            None => {
                if !product.sellable_without_variant() {
                    return Err(ValidationError::OutOfStock.into());
                }
                (
                    None,
                    validate_price(product.base_price)?,
                    input.size,
                    input.color,
                )
            }
        };

        Ok(ResolvedItem {
            variant_id,
            product_name: product.name,
            product_image: product.main_image,
            unit_price,
            quantity,
            size,
            color,
            in_stock: true,
        })
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Read the guest collection; unreadable JSON counts as empty.
    fn read_local(&self) -> Vec<LineItem> {
        let Some(raw) = self.local.get(&self.config.cart_storage_key) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(items) => self.clamp_quantities(items),
            Err(err) => {
                warn!(error = %err, "unreadable guest cart, treating as empty");
                Vec::new()
            }
        }
    }

    /// Stored payloads can disagree with the configured caps (another tab,
    /// an old limit, a hand-edited store); oversized quantities are clamped
    /// on the way in.
    fn clamp_quantities(&self, mut items: Vec<LineItem>) -> Vec<LineItem> {
        let cap = self.config.limits.max_quantity_per_item;
        for item in &mut items {
            if item.quantity > cap {
                warn!(
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    cap,
                    "clamping oversized stored quantity"
                );
                item.quantity = cap;
            }
        }
        items
    }

    /// Load the account collection, degrading to the local store on error.
    async fn load_account(&mut self, user_id: UserId) {
        match self.fetch_account_items(user_id).await {
            Ok(items) => self.items = items,
            Err(err) => {
                warn!(error = %err, "failed to load remote cart, reading local store");
                self.items = self.read_local();
            }
        }
    }

    /// Fetch the user's rows and enrich them through the catalog.
    async fn fetch_account_items(&self, user_id: UserId) -> std::result::Result<Vec<LineItem>, StoreError> {
        let rows = self.store.list(user_id).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(self.item_from_row(row).await);
        }
        Ok(items)
    }

    /// Join a row with its product/variant. A product missing from the
    /// catalog still yields a line (placeholder name, zero price) so the
    /// user sees and can remove it.
    async fn item_from_row(&self, row: CartRow) -> LineItem {
        let product = match self.catalog.product(row.product_id).await {
            Ok(product) => product,
            Err(err) => {
                warn!(product_id = %row.product_id, error = %err, "catalog lookup failed during load");
                None
            }
        };
        let variant = match row.variant_id {
            Some(id) => match self.catalog.variant(id).await {
                Ok(variant) => variant,
                Err(err) => {
                    warn!(variant_id = %id, error = %err, "catalog lookup failed during load");
                    None
                }
            },
            None => None,
        };

        let amount = variant
            .as_ref()
            .and_then(|v| v.price)
            .or_else(|| product.as_ref().map(|p| p.base_price))
            .unwrap_or(Decimal::ZERO);
        let in_stock = variant.as_ref().map_or_else(
            || {
                product.as_ref().is_none_or(|p| {
                    !p.track_inventory || p.continue_selling_when_out_of_stock
                })
            },
            |v| v.inventory_quantity > 0,
        );

        LineItem {
            product_id: row.product_id,
            variant_id: row.variant_id,
            product_name: product
                .as_ref()
                .map_or_else(|| "Unknown Product".to_owned(), |p| p.name.clone()),
            product_image: product
                .as_ref()
                .map_or_else(String::new, |p| p.main_image.clone()),
            unit_price: Price::new(amount).unwrap_or(Price::ZERO),
            quantity: row.quantity.min(self.config.limits.max_quantity_per_item),
            size: variant.as_ref().and_then(|v| v.size.clone()),
            color: variant.as_ref().and_then(|v| v.color.clone()),
            added_at: row.created_at,
            in_stock,
        }
    }

    // =========================================================================
    // Merge-on-login
    // =========================================================================

    /// Merge the guest collection into the account collection.
    ///
    /// Happy path: seed with the remote lines, add guest quantities on key
    /// match, append the rest, persist, and only then clear the guest key.
    /// On any failure fall back to loading the remote collection and
    /// replaying each guest item through `add` so every item gets its own
    /// validation and limits; the guest key is cleared only after the
    /// replay, so guest state is never lost before it is reflected
    /// somewhere durable.
    #[instrument(skip(self, guest_items), fields(guest_count = guest_items.len()))]
    async fn merge_guest_into_account(&mut self, user_id: UserId, guest_items: Vec<LineItem>) {
        match self.try_merge(user_id, &guest_items).await {
            Ok(()) => {
                self.local.remove(&self.config.cart_storage_key);
            }
            Err(err) => {
                warn!(error = %err, "cart merge failed, replaying guest items individually");
                self.load_account(user_id).await;
                for item in &guest_items {
                    if let Err(replay_err) = self.add(CartItemInput::from(item)).await {
                        warn!(
                            product_id = %item.product_id,
                            error = %replay_err,
                            "guest cart item dropped during merge replay"
                        );
                    }
                }
                self.local.remove(&self.config.cart_storage_key);
            }
        }
    }

    async fn try_merge(&mut self, user_id: UserId, guest_items: &[LineItem]) -> Result<()> {
        let mut merged = self.fetch_account_items(user_id).await?;

        for guest in guest_items {
            match merged.iter_mut().find(|item| item.key() == guest.key()) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(guest.quantity);
                }
                None => merged.push(guest.clone()),
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

    /// Serialize the collection to the guest key. Also the emergency cache
    /// target when remote persistence fails beyond repair.
    fn write_local(&self) -> Result<()> {
        let payload = serde_json::to_string(&self.items)
            .map_err(crate::error::LocalStoreError::Encode)?;
        self.local.set(&self.config.cart_storage_key, &payload);
        Ok(())
    }

    /// Diff-and-sync against the user's remote rows.
    ///
    /// Fetches the current rows, computes insert/update/delete sets, and
    /// issues them as independent calls. On any failure the pre-save
    /// snapshot is restored (delete-all + reinsert); if the rollback itself
    /// fails, the in-memory state goes to the local store so nothing is
    /// silently lost, and the error surfaces either way.
    async fn persist_account(&mut self, user_id: UserId) -> Result<()> {
        let existing = match self.store.list(user_id).await {
            Ok(rows) => rows,
            Err(source) => {
                warn!(error = %source, "could not fetch cart rows before save, caching locally");
                self.cache_locally();
                return Err(SyncError::Persistence {
                    source,
                    rolled_back: false,
                });
            }
        };

        let diff = compute_cart_diff(user_id, &self.items, &existing);
        if diff.is_empty() {
            return Ok(());
        }

        match self.apply_diff(diff).await {
            Ok(()) => Ok(()),
            Err(source) => {
                error!(error = %source, "cart save failed, rolling back");
                match self.rollback(user_id, &existing).await {
                    Ok(()) => Err(SyncError::Persistence {
                        source,
                        rolled_back: true,
                    }),
                    Err(rollback_err) => {
                        error!(error = %rollback_err, "cart rollback failed, caching locally");
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

    async fn apply_diff(&self, diff: CartDiff) -> std::result::Result<(), StoreError> {
        if !diff.to_insert.is_empty() {
            self.store.insert(diff.to_insert).await?;
        }
        for (id, quantity) in diff.to_update {
            self.store.update_quantity(id, quantity).await?;
        }
        if !diff.to_delete.is_empty() {
            self.store.delete(diff.to_delete).await?;
        }
        Ok(())
    }

    /// Restore the pre-save snapshot. Prior row IDs may already be gone, so
    /// the snapshot comes back as fresh rows.
    async fn rollback(
        &self,
        user_id: UserId,
        snapshot: &[CartRow],
    ) -> std::result::Result<(), StoreError> {
        self.store.delete_all(user_id).await?;
        if snapshot.is_empty() {
            return Ok(());
        }
        let rows = snapshot
            .iter()
            .map(|row| NewCartRow {
                user_id: row.user_id,
                product_id: row.product_id,
                variant_id: row.variant_id,
                quantity: row.quantity,
            })
            .collect();
        self.store.insert(rows).await
    }

    /// Best-effort emergency write of the in-memory state to the local key.
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
