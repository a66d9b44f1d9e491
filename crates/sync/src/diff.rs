//! Diff-and-sync: minimal insert/update/delete sets for cart persistence.
//!
//! Persisting a cart must not delete-and-reinsert the whole remote
//! collection: that loses row identity, breaks concurrent-tab consistency,
//! and a partial failure can leave the remote store empty. Instead the
//! engine fetches the current rows and computes the minimal operation sets
//! here, keyed by the cart identity key.

use std::collections::HashMap;

use faithline_core::{RowId, UserId};

use crate::item::{CartKey, LineItem};
use crate::store::{CartRow, NewCartRow};

/// The operations needed to make the remote rows match the in-memory cart.
#[derive(Debug, Default)]
pub struct CartDiff {
    /// Lines with no remote row yet.
    pub to_insert: Vec<NewCartRow>,
    /// Remote rows whose quantity differs, as `(row, new_quantity)`.
    pub to_update: Vec<(RowId, u32)>,
    /// Remote rows with no in-memory line anymore.
    pub to_delete: Vec<RowId>,
}

impl CartDiff {
    /// Whether there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// The identity key of a remote row.
const fn row_key(row: &CartRow) -> CartKey {
    CartKey {
        product_id: row.product_id,
        variant_id: row.variant_id,
    }
}

/// Compute the minimal operations turning `existing` (remote) into `items`
/// (memory) for `user_id`.
///
/// Both sides are unique by identity key; duplicate remote rows (legacy
/// data) resolve to the last row per key, leaving earlier duplicates to be
/// deleted.
#[must_use]
pub fn compute_cart_diff(user_id: UserId, items: &[LineItem], existing: &[CartRow]) -> CartDiff {
    let mut remote_by_key: HashMap<CartKey, &CartRow> = HashMap::with_capacity(existing.len());
    let mut duplicates: Vec<RowId> = Vec::new();
    for row in existing {
        if let Some(previous) = remote_by_key.insert(row_key(row), row) {
            duplicates.push(previous.id);
        }
    }

    let mut diff = CartDiff {
        to_delete: duplicates,
        ..CartDiff::default()
    };

    for item in items {
        match remote_by_key.remove(&item.key()) {
            Some(row) => {
                if row.quantity != item.quantity {
                    diff.to_update.push((row.id, item.quantity));
                }
            }
            None => diff.to_insert.push(NewCartRow {
                user_id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
            }),
        }
    }

    // Whatever remains remotely has no in-memory line.
    diff.to_delete.extend(remote_by_key.values().map(|row| row.id));

    diff
}
