//! In-memory remote stores with scriptable failures.
//!
//! These back the engine tests: they behave like the real collections
//! (server-assigned row IDs and timestamps, per-call outcomes) and can be
//! told to fail specific upcoming operations so the rollback paths can be
//! exercised deterministically.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use faithline_core::{RowId, UserId};

use crate::error::StoreError;

use super::{CartRow, CartStore, NewCartRow, NewWishlistRow, WishlistRow, WishlistStore};

/// Which upcoming operations should fail.
#[derive(Debug, Default)]
struct FailureFlags {
    next_list: bool,
    next_insert: bool,
    next_update: bool,
    next_delete: bool,
    all_inserts: bool,
}

fn injected(op: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {op} failure"))
}

/// In-memory `cart_items` collection.
#[derive(Debug, Default)]
pub struct MemoryCartStore {
    rows: Mutex<Vec<CartRow>>,
    failures: Mutex<FailureFlags>,
}

impl MemoryCartStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows (test assertions).
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the lock panicked.
    #[must_use]
    pub fn rows(&self) -> Vec<CartRow> {
        self.rows.lock().expect("rows lock").clone()
    }

    /// Fail the next `list` call.
    pub fn fail_next_list(&self) {
        self.failures.lock().expect("failures lock").next_list = true;
    }

    /// Fail the next `insert` call.
    pub fn fail_next_insert(&self) {
        self.failures.lock().expect("failures lock").next_insert = true;
    }

    /// Fail every `insert` call until cleared.
    pub fn fail_all_inserts(&self, enabled: bool) {
        self.failures.lock().expect("failures lock").all_inserts = enabled;
    }

    /// Fail the next `update_quantity` call.
    pub fn fail_next_update(&self) {
        self.failures.lock().expect("failures lock").next_update = true;
    }

    /// Fail the next `delete`/`delete_all` call.
    pub fn fail_next_delete(&self) {
        self.failures.lock().expect("failures lock").next_delete = true;
    }

    fn take(&self, flag: impl Fn(&mut FailureFlags) -> &mut bool) -> bool {
        let mut failures = self.failures.lock().expect("failures lock");
        std::mem::take(flag(&mut failures))
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn list(&self, user_id: UserId) -> Result<Vec<CartRow>, StoreError> {
        if self.take(|f| &mut f.next_list) {
            return Err(injected("list"));
        }
        Ok(self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, rows: Vec<NewCartRow>) -> Result<(), StoreError> {
        let all = self.failures.lock().expect("failures lock").all_inserts;
        if all || self.take(|f| &mut f.next_insert) {
            return Err(injected("insert"));
        }
        let mut stored = self.rows.lock().expect("rows lock");
        for row in rows {
            stored.push(CartRow {
                id: RowId::generate(),
                user_id: row.user_id,
                product_id: row.product_id,
                variant_id: row.variant_id,
                quantity: row.quantity,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn update_quantity(&self, id: RowId, quantity: u32) -> Result<(), StoreError> {
        if self.take(|f| &mut f.next_update) {
            return Err(injected("update"));
        }
        let mut stored = self.rows.lock().expect("rows lock");
        match stored.iter_mut().find(|row| row.id == id) {
            Some(row) => {
                row.quantity = quantity;
                Ok(())
            }
            None => Err(StoreError::Unavailable(format!("no row {id}"))),
        }
    }

    async fn delete(&self, ids: Vec<RowId>) -> Result<(), StoreError> {
        if self.take(|f| &mut f.next_delete) {
            return Err(injected("delete"));
        }
        self.rows
            .lock()
            .expect("rows lock")
            .retain(|row| !ids.contains(&row.id));
        Ok(())
    }

    async fn delete_all(&self, user_id: UserId) -> Result<(), StoreError> {
        if self.take(|f| &mut f.next_delete) {
            return Err(injected("delete"));
        }
        self.rows
            .lock()
            .expect("rows lock")
            .retain(|row| row.user_id != user_id);
        Ok(())
    }
}

/// In-memory `wishlist_items` collection.
#[derive(Debug, Default)]
pub struct MemoryWishlistStore {
    rows: Mutex<Vec<WishlistRow>>,
    failures: Mutex<FailureFlags>,
}

impl MemoryWishlistStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows (test assertions).
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the lock panicked.
    #[must_use]
    pub fn rows(&self) -> Vec<WishlistRow> {
        self.rows.lock().expect("rows lock").clone()
    }

    /// Fail the next `list` call.
    pub fn fail_next_list(&self) {
        self.failures.lock().expect("failures lock").next_list = true;
    }

    /// Fail the next `insert` call.
    pub fn fail_next_insert(&self) {
        self.failures.lock().expect("failures lock").next_insert = true;
    }

    /// Fail the next `delete_all` call.
    pub fn fail_next_delete(&self) {
        self.failures.lock().expect("failures lock").next_delete = true;
    }

    fn take(&self, flag: impl Fn(&mut FailureFlags) -> &mut bool) -> bool {
        let mut failures = self.failures.lock().expect("failures lock");
        std::mem::take(flag(&mut failures))
    }
}

#[async_trait]
impl WishlistStore for MemoryWishlistStore {
    async fn list(&self, user_id: UserId) -> Result<Vec<WishlistRow>, StoreError> {
        if self.take(|f| &mut f.next_list) {
            return Err(injected("list"));
        }
        Ok(self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, rows: Vec<NewWishlistRow>) -> Result<(), StoreError> {
        if self.take(|f| &mut f.next_insert) {
            return Err(injected("insert"));
        }
        let mut stored = self.rows.lock().expect("rows lock");
        for row in rows {
            stored.push(WishlistRow {
                id: RowId::generate(),
                user_id: row.user_id,
                product_id: row.product_id,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn delete_all(&self, user_id: UserId) -> Result<(), StoreError> {
        if self.take(|f| &mut f.next_delete) {
            return Err(injected("delete"));
        }
        self.rows
            .lock()
            .expect("rows lock")
            .retain(|row| row.user_id != user_id);
        Ok(())
    }
}
