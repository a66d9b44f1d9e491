//! Local key-value store: the guest backend.
//!
//! In production this is backed by browser `localStorage`; the trait is the
//! narrow synchronous surface the engines need. Writes from the *same*
//! context do not produce change events (matching the browser's storage
//! event semantics); only other contexts (tabs) do, via [`LocalStore::subscribe`].

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

/// Synchronous key-value persistence scoped to the browsing context.
pub trait LocalStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Write `value` under `key`.
    fn set(&self, key: &str, value: &str);

    /// Remove `key`.
    fn remove(&self, key: &str);

    /// Subscribe to keys changed by other contexts (cross-tab storage
    /// events). The engines reload their guest collection when their key
    /// fires.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// In-memory [`LocalStore`], the reference implementation used in tests.
#[derive(Debug)]
pub struct MemoryLocalStore {
    entries: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<String>,
}

impl MemoryLocalStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Write a value as if another tab did it: the change event fires.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the lock panicked.
    pub fn external_set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .expect("local store lock")
            .insert(key.to_owned(), value.to_owned());
        let _ = self.changes.send(key.to_owned());
    }

    /// Remove a key as if another tab did it.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the lock panicked.
    pub fn external_remove(&self, key: &str) {
        self.entries.lock().expect("local store lock").remove(key);
        let _ = self.changes.send(key.to_owned());
    }
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().expect("local store lock").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .expect("local store lock")
            .insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().expect("local store lock").remove(key);
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_remove() {
        let store = MemoryLocalStore::new();
        assert_eq!(store.get("cart"), None);

        store.set("cart", "[]");
        assert_eq!(store.get("cart").as_deref(), Some("[]"));

        store.remove("cart");
        assert_eq!(store.get("cart"), None);
    }

    #[tokio::test]
    async fn test_same_context_writes_do_not_fire_events() {
        let store = MemoryLocalStore::new();
        let mut rx = store.subscribe();

        store.set("cart", "[]");
        assert!(rx.try_recv().is_err());

        store.external_set("cart", "[{}]");
        assert_eq!(rx.try_recv().expect("change event"), "cart");
    }
}
