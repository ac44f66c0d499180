//! Per-key at-most-once computation
//!
//! The table lock is only held to find or create a key's cell. Initialization
//! runs under the cell, so callers of distinct keys never wait on each other
//! while callers of the same key all observe the single result.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

pub(crate) struct KeyedOnce<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for KeyedOnce<K, V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> KeyedOnce<K, V> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Value for `key`, running `init` if nobody has completed it yet
    ///
    /// If an initializing caller is cancelled, the next waiter runs its own
    /// `init` instead.
    pub(crate) async fn get_or_init<F, Fut>(&self, key: &K, init: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = self.cell(key);
        cell.get_or_init(init).await.clone()
    }

    /// Completed value for `key`, if any
    #[cfg(test)]
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<V>> {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.entry(key.clone()).or_default().clone()
    }
}
