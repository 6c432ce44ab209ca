//! A registry of async mutexes keyed by value.
//!
//! Used for the two shared-mutation points in the engine: per-order serialization of lifecycle transitions, and the
//! single-flight guard on token exchanges. Guards are `OwnedMutexGuard`s so they can be held across awaits without
//! borrowing the registry.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub struct KeyedLock<K> {
    entries: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLock<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> KeyedLock<K> {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Waits for, and takes, the lock for `key`. Locks are created on first use and kept for the lifetime of the
    /// registry; the key space here (orders in flight, token subjects) is small and bounded.
    pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.entries.lock().expect("keyed lock registry poisoned");
            Arc::clone(map.entry(key.clone()).or_default())
        };
        entry.lock_owned().await
    }
}
