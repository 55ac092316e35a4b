//! Bounded public key -> address cache
//!
//! Address derivation goes through the chain account service, so results
//! are memoized. Uses the `cached` crate's `SizedCache`, which evicts the
//! least recently used entry once `capacity` is reached. One instance is
//! created at startup and handed to every gateway that resolves addresses.

use std::sync::Mutex;

use cached::{Cached, SizedCache};

pub const DEFAULT_CAPACITY: usize = 10_000;

pub struct AddressCache {
    inner: Mutex<SizedCache<String, String>>,
    capacity: usize,
}

impl AddressCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(SizedCache::with_size(capacity)),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.cache_get(&key.to_string()).cloned()
    }

    pub fn insert(&self, key: &str, address: &str) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.cache_set(key.to_string(), address.to_string());
    }

    pub fn len(&self) -> usize {
        let cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.cache_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
