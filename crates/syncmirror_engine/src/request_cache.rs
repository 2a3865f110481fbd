//! Memoized request results with a time-to-live.
//!
//! Results live in the durable store's TTL table and survive reloads.
//! Expiry is lazy: an expired entry is deleted the first time a read
//! finds it, never by a sweeper. Store trouble degrades to cache misses.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use syncmirror_protocol::{from_cbor, to_cbor};
use syncmirror_store::{now_ms, CacheEntry, DurableStore};
use tracing::{debug, warn};

/// A typed TTL cache over the durable store.
pub struct RequestCache {
    store: Option<Arc<dyn DurableStore>>,
}

impl RequestCache {
    /// Creates a cache over the given store, or an always-missing cache
    /// when no store is configured.
    pub fn new(store: Option<Arc<dyn DurableStore>>) -> Self {
        Self { store }
    }

    /// Returns the cached value under `key`, if present and fresh.
    ///
    /// An expired entry is removed on the spot and reported as a miss, as
    /// is an entry that fails to decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self.store.as_ref()?;
        let entry = match store.get_cache(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(error) => {
                warn!(%key, %error, "ttl cache read failed");
                return None;
            }
        };

        if entry.is_expired(now_ms()) {
            debug!(%key, "ttl cache entry expired");
            if let Err(error) = store.remove_cache(key) {
                warn!(%key, %error, "expired entry cleanup failed");
            }
            return None;
        }

        match from_cbor(&entry.value) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(%key, %error, "ttl cache entry undecodable, dropping");
                let _ = store.remove_cache(key);
                None
            }
        }
    }

    /// Stores a value under `key` for `ttl`, overwriting any entry there.
    ///
    /// Returns true if the value was stored.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        let bytes = match to_cbor(value) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%key, %error, "ttl cache encode failed");
                return false;
            }
        };
        let entry = CacheEntry::new(key, bytes, ttl.as_millis() as i64);
        match store.put_cache(&entry) {
            Ok(()) => true,
            Err(error) => {
                warn!(%key, %error, "ttl cache write failed");
                false
            }
        }
    }

    /// Removes the entry under `key`, if any.
    pub fn clear(&self, key: &str) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        match store.remove_cache(key) {
            Ok(removed) => removed,
            Err(error) => {
                warn!(%key, %error, "ttl cache clear failed");
                false
            }
        }
    }
}
