//! The durable store trait.

use crate::entry::{CacheEntry, QueueEntry};
use crate::error::StoreResult;
use uuid::Uuid;

/// The versioned namespace under which store data lives.
///
/// Bumping the suffix lets a newer build start fresh next to an older
/// layout instead of misreading it.
pub const STORE_NAMESPACE: &str = "syncmirror_v1";

/// Durable local storage behind the engine.
///
/// A store holds two logical tables, namespaced by [`STORE_NAMESPACE`]:
/// the pending-mutation log and the TTL cache.
///
/// # Invariants
///
/// - `append_mutation` is durable before it returns
/// - `list_mutations` returns entries in append order
/// - `put_cache` overwrites any previous entry under the same key
/// - implementations must be `Send + Sync`
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - for tests and ephemeral sessions
/// - [`crate::FileStore`] - for persistence across reloads
pub trait DurableStore: Send + Sync {
    /// Returns the versioned namespace this store writes under.
    fn namespace(&self) -> &str {
        STORE_NAMESPACE
    }

    /// Appends an entry to the pending-mutation log.
    fn append_mutation(&self, entry: &QueueEntry) -> StoreResult<()>;

    /// Removes a log entry by id. Returns true if it was present.
    fn remove_mutation(&self, entry_id: Uuid) -> StoreResult<bool>;

    /// Returns all pending log entries in append order.
    fn list_mutations(&self) -> StoreResult<Vec<QueueEntry>>;

    /// Inserts or overwrites a TTL cache entry.
    fn put_cache(&self, entry: &CacheEntry) -> StoreResult<()>;

    /// Returns the cache entry under `key`, expired or not.
    ///
    /// Expiry is the caller's concern: the store does not interpret
    /// `expires_at_ms`.
    fn get_cache(&self, key: &str) -> StoreResult<Option<CacheEntry>>;

    /// Removes a cache entry. Returns true if it was present.
    fn remove_cache(&self, key: &str) -> StoreResult<bool>;
}
