//! In-memory store for tests and ephemeral sessions.

use crate::entry::{CacheEntry, QueueEntry};
use crate::error::{StoreError, StoreResult};
use crate::store::DurableStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// An in-memory [`DurableStore`].
///
/// Not durable across process restarts; suitable for unit tests and
/// sessions that explicitly opt out of persistence. The availability
/// toggle lets tests exercise graceful degradation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    mutations: RwLock<Vec<QueueEntry>>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the store available or unavailable.
    ///
    /// While unavailable, every operation returns
    /// [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    /// Returns the number of pending mutations.
    pub fn mutation_count(&self) -> usize {
        self.mutations.read().len()
    }

    /// Returns the number of cache entries, expired or not.
    pub fn cache_count(&self) -> usize {
        self.cache.read().len()
    }
}

impl DurableStore for MemoryStore {
    fn append_mutation(&self, entry: &QueueEntry) -> StoreResult<()> {
        self.check_available()?;
        self.mutations.write().push(entry.clone());
        Ok(())
    }

    fn remove_mutation(&self, entry_id: Uuid) -> StoreResult<bool> {
        self.check_available()?;
        let mut mutations = self.mutations.write();
        let before = mutations.len();
        mutations.retain(|entry| entry.entry_id != entry_id);
        Ok(mutations.len() < before)
    }

    fn list_mutations(&self) -> StoreResult<Vec<QueueEntry>> {
        self.check_available()?;
        Ok(self.mutations.read().clone())
    }

    fn put_cache(&self, entry: &CacheEntry) -> StoreResult<()> {
        self.check_available()?;
        self.cache.write().insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn get_cache(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        self.check_available()?;
        Ok(self.cache.read().get(key).cloned())
    }

    fn remove_cache(&self, key: &str) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self.cache.write().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncmirror_protocol::{MutationKind, Record};

    fn entry(entity: &str) -> QueueEntry {
        QueueEntry::new(entity, MutationKind::Update, Record::with_id("e-1"))
    }

    #[test]
    fn append_and_list_preserve_order() {
        let store = MemoryStore::new();
        let a = entry("task");
        let b = entry("note");

        store.append_mutation(&a).unwrap();
        store.append_mutation(&b).unwrap();

        let listed = store.list_mutations().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].entry_id, a.entry_id);
        assert_eq!(listed[1].entry_id, b.entry_id);
    }

    #[test]
    fn remove_mutation_by_id() {
        let store = MemoryStore::new();
        let a = entry("task");
        store.append_mutation(&a).unwrap();

        assert!(store.remove_mutation(a.entry_id).unwrap());
        assert!(!store.remove_mutation(a.entry_id).unwrap());
        assert_eq!(store.mutation_count(), 0);
    }

    #[test]
    fn cache_upsert_and_remove() {
        let store = MemoryStore::new();
        let first = CacheEntry {
            key: "perms".into(),
            value: vec![1],
            expires_at_ms: 10,
        };
        let second = CacheEntry {
            key: "perms".into(),
            value: vec![2],
            expires_at_ms: 20,
        };

        store.put_cache(&first).unwrap();
        store.put_cache(&second).unwrap();
        assert_eq!(store.cache_count(), 1);
        assert_eq!(store.get_cache("perms").unwrap().unwrap().value, vec![2]);

        assert!(store.remove_cache("perms").unwrap());
        assert!(store.get_cache("perms").unwrap().is_none());
    }

    #[test]
    fn unavailable_store_rejects_everything() {
        let store = MemoryStore::new();
        store.set_available(false);

        assert!(matches!(
            store.append_mutation(&entry("task")),
            Err(StoreError::Unavailable)
        ));
        assert!(matches!(
            store.get_cache("perms"),
            Err(StoreError::Unavailable)
        ));

        store.set_available(true);
        assert!(store.list_mutations().is_ok());
    }
}
