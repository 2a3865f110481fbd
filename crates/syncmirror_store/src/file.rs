//! File-backed store for persistence across reloads.

use crate::entry::{CacheEntry, QueueEntry};
use crate::error::{StoreError, StoreResult};
use crate::store::{DurableStore, STORE_NAMESPACE};
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MUTATIONS_FILE: &str = "mutations.cbor";
const CACHE_FILE: &str = "ttl_cache.cbor";
const LOCK_FILE: &str = ".lock";

/// A file-backed [`DurableStore`].
///
/// Tables live as CBOR files inside a namespaced directory
/// (`<root>/syncmirror_v1/`). Every change rewrites the affected table via
/// a temp file and rename, so a crash leaves either the old or the new
/// table, never a torn one. An exclusive advisory lock on the directory
/// prevents two processes from sharing the same store.
pub struct FileStore {
    dir: PathBuf,
    /// Held for the lifetime of the store; the lock releases on drop.
    _lock: File,
    mutations: RwLock<Vec<QueueEntry>>,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl FileStore {
    /// Opens or creates a store under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another process holds the store,
    /// and [`StoreError::Corrupt`] if an existing table cannot be decoded.
    pub fn open(root: &Path) -> StoreResult<Self> {
        let dir = root.join(STORE_NAMESPACE);
        fs::create_dir_all(&dir)?;

        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        lock.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(dir.display().to_string()))?;

        let mutations: Vec<QueueEntry> = Self::load_table(&dir.join(MUTATIONS_FILE))?;
        let cache_entries: Vec<CacheEntry> = Self::load_table(&dir.join(CACHE_FILE))?;
        let cache: HashMap<String, CacheEntry> = cache_entries
            .into_iter()
            .map(|entry| (entry.key.clone(), entry))
            .collect();

        tracing::debug!(
            dir = %dir.display(),
            mutations = mutations.len(),
            cached = cache.len(),
            "store opened"
        );
        Ok(Self {
            dir,
            _lock: lock,
            mutations: RwLock::new(mutations),
            cache: RwLock::new(cache),
        })
    }

    /// Returns the namespaced directory this store writes under.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load_table<T: serde::de::DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        syncmirror_protocol::from_cbor(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))
    }

    fn write_table<T: serde::Serialize>(&self, file_name: &str, table: &[T]) -> StoreResult<()> {
        let bytes = syncmirror_protocol::to_cbor(&table)?;
        let path = self.dir.join(file_name);
        let tmp = self.dir.join(format!("{file_name}.tmp"));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn persist_mutations(&self) -> StoreResult<()> {
        let mutations = self.mutations.read().clone();
        self.write_table(MUTATIONS_FILE, &mutations)
    }

    fn persist_cache(&self) -> StoreResult<()> {
        let entries: Vec<CacheEntry> = self.cache.read().values().cloned().collect();
        self.write_table(CACHE_FILE, &entries)
    }
}

impl DurableStore for FileStore {
    fn append_mutation(&self, entry: &QueueEntry) -> StoreResult<()> {
        self.mutations.write().push(entry.clone());
        self.persist_mutations()
    }

    fn remove_mutation(&self, entry_id: Uuid) -> StoreResult<bool> {
        let removed = {
            let mut mutations = self.mutations.write();
            let before = mutations.len();
            mutations.retain(|entry| entry.entry_id != entry_id);
            mutations.len() < before
        };
        if removed {
            self.persist_mutations()?;
        }
        Ok(removed)
    }

    fn list_mutations(&self) -> StoreResult<Vec<QueueEntry>> {
        Ok(self.mutations.read().clone())
    }

    fn put_cache(&self, entry: &CacheEntry) -> StoreResult<()> {
        self.cache.write().insert(entry.key.clone(), entry.clone());
        self.persist_cache()
    }

    fn get_cache(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        Ok(self.cache.read().get(key).cloned())
    }

    fn remove_cache(&self, key: &str) -> StoreResult<bool> {
        let removed = self.cache.write().remove(key).is_some();
        if removed {
            self.persist_cache()?;
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("dir", &self.dir)
            .field("mutations", &self.mutations.read().len())
            .field("cache", &self.cache.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncmirror_protocol::{FieldValue, MutationKind, Record};

    fn entry(entity: &str) -> QueueEntry {
        let mut payload = Record::with_id("e-1");
        payload.set("title", FieldValue::from("t"));
        QueueEntry::new(entity, MutationKind::Update, payload)
    }

    #[test]
    fn mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let pending = entry("task");

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.append_mutation(&pending).unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        let listed = store.list_mutations().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], pending);
    }

    #[test]
    fn cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cached = CacheEntry {
            key: "perms".into(),
            value: vec![9, 9],
            expires_at_ms: 123,
        };

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put_cache(&cached).unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get_cache("perms").unwrap(), Some(cached));
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let _store = FileStore::open(dir.path()).unwrap();

        let second = FileStore::open(dir.path());
        assert!(matches!(second, Err(StoreError::Locked(_))));
    }

    #[test]
    fn remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let pending = entry("task");

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.append_mutation(&pending).unwrap();
            assert!(store.remove_mutation(pending.entry_id).unwrap());
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.list_mutations().unwrap().is_empty());
    }

    #[test]
    fn namespace_directory_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.dir().ends_with(STORE_NAMESPACE));
        assert_eq!(store.namespace(), STORE_NAMESPACE);
    }
}
