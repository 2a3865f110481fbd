//! A derived, identity-deduplicated observable array.

use crate::publisher::{NotifyMode, Publisher, Subscription};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A membership change in a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent<T> {
    /// An item entered the collection.
    Added(T),
    /// An existing item was replaced in place.
    Changed(T),
    /// The item with this key left the collection.
    Removed(String),
}

type KeyFn<T> = Box<dyn Fn(&T) -> String + Send + Sync>;
type CompareFn<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// An observable array with identity-based deduplication.
///
/// Membership is keyed by a caller-supplied extractor; inserting an item
/// whose key is already present replaces it in place instead of duplicating
/// it. The stored data changes synchronously; only notifications follow the
/// configured [`NotifyMode`].
pub struct Collection<T> {
    items: RwLock<Vec<T>>,
    key_of: KeyFn<T>,
    compare: Option<CompareFn<T>>,
    publisher: Publisher<CollectionEvent<T>>,
}

impl<T: Clone + Send + 'static> Collection<T> {
    /// Creates a collection keyed by the given extractor.
    pub fn new<K>(key_of: K) -> Self
    where
        K: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self::with_mode(key_of, NotifyMode::Immediate)
    }

    /// Creates a collection with the given notification mode.
    pub fn with_mode<K>(key_of: K, mode: NotifyMode) -> Self
    where
        K: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self {
            items: RwLock::new(Vec::new()),
            key_of: Box::new(key_of),
            compare: None,
            publisher: Publisher::with_mode(mode),
        }
    }

    /// Sets a sort order maintained on every insertion.
    pub fn with_comparator<C>(mut self, compare: C) -> Self
    where
        C: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.compare = Some(Box::new(compare));
        self
    }

    /// Inserts or replaces an item, keyed by identity.
    ///
    /// Returns true if the item was newly added, false if it replaced an
    /// existing member.
    pub fn upsert(&self, item: T) -> bool {
        let key = (self.key_of)(&item);
        let added = {
            let mut items = self.items.write();
            match items.iter().position(|it| (self.key_of)(it) == key) {
                Some(index) => {
                    items[index] = item.clone();
                    false
                }
                None => {
                    items.push(item.clone());
                    true
                }
            }
        };
        if let Some(compare) = &self.compare {
            self.items.write().sort_by(|a, b| compare(a, b));
        }
        if added {
            self.publisher.emit(CollectionEvent::Added(item));
        } else {
            self.publisher.emit(CollectionEvent::Changed(item));
        }
        added
    }

    /// Removes the item with the given key, if present.
    pub fn remove(&self, key: &str) -> Option<T> {
        let removed = {
            let mut items = self.items.write();
            items
                .iter()
                .position(|it| (self.key_of)(it) == key)
                .map(|index| items.remove(index))
        };
        if removed.is_some() {
            self.publisher.emit(CollectionEvent::Removed(key.to_string()));
        }
        removed
    }

    /// Returns the item with the given key, if present.
    pub fn get(&self, key: &str) -> Option<T> {
        self.items
            .read()
            .iter()
            .find(|it| (self.key_of)(it) == key)
            .cloned()
    }

    /// Returns true if an item with the given key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.items.read().iter().any(|it| (self.key_of)(it) == key)
    }

    /// Returns a snapshot of all items in order.
    pub fn items(&self) -> Vec<T> {
        self.items.read().clone()
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns true if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Subscribes to membership changes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<CollectionEvent<T>>
    where
        F: Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    {
        self.publisher.subscribe(callback)
    }

    /// Returns a channel receiving every membership notification.
    pub fn watch(&self) -> Receiver<CollectionEvent<T>> {
        self.publisher.watch()
    }

    /// Waits for the next membership notification, up to `timeout`.
    pub fn wait_next(&self, timeout: Duration) -> Option<CollectionEvent<T>> {
        self.publisher.wait_next(timeout)
    }
}
