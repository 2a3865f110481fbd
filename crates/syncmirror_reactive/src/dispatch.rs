//! Centralized predicate dispatch for derived views.
//!
//! Every live view registers a `satisfies` predicate once; one registry
//! evaluates each inbound cache change against every predicate exactly
//! once and hands each registration an add/remove/inform action. This
//! replaces per-view event subscriptions, which would otherwise multiply
//! registrations by event kinds.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A change in the backing cache, as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheChange<T> {
    /// A value entered the cache under this key.
    Entered {
        /// Cache key.
        key: String,
        /// The new value.
        value: T,
    },
    /// The value under this key changed.
    Changed {
        /// Cache key.
        key: String,
        /// The updated value.
        value: T,
    },
    /// The value under this key left the cache.
    Left {
        /// Cache key.
        key: String,
    },
}

/// The action a registration receives for one cache change.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchAction<T> {
    /// The value belongs in the view and was not there before.
    Add(T),
    /// The value belongs in the view and may already be there; the view
    /// should upsert and re-render.
    Inform(T),
    /// The value (by key) no longer belongs in the view.
    Remove(String),
}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type Sink<T> = Box<dyn Fn(DispatchAction<T>) + Send + Sync>;

struct Entry<T> {
    id: u64,
    satisfies: Predicate<T>,
    sink: Sink<T>,
}

struct Inner<T> {
    entries: RwLock<Vec<Arc<Entry<T>>>>,
    next_id: AtomicU64,
}

/// Registry of view predicates receiving centralized dispatch.
pub struct DispatchRegistry<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DispatchRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> DispatchRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a view predicate and its action sink.
    ///
    /// The registration lives until the returned handle is disposed or
    /// dropped.
    pub fn register<P, S>(&self, satisfies: P, sink: S) -> Registration<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
        S: Fn(DispatchAction<T>) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.entries.write().push(Arc::new(Entry {
            id,
            satisfies: Box::new(satisfies),
            sink: Box::new(sink),
        }));
        Registration {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Dispatches one cache change to every registration.
    ///
    /// Each predicate is evaluated exactly once per change:
    /// - entered + satisfied → `Add`
    /// - changed + satisfied → `Inform` (the view upserts)
    /// - changed + not satisfied → `Remove` (the value moved out of view)
    /// - left → `Remove`
    pub fn dispatch(&self, change: &CacheChange<T>) {
        // Snapshot first: a sink may re-enter the registry, for instance
        // by refetching a view that admits records back into the cache.
        let entries: Vec<Arc<Entry<T>>> = self.inner.entries.read().clone();
        for entry in entries.iter() {
            match change {
                CacheChange::Entered { value, .. } => {
                    if (entry.satisfies)(value) {
                        (entry.sink)(DispatchAction::Add(value.clone()));
                    }
                }
                CacheChange::Changed { key, value } => {
                    if (entry.satisfies)(value) {
                        (entry.sink)(DispatchAction::Inform(value.clone()));
                    } else {
                        (entry.sink)(DispatchAction::Remove(key.clone()));
                    }
                }
                CacheChange::Left { key } => {
                    (entry.sink)(DispatchAction::Remove(key.clone()));
                }
            }
        }
    }

    /// Returns the number of live registrations.
    pub fn registration_count(&self) -> usize {
        self.inner.entries.read().len()
    }
}

impl<T: Clone> Default for DispatchRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one registration. Disposing (or dropping) deregisters.
pub struct Registration<T> {
    inner: Weak<Inner<T>>,
    id: u64,
}

impl<T> Registration<T> {
    /// Removes the registration now.
    pub fn dispose(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.entries.write().retain(|entry| entry.id != self.id);
        }
    }
}

impl<T> Drop for Registration<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}
