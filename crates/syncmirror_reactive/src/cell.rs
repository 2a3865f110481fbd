//! A single observable value.

use crate::publisher::{NotifyMode, Publisher, Subscription};
use parking_lot::RwLock;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// Wraps exactly one value and notifies subscribers when it changes.
///
/// The stored value is updated synchronously; only the notification may be
/// debounced.
pub struct Cell<T> {
    value: RwLock<T>,
    publisher: Publisher<T>,
}

impl<T: Clone + Send + 'static> Cell<T> {
    /// Creates a cell with immediate notification.
    pub fn new(initial: T) -> Self {
        Self::with_mode(initial, NotifyMode::Immediate)
    }

    /// Creates a cell with the given notification mode.
    pub fn with_mode(initial: T, mode: NotifyMode) -> Self {
        Self {
            value: RwLock::new(initial),
            publisher: Publisher::with_mode(mode),
        }
    }

    /// Returns a snapshot of the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Replaces the value and notifies subscribers.
    pub fn replace(&self, value: T) {
        *self.value.write() = value.clone();
        self.publisher.emit(value);
    }

    /// Mutates the value in place, notifies subscribers, and returns the
    /// new snapshot.
    pub fn modify<F>(&self, f: F) -> T
    where
        F: FnOnce(&mut T),
    {
        let snapshot = {
            let mut guard = self.value.write();
            f(&mut guard);
            guard.clone()
        };
        self.publisher.emit(snapshot.clone());
        snapshot
    }

    /// Subscribes to value changes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.publisher.subscribe(callback)
    }

    /// Returns a channel receiving every notification.
    pub fn watch(&self) -> Receiver<T> {
        self.publisher.watch()
    }

    /// Waits for the next notification, up to `timeout`.
    pub fn wait_next(&self, timeout: Duration) -> Option<T> {
        self.publisher.wait_next(timeout)
    }

    /// Returns the number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }
}
