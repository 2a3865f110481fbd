//! Subscriber registry with optional debounced delivery.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// How notifications are delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// Deliver every emission synchronously.
    Immediate,
    /// Coalesce bursts: only the last value emitted within the window is
    /// delivered, after the window elapses.
    Debounced(Duration),
}

impl NotifyMode {
    /// The default debounce window.
    pub const DEFAULT_WINDOW: Duration = Duration::from_millis(50);

    /// Debounced delivery with the default window.
    pub fn debounced() -> Self {
        NotifyMode::Debounced(Self::DEFAULT_WINDOW)
    }
}

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Shared<T> {
    subscribers: RwLock<Vec<(u64, Callback<T>)>>,
    watchers: RwLock<Vec<Sender<T>>>,
    next_id: AtomicU64,
    mode: NotifyMode,
    /// Latest undelivered value while a debounce window is open.
    pending: Mutex<Option<T>>,
    /// Bumped on every emit; a timer delivers only if it still holds the
    /// generation it captured.
    generation: AtomicU64,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn deliver(&self, value: T) {
        let subscribers = self.subscribers.read();
        for (_, callback) in subscribers.iter() {
            callback(&value);
        }
        drop(subscribers);

        // Drop watchers whose receiver is gone.
        let mut watchers = self.watchers.write();
        watchers.retain(|tx| tx.send(value.clone()).is_ok());
    }
}

/// Distributes values to subscribers.
///
/// Subscribing returns a [`Subscription`] handle; disposing it (or dropping
/// it) unsubscribes. Cloning the publisher clones the handle, not the
/// subscriber set.
///
/// Debounced mode delays only the notification, never the data the caller
/// stores elsewhere; emissions within one window collapse into a single
/// delivery of the last value.
pub struct Publisher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Publisher<T> {
    /// Creates a publisher with immediate delivery.
    pub fn new() -> Self {
        Self::with_mode(NotifyMode::Immediate)
    }

    /// Creates a publisher with the given delivery mode.
    pub fn with_mode(mode: NotifyMode) -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: RwLock::new(Vec::new()),
                watchers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                mode,
                pending: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribes a callback. The subscription ends when the returned
    /// handle is disposed or dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .subscribers
            .write()
            .push((id, Box::new(callback)));
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    /// Returns a channel receiving every delivered value.
    ///
    /// Intended for tests and bounded waits; the sender is removed once the
    /// receiver is dropped.
    pub fn watch(&self) -> Receiver<T> {
        let (tx, rx) = mpsc::channel();
        self.shared.watchers.write().push(tx);
        rx
    }

    /// Waits for the next delivered value, up to `timeout`.
    ///
    /// Bounds only this caller's wait; nothing is cancelled on timeout.
    pub fn wait_next(&self, timeout: Duration) -> Option<T> {
        let rx = self.watch();
        rx.recv_timeout(timeout).ok()
    }

    /// Emits a value to all subscribers, honoring the delivery mode.
    pub fn emit(&self, value: T) {
        match self.shared.mode {
            NotifyMode::Immediate => self.shared.deliver(value),
            NotifyMode::Debounced(window) => {
                let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
                *self.shared.pending.lock() = Some(value);

                let shared = Arc::clone(&self.shared);
                std::thread::spawn(move || {
                    std::thread::sleep(window);
                    // A later emit supersedes this timer.
                    if shared.generation.load(Ordering::SeqCst) != generation {
                        return;
                    }
                    let pending = shared.pending.lock().take();
                    if let Some(value) = pending {
                        shared.deliver(value);
                    }
                });
            }
        }
    }

    /// Returns the number of live callback subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }
}

impl<T: Clone + Send + 'static> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one subscription. Disposing (or dropping) unsubscribes.
pub struct Subscription<T> {
    shared: Weak<Shared<T>>,
    id: u64,
}

impl<T> Subscription<T> {
    /// Removes the subscription now.
    pub fn dispose(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.subscribers.write().retain(|(id, _)| *id != self.id);
        }
    }

    /// Returns true if the publisher is still alive and this subscription
    /// is still registered.
    pub fn is_active(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.subscribers.read().iter().any(|(id, _)| *id == self.id),
            None => false,
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}
