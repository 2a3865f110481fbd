//! Durable offline write queue.
//!
//! Every mutation is journaled before it is sent; the direct send
//! acknowledging deletes the entry. Entries that outlive their direct
//! send (the client was offline, or the process died mid-flight) are
//! replayed in order by a periodic batch flush.
//!
//! Delivery is at-most-once per entry: a flushed batch removes every
//! entry it carried once the round trip completes, whatever the per-entry
//! verdicts were. An entry the server rejected is not worth resending;
//! an entry older than the retention window is presumed permanently
//! failed and pruned without sending.

use crate::config::QueueConfig;
use crate::transport::CallTransport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use syncmirror_protocol::{MutationKind, Record};
use syncmirror_store::{now_ms, DurableStore, QueueEntry};
use tracing::{debug, warn};
use uuid::Uuid;

/// Journal of pending mutations with a background flusher.
///
/// The queue degrades gracefully without a store: every operation becomes
/// a no-op and mutations ride only their direct send.
pub struct OfflineWriteQueue {
    entity: String,
    store: Option<Arc<dyn DurableStore>>,
    transport: Arc<dyn CallTransport>,
    config: QueueConfig,
    running: Arc<AtomicBool>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl OfflineWriteQueue {
    /// Creates a queue for one entity type.
    pub fn new(
        entity: impl Into<String>,
        store: Option<Arc<dyn DurableStore>>,
        transport: Arc<dyn CallTransport>,
        config: QueueConfig,
    ) -> Self {
        Self {
            entity: entity.into(),
            store,
            transport,
            config,
            running: Arc::new(AtomicBool::new(false)),
            flusher: Mutex::new(None),
        }
    }

    /// Journals a mutation before its direct send.
    ///
    /// Returns the entry id to acknowledge with, or `None` when no store
    /// is configured or the store is unavailable.
    pub fn enqueue(&self, kind: MutationKind, payload: Record) -> Option<Uuid> {
        let store = self.store.as_ref()?;
        let entry = QueueEntry::new(&self.entity, kind, payload);
        match store.append_mutation(&entry) {
            Ok(()) => Some(entry.entry_id),
            Err(error) => {
                warn!(entity = %self.entity, %error, "journal append failed, mutation rides unjournaled");
                None
            }
        }
    }

    /// Deletes a journaled entry after its direct send succeeded.
    pub fn acknowledge(&self, entry_id: Uuid) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(error) = store.remove_mutation(entry_id) {
            warn!(entity = %self.entity, %entry_id, %error, "journal acknowledge failed");
        }
    }

    /// Returns the journaled entries for this entity type, oldest first.
    pub fn pending(&self) -> Vec<QueueEntry> {
        let Some(store) = self.store.as_ref() else {
            return Vec::new();
        };
        match store.list_mutations() {
            Ok(entries) => entries
                .into_iter()
                .filter(|entry| entry.entity == self.entity)
                .collect(),
            Err(error) => {
                warn!(entity = %self.entity, %error, "journal list failed");
                Vec::new()
            }
        }
    }

    /// Removes entries older than the retention window without sending.
    pub fn prune_stale(&self) -> usize {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        let now = now_ms();
        let retention_ms = self.config.retention.as_millis() as i64;
        let mut pruned = 0;
        for entry in self.pending() {
            if entry.age_ms(now) > retention_ms {
                if store.remove_mutation(entry.entry_id).unwrap_or(false) {
                    pruned += 1;
                }
            }
        }
        if pruned > 0 {
            warn!(entity = %self.entity, pruned, "stale journal entries dropped");
        }
        pruned
    }

    /// Replays journaled entries that are due as one ordered batch.
    ///
    /// Entries younger than the minimum age are skipped; their direct
    /// send may still be in flight. Returns the number of entries
    /// removed. A transport failure leaves every entry journaled for the
    /// next flush.
    pub fn flush_due(&self) -> usize {
        self.prune_stale();
        let Some(store) = self.store.as_ref() else {
            return 0;
        };

        let now = now_ms();
        let min_age_ms = self.config.min_entry_age.as_millis() as i64;
        let due: Vec<QueueEntry> = self
            .pending()
            .into_iter()
            .filter(|entry| entry.age_ms(now) >= min_age_ms)
            .collect();
        if due.is_empty() {
            return 0;
        }

        let verdicts = match self.transport.batch(&due) {
            Ok(verdicts) => verdicts,
            Err(error) => {
                debug!(entity = %self.entity, %error, "batch flush failed, entries retained");
                return 0;
            }
        };
        for verdict in &verdicts {
            if !verdict.success {
                warn!(
                    entity = %self.entity,
                    entry_id = %verdict.entry_id,
                    message = verdict.message.as_deref().unwrap_or(""),
                    "queued mutation rejected"
                );
            }
        }

        // The round trip completed; at-most-once means nothing is resent.
        let mut removed = 0;
        for entry in &due {
            match store.remove_mutation(entry.entry_id) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(error) => {
                    warn!(entity = %self.entity, entry_id = %entry.entry_id, %error, "journal cleanup failed")
                }
            }
        }
        debug!(entity = %self.entity, removed, "batch flush completed");
        removed
    }

    /// Starts the periodic background flusher.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let queue = Arc::clone(self);
        let interval = self.config.flush_interval;
        let handle = std::thread::spawn(move || {
            while queue.running.load(Ordering::SeqCst) {
                // Sleep in short slices so stop() is prompt.
                let mut slept = Duration::ZERO;
                while slept < interval && queue.running.load(Ordering::SeqCst) {
                    let slice = Duration::from_millis(50).min(interval - slept);
                    std::thread::sleep(slice);
                    slept += slice;
                }
                if !queue.running.load(Ordering::SeqCst) {
                    break;
                }
                queue.flush_due();
            }
        });
        *self.flusher.lock() = Some(handle);
    }

    /// Stops the background flusher and waits for it to exit.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OfflineWriteQueue {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
