//! Engine configuration.

use std::time::Duration;
use syncmirror_reactive::NotifyMode;

/// Wire protocol version negotiated at handshake.
pub const PROTOCOL_VERSION: u16 = 1;

/// Configuration for one entity type.
///
/// Defaults match interactive-client use: immediate cell notification,
/// debounced collection notification, and a background queue that flushes
/// every 30 seconds while retaining entries for 24 hours.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Protocol version announced during handshake.
    pub protocol_version: u16,
    /// Notification mode for individual entity cells.
    pub cell_notify: NotifyMode,
    /// Notification mode for live collections and paged views.
    pub collection_notify: NotifyMode,
    /// Saving a staging session whose entity was deleted re-creates the
    /// entity instead of failing.
    pub recreate_on_delete: bool,
    /// Offline queue behavior.
    pub queue: QueueConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            cell_notify: NotifyMode::Immediate,
            collection_notify: NotifyMode::Debounced(NotifyMode::DEFAULT_WINDOW),
            recreate_on_delete: false,
            queue: QueueConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the notification mode for entity cells.
    pub fn with_cell_notify(mut self, mode: NotifyMode) -> Self {
        self.cell_notify = mode;
        self
    }

    /// Sets the notification mode for collections.
    pub fn with_collection_notify(mut self, mode: NotifyMode) -> Self {
        self.collection_notify = mode;
        self
    }

    /// Enables or disables re-create on save of a deleted entity.
    pub fn with_recreate_on_delete(mut self, recreate: bool) -> Self {
        self.recreate_on_delete = recreate;
        self
    }

    /// Replaces the queue configuration.
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Overrides the announced protocol version.
    pub fn with_protocol_version(mut self, version: u16) -> Self {
        self.protocol_version = version;
        self
    }
}

/// Configuration for the durable offline write queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How often the background flusher wakes.
    pub flush_interval: Duration,
    /// Entries younger than this are skipped by a flush, leaving the
    /// direct send's acknowledgement time to land first.
    pub min_entry_age: Duration,
    /// Entries older than this are presumed permanently failed and pruned.
    pub retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(30),
            min_entry_age: Duration::from_secs(5),
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl QueueConfig {
    /// Creates the default queue configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how often the background flusher wakes.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the minimum age before an entry is eligible for a flush.
    pub fn with_min_entry_age(mut self, age: Duration) -> Self {
        self.min_entry_age = age;
        self
    }

    /// Sets the retention window after which entries are pruned.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_interactive() {
        let config = EngineConfig::default();
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
        assert_eq!(config.cell_notify, NotifyMode::Immediate);
        assert!(matches!(
            config.collection_notify,
            NotifyMode::Debounced(_)
        ));
        assert!(!config.recreate_on_delete);
        assert_eq!(config.queue.retention, Duration::from_secs(86_400));
    }

    #[test]
    fn builders_chain() {
        let config = EngineConfig::new()
            .with_recreate_on_delete(true)
            .with_cell_notify(NotifyMode::Debounced(Duration::from_millis(10)))
            .with_queue(QueueConfig::new().with_min_entry_age(Duration::ZERO));
        assert!(config.recreate_on_delete);
        assert_eq!(config.queue.min_entry_age, Duration::ZERO);
    }
}
