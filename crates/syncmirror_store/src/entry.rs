//! Entries held by the two durable tables.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use syncmirror_protocol::{MutationKind, Record};
use uuid::Uuid;

/// Returns the current time in epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// One pending mutation in the durable log.
///
/// Created before the network attempt; destroyed on server acknowledgement
/// or when the retention window elapses. The entry id identifies the log
/// entry, not the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Identity of this log entry.
    pub entry_id: Uuid,
    /// Entity type name the mutation targets.
    pub entity: String,
    /// The mutation kind.
    pub kind: MutationKind,
    /// Outgoing payload, server-owned columns already stripped.
    pub payload: Record,
    /// When the mutation was attempted, epoch milliseconds.
    pub timestamp_ms: i64,
}

impl QueueEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(entity: impl Into<String>, kind: MutationKind, payload: Record) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            entity: entity.into(),
            kind,
            payload,
            timestamp_ms: now_ms(),
        }
    }

    /// Returns the entry's age relative to `now` in milliseconds.
    ///
    /// Clock skew can make an entry appear newer than `now`; age is
    /// clamped at zero.
    pub fn age_ms(&self, now: i64) -> i64 {
        (now - self.timestamp_ms).max(0)
    }
}

/// One memoized read result with an expiry instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key.
    pub key: String,
    /// CBOR-encoded cached value.
    pub value: Vec<u8>,
    /// Expiry instant, epoch milliseconds.
    pub expires_at_ms: i64,
}

impl CacheEntry {
    /// Creates an entry expiring `ttl_ms` from now.
    pub fn new(key: impl Into<String>, value: Vec<u8>, ttl_ms: i64) -> Self {
        Self {
            key: key.into(),
            value,
            expires_at_ms: now_ms() + ttl_ms,
        }
    }

    /// Returns true if the entry has expired as of `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_entry_age() {
        let mut entry = QueueEntry::new("task", MutationKind::Update, Record::with_id("e-1"));
        entry.timestamp_ms = 1_000;

        assert_eq!(entry.age_ms(5_000), 4_000);
        // Clock skew clamps to zero
        assert_eq!(entry.age_ms(500), 0);
    }

    #[test]
    fn queue_entry_ids_are_distinct() {
        let a = QueueEntry::new("task", MutationKind::Create, Record::new());
        let b = QueueEntry::new("task", MutationKind::Create, Record::new());
        assert_ne!(a.entry_id, b.entry_id);
    }

    #[test]
    fn cache_entry_expiry() {
        let entry = CacheEntry {
            key: "perms".into(),
            value: vec![1],
            expires_at_ms: 10_000,
        };
        assert!(!entry.is_expired(9_999));
        assert!(entry.is_expired(10_000));
        assert!(entry.is_expired(20_000));
    }
}
