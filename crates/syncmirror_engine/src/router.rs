//! Routes realtime events into the entity cache.
//!
//! The router is the only writer of cached entity state. It assumes the
//! transport delivers events in server order per entity identity and
//! applies each one against what the cache currently holds, acknowledging
//! the sequence number once the event has been applied (or deliberately
//! ignored).

use crate::cache::EntityCache;
use crate::error::EngineResult;
use crate::transport::RealtimeTransport;
use std::sync::Arc;
use syncmirror_protocol::{EventKind, RealtimeMessage};
use tracing::{debug, warn};

/// What the router did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new cell was inserted.
    Inserted,
    /// An existing cell was merged with the event's fields.
    Updated,
    /// The archive flag was set.
    Archived,
    /// The archive flag was cleared.
    Restored,
    /// The cell was removed and the identity tombstoned.
    Deleted,
    /// The event had no effect (idempotent replay or tombstoned identity).
    Ignored,
}

/// Applies realtime events for one entity type.
pub struct EventRouter {
    entity: String,
    cache: Arc<EntityCache>,
    realtime: Arc<dyn RealtimeTransport>,
}

impl EventRouter {
    /// Creates a router feeding the given cache.
    pub fn new(
        entity: impl Into<String>,
        cache: Arc<EntityCache>,
        realtime: Arc<dyn RealtimeTransport>,
    ) -> Self {
        Self {
            entity: entity.into(),
            cache,
            realtime,
        }
    }

    /// Applies one event and acknowledges its sequence number.
    ///
    /// Replayed events are no-ops: the transition table below is
    /// idempotent for every (event, state) pair.
    ///
    /// - `create` on an absent identity inserts; on a present one, no-op.
    /// - `update` merges fields into the present cell; on an absent,
    ///   untombstoned identity it self-heals by inserting (a missed
    ///   create).
    /// - `archive`/`restore` flip the archive flag of a present cell.
    /// - `delete` removes the cell and tombstones the identity; every
    ///   later event except a fresh `create` is then a no-op.
    pub fn apply(&self, message: &RealtimeMessage) -> EngineResult<Applied> {
        let applied = self.transition(message);
        self.realtime.ack(&self.entity, message.seq)?;
        debug!(
            entity = %self.entity,
            seq = message.seq,
            event = message.event.name(),
            outcome = ?applied,
            "event applied"
        );
        Ok(applied)
    }

    fn transition(&self, message: &RealtimeMessage) -> Applied {
        let Some(id) = message.data.id().map(str::to_owned) else {
            warn!(
                entity = %self.entity,
                seq = message.seq,
                event = message.event.name(),
                "event without identity dropped"
            );
            return Applied::Ignored;
        };

        match message.event {
            EventKind::Create => {
                // A fresh create ends the tombstone's reign over this id.
                self.cache.clear_tombstone(&id);
                if self.cache.get(&id).is_some() {
                    return Applied::Ignored;
                }
                match self.cache.obtain(message.data.clone()) {
                    Ok(_) => Applied::Inserted,
                    Err(error) => {
                        warn!(entity = %self.entity, %id, %error, "create event rejected");
                        Applied::Ignored
                    }
                }
            }
            EventKind::Update => {
                if self.cache.is_deleted(&id) {
                    return Applied::Ignored;
                }
                if self.cache.merge_into(&id, &message.data).is_some() {
                    return Applied::Updated;
                }
                // Missed create: admit the update's fields as the record.
                warn!(entity = %self.entity, %id, "update for unknown entity, healing as create");
                match self.cache.obtain(message.data.clone()) {
                    Ok(_) => Applied::Inserted,
                    Err(error) => {
                        warn!(entity = %self.entity, %id, %error, "healing create rejected");
                        Applied::Ignored
                    }
                }
            }
            EventKind::Archive => self.flip(&id, true),
            EventKind::Restore => self.flip(&id, false),
            EventKind::Delete => {
                if self.cache.is_deleted(&id) {
                    return Applied::Ignored;
                }
                if self.cache.remove(&id) {
                    Applied::Deleted
                } else {
                    // Unknown identity; tombstone it anyway so stragglers
                    // ordered before the delete cannot resurrect it.
                    Applied::Ignored
                }
            }
        }
    }

    fn flip(&self, id: &str, archived: bool) -> Applied {
        if self.cache.is_deleted(id) {
            return Applied::Ignored;
        }
        let already = match self.cache.get(id) {
            Some(cell) => cell.is_archived() == archived,
            None => return Applied::Ignored,
        };
        if already {
            return Applied::Ignored;
        }
        self.cache.flip_archived(id, archived);
        if archived {
            Applied::Archived
        } else {
            Applied::Restored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockRealtimeTransport;
    use syncmirror_protocol::{FieldSchema, FieldValue, Record};
    use syncmirror_reactive::NotifyMode;

    struct Fixture {
        cache: Arc<EntityCache>,
        realtime: Arc<MockRealtimeTransport>,
        router: EventRouter,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(EntityCache::new(
            "task",
            FieldSchema::new(),
            NotifyMode::Immediate,
        ));
        let realtime = Arc::new(MockRealtimeTransport::new());
        let router = EventRouter::new(
            "task",
            Arc::clone(&cache),
            Arc::clone(&realtime) as Arc<dyn RealtimeTransport>,
        );
        Fixture {
            cache,
            realtime,
            router,
        }
    }

    fn message(seq: u64, event: EventKind, id: &str) -> RealtimeMessage {
        RealtimeMessage::new(seq, event, Record::with_id(id))
    }

    fn message_with(seq: u64, event: EventKind, id: &str, field: &str, value: &str) -> RealtimeMessage {
        let mut data = Record::with_id(id);
        data.set(field, FieldValue::from(value));
        RealtimeMessage::new(seq, event, data)
    }

    #[test]
    fn create_inserts_then_replays_ignore() {
        let f = fixture();
        assert_eq!(
            f.router.apply(&message(1, EventKind::Create, "e-1")).unwrap(),
            Applied::Inserted
        );
        assert_eq!(
            f.router.apply(&message(1, EventKind::Create, "e-1")).unwrap(),
            Applied::Ignored
        );
        assert_eq!(f.cache.len(), 1);
    }

    #[test]
    fn every_applied_event_is_acked() {
        let f = fixture();
        f.router.apply(&message(1, EventKind::Create, "e-1")).unwrap();
        f.router.apply(&message(2, EventKind::Archive, "e-1")).unwrap();
        // Ignored events are acknowledged too.
        f.router.apply(&message(3, EventKind::Archive, "e-1")).unwrap();
        assert_eq!(f.realtime.acked("task"), vec![1, 2, 3]);
    }

    #[test]
    fn update_merges_partial_fields() {
        let f = fixture();
        f.router
            .apply(&message_with(1, EventKind::Create, "e-1", "title", "a"))
            .unwrap();
        assert_eq!(
            f.router
                .apply(&message_with(2, EventKind::Update, "e-1", "body", "b"))
                .unwrap(),
            Applied::Updated
        );

        let record = f.cache.get("e-1").unwrap().get();
        assert_eq!(record.get("title").and_then(FieldValue::as_text), Some("a"));
        assert_eq!(record.get("body").and_then(FieldValue::as_text), Some("b"));
    }

    #[test]
    fn update_on_absent_heals_as_create() {
        let f = fixture();
        assert_eq!(
            f.router
                .apply(&message_with(1, EventKind::Update, "e-1", "title", "a"))
                .unwrap(),
            Applied::Inserted
        );
        assert!(f.cache.get("e-1").is_some());
    }

    #[test]
    fn archive_and_restore_flip_the_flag() {
        let f = fixture();
        f.router.apply(&message(1, EventKind::Create, "e-1")).unwrap();

        assert_eq!(
            f.router.apply(&message(2, EventKind::Archive, "e-1")).unwrap(),
            Applied::Archived
        );
        assert!(f.cache.get("e-1").unwrap().is_archived());

        assert_eq!(
            f.router.apply(&message(3, EventKind::Restore, "e-1")).unwrap(),
            Applied::Restored
        );
        assert!(!f.cache.get("e-1").unwrap().is_archived());

        // Restore on an already-live entity is a no-op.
        assert_eq!(
            f.router.apply(&message(4, EventKind::Restore, "e-1")).unwrap(),
            Applied::Ignored
        );
    }

    #[test]
    fn delete_is_terminal_until_a_fresh_create() {
        let f = fixture();
        f.router.apply(&message(1, EventKind::Create, "e-1")).unwrap();
        assert_eq!(
            f.router.apply(&message(2, EventKind::Delete, "e-1")).unwrap(),
            Applied::Deleted
        );
        assert!(f.cache.is_deleted("e-1"));

        // Updates and flips against the tombstone are dead.
        assert_eq!(
            f.router
                .apply(&message_with(3, EventKind::Update, "e-1", "title", "zombie"))
                .unwrap(),
            Applied::Ignored
        );
        assert_eq!(
            f.router.apply(&message(4, EventKind::Archive, "e-1")).unwrap(),
            Applied::Ignored
        );
        assert!(f.cache.get("e-1").is_none());

        // Only a fresh create brings the identity back.
        assert_eq!(
            f.router.apply(&message(5, EventKind::Create, "e-1")).unwrap(),
            Applied::Inserted
        );
        assert!(!f.cache.is_deleted("e-1"));
    }

    #[test]
    fn delete_of_unknown_identity_still_tombstones() {
        let f = fixture();
        assert_eq!(
            f.router.apply(&message(1, EventKind::Delete, "e-9")).unwrap(),
            Applied::Ignored
        );
        assert!(f.cache.is_deleted("e-9"));
    }

    #[test]
    fn event_without_identity_is_dropped_but_acked() {
        let f = fixture();
        let orphan = RealtimeMessage::new(9, EventKind::Update, Record::new());
        assert_eq!(f.router.apply(&orphan).unwrap(), Applied::Ignored);
        assert_eq!(f.realtime.acked("task"), vec![9]);
    }
}
