//! End-to-end behavior over scripted transports.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use syncmirror_engine::{
    CallTransport, EngineConfig, EngineError, EntityType, EventRouter, MockCallTransport,
    MockRealtimeTransport, QueueConfig, RealtimeTransport, SaveStrategy,
};
use syncmirror_protocol::{
    CallResult, EventKind, FieldKind, FieldSchema, FieldValue, Record, RealtimeMessage,
};
use syncmirror_reactive::NotifyMode;
use syncmirror_store::{DurableStore, FileStore, MemoryStore};

struct Harness {
    calls: Arc<MockCallTransport>,
    realtime: Arc<MockRealtimeTransport>,
    entity: Arc<EntityType>,
}

fn schema() -> FieldSchema {
    FieldSchema::new()
        .with_field("title", FieldKind::String)
        .with_field("count", FieldKind::Number)
}

fn harness(config: EngineConfig) -> Harness {
    let calls = Arc::new(MockCallTransport::new());
    let realtime = Arc::new(MockRealtimeTransport::new());
    let entity = EntityType::new(
        "task",
        schema(),
        config,
        Arc::clone(&calls) as Arc<dyn CallTransport>,
        Arc::clone(&realtime) as Arc<dyn RealtimeTransport>,
        Some(Arc::new(MemoryStore::new()) as Arc<dyn DurableStore>),
    );
    Harness {
        calls,
        realtime,
        entity,
    }
}

fn default_harness() -> Harness {
    harness(EngineConfig::new().with_queue(QueueConfig::new().with_min_entry_age(Duration::ZERO)))
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while !condition() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(condition(), "condition not reached in time");
}

fn titled(id: &str, title: &str) -> Record {
    let mut record = Record::with_id(id);
    record.set("title", FieldValue::from(title));
    record
}

#[test]
fn one_cell_per_identity_across_read_paths() {
    let h = default_harness();
    h.entity.connect().unwrap();

    let record = titled("e-1", "a");
    h.calls
        .push_read_response(CallResult::with_data(vec![record.clone()]));
    h.calls.push_read_response(CallResult::with_data(vec![record]));

    let from_all = h.entity.all().unwrap().remove(0);
    let from_by_id = h.entity.by_id("e-1").unwrap().unwrap();
    assert!(Arc::ptr_eq(&from_all, &from_by_id));
}

#[test]
fn delete_event_is_terminal_until_recreate() {
    let h = default_harness();
    h.entity.build().unwrap();

    h.realtime.emit(
        "task",
        RealtimeMessage::new(1, EventKind::Create, titled("e-1", "a")),
    );
    wait_until(|| h.entity.cache().get("e-1").is_some());

    h.realtime.emit(
        "task",
        RealtimeMessage::new(2, EventKind::Delete, Record::with_id("e-1")),
    );
    wait_until(|| h.entity.cache().is_deleted("e-1"));

    // Post-delete stragglers must not resurrect the entity.
    h.realtime.emit(
        "task",
        RealtimeMessage::new(3, EventKind::Update, titled("e-1", "zombie")),
    );
    h.realtime.emit(
        "task",
        RealtimeMessage::new(4, EventKind::Restore, Record::with_id("e-1")),
    );
    wait_until(|| h.realtime.acked("task") == vec![1, 2, 3, 4]);
    assert!(h.entity.cache().get("e-1").is_none());
    assert!(h.entity.cache().is_deleted("e-1"));

    // A fresh create ends the tombstone.
    h.realtime.emit(
        "task",
        RealtimeMessage::new(5, EventKind::Create, titled("e-1", "b")),
    );
    wait_until(|| h.entity.cache().get("e-1").is_some());
    assert!(!h.entity.cache().is_deleted("e-1"));

    h.entity.shutdown();
}

#[test]
fn mutations_apply_only_through_their_echo() {
    let h = default_harness();
    h.entity.build().unwrap();
    let (cell, _) = h.entity.create(Record::with_id("e-1")).unwrap();

    h.entity.update("e-1", titled("e-1", "renamed")).unwrap();
    assert!(cell.get().get("title").is_none());

    h.realtime.emit(
        "task",
        RealtimeMessage::new(1, EventKind::Update, titled("e-1", "renamed")),
    );
    wait_until(|| cell.get().get("title").and_then(FieldValue::as_text) == Some("renamed"));
    h.entity.shutdown();
}

#[test]
fn force_save_then_echo_converges_clean() {
    let h = default_harness();
    h.entity.build().unwrap();
    h.entity.create(titled("e-1", "start")).unwrap();

    let session = h.entity.staging("e-1").unwrap();
    session.set("title", FieldValue::from("edited")).unwrap();

    // A competing remote edit arrives mid-session.
    h.realtime.emit(
        "task",
        RealtimeMessage::new(1, EventKind::Update, titled("e-1", "theirs")),
    );
    wait_until(|| {
        h.entity
            .cache()
            .get("e-1")
            .map(|cell| cell.get().get("title").and_then(FieldValue::as_text) == Some("theirs"))
            .unwrap_or(false)
    });
    assert!(matches!(
        session.save(&SaveStrategy::IfClean, h.entity.as_ref()),
        Err(EngineError::Conflict { .. })
    ));

    let result = session.save(&SaveStrategy::Force, h.entity.as_ref()).unwrap();
    assert!(result.success);

    // The echo of the forced update lands and the session is clean.
    h.realtime.emit(
        "task",
        RealtimeMessage::new(2, EventKind::Update, titled("e-1", "edited")),
    );
    wait_until(|| !session.is_dirty_remote());
    assert!(!session.is_dirty_local());
    h.entity.shutdown();
}

#[test]
fn pagination_boundaries_are_noops() {
    let h = default_harness();
    h.entity.connect().unwrap();

    let page_of = |start: u64, len: u64| -> Vec<Record> {
        (start..start + len)
            .map(|i| Record::with_id(format!("r{i}")))
            .collect()
    };
    // Every navigation revalidates the total before fetching its page:
    // counter probe + page 0, then a probe per move.
    h.calls
        .push_read_response(CallResult::with_page(page_of(0, 1), 25));
    h.calls
        .push_read_response(CallResult::with_page(page_of(0, 10), 25));
    h.calls
        .push_read_response(CallResult::with_page(page_of(0, 1), 25));
    h.calls
        .push_read_response(CallResult::with_page(page_of(10, 10), 25));
    h.calls
        .push_read_response(CallResult::with_page(page_of(0, 1), 25));
    h.calls
        .push_read_response(CallResult::with_page(page_of(20, 5), 25));
    h.calls
        .push_read_response(CallResult::with_page(page_of(0, 1), 25));

    let paged = h
        .entity
        .by_filter(serde_json::json!({"open": true}), 10)
        .unwrap();

    assert!(paged.next().unwrap());
    assert!(paged.next().unwrap());
    assert_eq!(paged.page(), 2);
    assert_eq!(paged.records().len(), 5);
    // 25 total at page size 10: there is no page 3.
    assert!(!paged.next().unwrap());
    assert_eq!(paged.page(), 2);
}

#[test]
fn filtered_views_follow_structural_echoes() {
    let h = default_harness();
    h.entity.build().unwrap();

    let ids = |names: &[&str]| -> Vec<Record> {
        names.iter().map(|name| Record::with_id(*name)).collect()
    };
    h.calls
        .push_read_response(CallResult::with_page(ids(&["r0"]), 2));
    h.calls
        .push_read_response(CallResult::with_page(ids(&["r0", "r1"]), 2));
    let paged = h
        .entity
        .by_filter(serde_json::json!({"open": true}), 10)
        .unwrap();
    assert_eq!(paged.total(), 2);

    // A create echo admits a new entity; the view bumps its total and a
    // reconciling refetch picks up the row.
    h.calls
        .push_read_response(CallResult::with_page(ids(&["r0"]), 3));
    h.calls
        .push_read_response(CallResult::with_page(ids(&["r0", "r1", "r2"]), 3));
    h.realtime.emit(
        "task",
        RealtimeMessage::new(1, EventKind::Create, titled("r2", "new")),
    );
    wait_until(|| paged.records().len() == 3);
    assert_eq!(paged.total(), 3);

    // A delete echo walks it back.
    h.calls
        .push_read_response(CallResult::with_page(ids(&["r0"]), 2));
    h.calls
        .push_read_response(CallResult::with_page(ids(&["r0", "r1"]), 2));
    h.realtime.emit(
        "task",
        RealtimeMessage::new(2, EventKind::Delete, Record::with_id("r2")),
    );
    wait_until(|| paged.records().len() == 2);
    assert_eq!(paged.total(), 2);
    h.entity.shutdown();
}

#[test]
fn offline_mutations_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let calls = Arc::new(MockCallTransport::new());
        let realtime = Arc::new(MockRealtimeTransport::new());
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let entity = EntityType::new(
            "task",
            schema(),
            EngineConfig::new(),
            Arc::clone(&calls) as Arc<dyn CallTransport>,
            realtime as Arc<dyn RealtimeTransport>,
            Some(Arc::clone(&store) as Arc<dyn DurableStore>),
        );
        entity.connect().unwrap();

        calls.set_offline(true);
        assert!(entity.update("e-1", titled("e-1", "queued")).is_err());
        assert_eq!(store.list_mutations().unwrap().len(), 1);
    }

    // A new process: the journal is still there and flushes.
    let calls = Arc::new(MockCallTransport::new());
    let realtime = Arc::new(MockRealtimeTransport::new());
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let entity = EntityType::new(
        "task",
        schema(),
        EngineConfig::new().with_queue(QueueConfig::new().with_min_entry_age(Duration::ZERO)),
        Arc::clone(&calls) as Arc<dyn CallTransport>,
        realtime as Arc<dyn RealtimeTransport>,
        Some(Arc::clone(&store) as Arc<dyn DurableStore>),
    );
    entity.connect().unwrap();

    assert_eq!(entity.queue().flush_due(), 1);
    let batches = calls.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][0].payload.id(), Some("e-1"));
    assert!(store.list_mutations().unwrap().is_empty());
}

#[test]
fn debounced_cell_notifies_once_with_the_last_value() {
    let h = harness(
        EngineConfig::new().with_cell_notify(NotifyMode::Debounced(Duration::from_millis(40))),
    );
    h.entity.build().unwrap();

    h.realtime.emit(
        "task",
        RealtimeMessage::new(1, EventKind::Create, titled("e-1", "v0")),
    );
    wait_until(|| h.entity.cache().get("e-1").is_some());
    let cell = h.entity.cache().get("e-1").unwrap();
    let rx = cell.watch();

    for (seq, title) in [(2, "v1"), (3, "v2"), (4, "v3")] {
        h.realtime.emit(
            "task",
            RealtimeMessage::new(seq, EventKind::Update, titled("e-1", title)),
        );
    }
    wait_until(|| cell.get().get("title").and_then(FieldValue::as_text) == Some("v3"));

    // The burst collapses to its trailing edge: the final notification
    // carries v3, and nothing arrives after the window goes quiet.
    let mut last = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    while let Ok(next) = rx.recv_timeout(Duration::from_millis(150)) {
        last = next;
    }
    assert_eq!(last.get("title").and_then(FieldValue::as_text), Some("v3"));
    h.entity.shutdown();
}

#[test]
fn live_collection_tracks_archive_transitions() {
    let h = default_harness();
    h.entity.build().unwrap();
    let live = h.entity.live_collection(|record| !record.is_archived());

    h.realtime.emit(
        "task",
        RealtimeMessage::new(1, EventKind::Create, titled("e-1", "a")),
    );
    wait_until(|| live.contains("e-1"));

    h.realtime.emit(
        "task",
        RealtimeMessage::new(2, EventKind::Archive, Record::with_id("e-1")),
    );
    wait_until(|| !live.contains("e-1"));
    // Archive flips a flag; the entity itself stays cached.
    assert!(h.entity.cache().get("e-1").is_some());

    h.realtime.emit(
        "task",
        RealtimeMessage::new(3, EventKind::Restore, Record::with_id("e-1")),
    );
    wait_until(|| live.contains("e-1"));
    h.entity.shutdown();
}

// ---- property tests ----------------------------------------------------

#[derive(Debug, Clone)]
struct Event {
    kind: EventKind,
    id: u8,
    value: u8,
}

fn event_strategy() -> impl Strategy<Value = Event> {
    (0..5u8, 0..3u8, 0..5u8).prop_map(|(kind, id, value)| Event {
        kind: match kind {
            0 => EventKind::Create,
            1 => EventKind::Update,
            2 => EventKind::Archive,
            3 => EventKind::Restore,
            _ => EventKind::Delete,
        },
        id,
        value,
    })
}

fn router_fixture() -> (Arc<syncmirror_engine::EntityCache>, EventRouter) {
    let cache = Arc::new(syncmirror_engine::EntityCache::new(
        "task",
        FieldSchema::new(),
        NotifyMode::Immediate,
    ));
    let realtime = Arc::new(MockRealtimeTransport::new());
    let router = EventRouter::new(
        "task",
        Arc::clone(&cache),
        realtime as Arc<dyn RealtimeTransport>,
    );
    (cache, router)
}

fn message_for(seq: u64, event: &Event) -> RealtimeMessage {
    let mut data = Record::with_id(format!("e-{}", event.id));
    data.set("count", FieldValue::Number(f64::from(event.value)));
    RealtimeMessage::new(seq, event.kind, data)
}

fn cache_snapshot(cache: &syncmirror_engine::EntityCache) -> Vec<(String, bool, Record)> {
    let mut snapshot: Vec<(String, bool, Record)> = (0..3u8)
        .map(|i| format!("e-{i}"))
        .map(|id| {
            let record = cache.get(&id).map(|cell| cell.get()).unwrap_or_default();
            (id.clone(), cache.is_deleted(&id), record)
        })
        .collect();
    snapshot.sort_by(|a, b| a.0.cmp(&b.0));
    snapshot
}

proptest! {
    /// Delivering every event twice in a row (at-least-once transport)
    /// must land in the same state as delivering it once.
    #[test]
    fn duplicated_delivery_is_idempotent(events in prop::collection::vec(event_strategy(), 0..24)) {
        let (once_cache, once_router) = router_fixture();
        let (twice_cache, twice_router) = router_fixture();

        let mut seq = 0u64;
        for event in &events {
            seq += 1;
            once_router.apply(&message_for(seq, event)).unwrap();
            twice_router.apply(&message_for(seq, event)).unwrap();
            twice_router.apply(&message_for(seq, event)).unwrap();
        }

        prop_assert_eq!(cache_snapshot(&once_cache), cache_snapshot(&twice_cache));
    }

    /// A deleted identity stays gone under any later non-create traffic.
    #[test]
    fn tombstones_hold_against_arbitrary_traffic(events in prop::collection::vec(event_strategy(), 0..24)) {
        let (cache, router) = router_fixture();
        router.apply(&RealtimeMessage::new(1, EventKind::Create, Record::with_id("e-0"))).unwrap();
        router.apply(&RealtimeMessage::new(2, EventKind::Delete, Record::with_id("e-0"))).unwrap();

        let mut seq = 2u64;
        let mut recreated = false;
        for event in &events {
            seq += 1;
            recreated = recreated || (event.id == 0 && event.kind == EventKind::Create);
            router.apply(&message_for(seq, event)).unwrap();
        }

        if !recreated {
            prop_assert!(cache.get("e-0").is_none());
            prop_assert!(cache.is_deleted("e-0"));
        }
    }
}
