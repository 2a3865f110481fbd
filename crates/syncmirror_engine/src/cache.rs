//! The live entity cache: one observable cell per entity identity.
//!
//! Every consumer holding an entity holds the same [`EntityCell`], so a
//! change applied once is visible everywhere at once. The cache is mutated
//! only by the realtime event router (and by local creates, which insert
//! the optimistic cell); mutations submitted through a cell travel to the
//! server and come back as events before the cached value changes.

use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use syncmirror_protocol::{CallResult, FieldSchema, MutationKind, Record, COL_ID};
use syncmirror_reactive::{
    CacheChange, Cell, Collection, CollectionEvent, DispatchAction, DispatchRegistry, NotifyMode,
    Registration, Subscription,
};
use tracing::warn;

/// Where cell-initiated mutations are submitted.
///
/// Implemented by the entity type; cells and staging sessions stay
/// decoupled from the transport and queue behind this seam.
pub trait MutationSink: Send + Sync {
    /// Submits one mutation and returns the server verdict.
    fn submit(&self, kind: MutationKind, payload: Record) -> EngineResult<CallResult>;
}

/// A single cached entity.
///
/// The cell is the one canonical holder of this entity's state on the
/// client. [`EntityCell::update`] submits a mutation but never changes the
/// cached record; the change lands when the server echoes it back on the
/// realtime channel.
pub struct EntityCell {
    id: String,
    record: Cell<Record>,
}

impl std::fmt::Debug for EntityCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCell").field("id", &self.id).finish()
    }
}

impl EntityCell {
    fn new(record: Record, mode: NotifyMode) -> EngineResult<Arc<Self>> {
        let id = record
            .id()
            .ok_or_else(|| EngineError::Validation("record has no identity".into()))?
            .to_owned();
        Ok(Arc::new(Self {
            id,
            record: Cell::with_mode(record, mode),
        }))
    }

    /// The entity identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns a snapshot of the current record.
    pub fn get(&self) -> Record {
        self.record.get()
    }

    /// Returns true if the entity is visibly archived.
    pub fn is_archived(&self) -> bool {
        self.get().is_archived()
    }

    /// Subscribes to record changes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<Record>
    where
        F: Fn(&Record) + Send + Sync + 'static,
    {
        self.record.subscribe(callback)
    }

    /// Returns a channel receiving every record notification.
    pub fn watch(&self) -> Receiver<Record> {
        self.record.watch()
    }

    /// Waits for the next record notification, up to `timeout`.
    pub fn wait_next(&self, timeout: Duration) -> Option<Record> {
        self.record.wait_next(timeout)
    }

    /// Submits an update built from the current record.
    ///
    /// The mutator edits a copy; server-owned columns are stripped from
    /// the outgoing payload and the cached record is left untouched until
    /// the echo arrives. The returned [`UndoHandle`] captures the
    /// pre-mutation values of every field the update carries, so the
    /// change can be reverted with one more update.
    pub fn update<F>(&self, sink: &dyn MutationSink, mutate: F) -> EngineResult<UpdateReceipt>
    where
        F: FnOnce(&mut Record),
    {
        let before = self.get();
        let mut next = before.clone();
        mutate(&mut next);

        let payload = {
            let mut payload = next.outgoing_payload();
            payload.set(COL_ID, syncmirror_protocol::FieldValue::from(self.id.as_str()));
            payload
        };

        // Fields that were absent before the edit cannot be restored by a
        // later update and are left out of the undo payload.
        let mut undo = Record::with_id(self.id.as_str());
        for (name, _) in payload.iter() {
            if name == COL_ID {
                continue;
            }
            if let Some(prev) = before.get(name) {
                undo.set(name, prev.clone());
            }
        }

        let result = sink.submit(MutationKind::Update, payload)?;
        Ok(UpdateReceipt {
            result,
            undo: UndoHandle { payload: undo },
        })
    }

    fn merge(&self, incoming: &Record) -> Record {
        self.record.modify(|record| record.merge(incoming))
    }

    fn set_archived(&self, archived: bool) -> Record {
        self.record.modify(|record| record.set_archived(archived))
    }
}

/// Result of a cell-initiated update: the server verdict plus the undo
/// handle for reverting it.
pub struct UpdateReceipt {
    /// The server verdict on the update.
    pub result: CallResult,
    /// Handle reverting the update's fields to their pre-mutation values.
    pub undo: UndoHandle,
}

/// Captures pre-mutation field values so an update can be reverted.
#[derive(Debug, Clone)]
pub struct UndoHandle {
    payload: Record,
}

impl UndoHandle {
    /// The payload a revert would submit.
    pub fn payload(&self) -> &Record {
        &self.payload
    }

    /// Submits an update restoring the captured values.
    pub fn revert(&self, sink: &dyn MutationSink) -> EngineResult<CallResult> {
        sink.submit(MutationKind::Update, self.payload.clone())
    }
}

/// The per-entity-type cache of live cells.
pub struct EntityCache {
    entity: String,
    schema: FieldSchema,
    mode: NotifyMode,
    cells: RwLock<HashMap<String, Arc<EntityCell>>>,
    tombstones: RwLock<HashSet<String>>,
    dispatcher: DispatchRegistry<Record>,
}

impl EntityCache {
    /// Creates an empty cache for one entity type.
    pub fn new(entity: impl Into<String>, schema: FieldSchema, mode: NotifyMode) -> Self {
        Self {
            entity: entity.into(),
            schema,
            mode,
            cells: RwLock::new(HashMap::new()),
            tombstones: RwLock::new(HashSet::new()),
            dispatcher: DispatchRegistry::new(),
        }
    }

    /// The entity type name this cache serves.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The declared field schema.
    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Returns the cell for an identity, if cached.
    pub fn get(&self, id: &str) -> Option<Arc<EntityCell>> {
        self.cells.read().get(id).cloned()
    }

    /// Returns the number of cached entities.
    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Returns the cached identities.
    pub fn ids(&self) -> Vec<String> {
        self.cells.read().keys().cloned().collect()
    }

    /// Returns true if this identity was deleted and not re-created since.
    pub fn is_deleted(&self, id: &str) -> bool {
        self.tombstones.read().contains(id)
    }

    /// The predicate dispatcher feeding live views of this cache.
    pub fn dispatcher(&self) -> &DispatchRegistry<Record> {
        &self.dispatcher
    }

    /// Admits a record and returns the canonical cell for its identity.
    ///
    /// If the identity is already cached the existing cell is returned
    /// unchanged; there is never more than one cell per identity. A record
    /// arriving from a read clears any tombstone for its identity, since
    /// the server evidently has the entity again.
    pub fn obtain(&self, record: Record) -> EngineResult<Arc<EntityCell>> {
        let id = record
            .id()
            .ok_or_else(|| EngineError::Validation("record has no identity".into()))?
            .to_owned();

        if let Some(existing) = self.get(&id) {
            return Ok(existing);
        }

        self.check_shape(&record);
        let cell = EntityCell::new(record.clone(), self.mode)?;
        {
            let mut cells = self.cells.write();
            if let Some(existing) = cells.get(&id) {
                // Lost the race; the winner's cell is canonical.
                return Ok(Arc::clone(existing));
            }
            cells.insert(id.clone(), Arc::clone(&cell));
        }
        self.tombstones.write().remove(&id);
        self.dispatcher.dispatch(&CacheChange::Entered {
            key: id,
            value: record,
        });
        Ok(cell)
    }

    /// Creates a live view of every cached record matching `satisfies`.
    ///
    /// The view is seeded from the current cache and tracks membership as
    /// records enter, change and leave. Dropping the view detaches it.
    pub fn live_view<P>(&self, mode: NotifyMode, satisfies: P) -> LiveCollection
    where
        P: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        LiveCollection::attach(self, mode, satisfies)
    }

    pub(crate) fn merge_into(&self, id: &str, incoming: &Record) -> Option<Record> {
        let cell = self.get(id)?;
        let merged = cell.merge(incoming);
        self.dispatcher.dispatch(&CacheChange::Changed {
            key: id.to_owned(),
            value: merged.clone(),
        });
        Some(merged)
    }

    pub(crate) fn flip_archived(&self, id: &str, archived: bool) -> Option<Record> {
        let cell = self.get(id)?;
        if cell.is_archived() == archived {
            return Some(cell.get());
        }
        let flipped = cell.set_archived(archived);
        self.dispatcher.dispatch(&CacheChange::Changed {
            key: id.to_owned(),
            value: flipped.clone(),
        });
        Some(flipped)
    }

    pub(crate) fn remove(&self, id: &str) -> bool {
        let removed = self.cells.write().remove(id).is_some();
        self.tombstones.write().insert(id.to_owned());
        if removed {
            self.dispatcher.dispatch(&CacheChange::Left { key: id.to_owned() });
        }
        removed
    }

    pub(crate) fn clear_tombstone(&self, id: &str) -> bool {
        self.tombstones.write().remove(id)
    }

    fn check_shape(&self, record: &Record) {
        let issues = self.schema.check(record);
        if !issues.is_empty() {
            let detail = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            warn!(entity = %self.entity, id = ?record.id(), %detail, "record shape mismatch");
        }
    }
}

/// A predicate-filtered live view over an [`EntityCache`].
///
/// Membership is deduplicated by entity identity; the same record entering
/// twice occupies one slot. Dropping the view deregisters it from the
/// cache dispatcher.
pub struct LiveCollection {
    collection: Arc<Collection<Record>>,
    _registration: Registration<Record>,
}

impl LiveCollection {
    fn attach<P>(cache: &EntityCache, mode: NotifyMode, satisfies: P) -> Self
    where
        P: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        let satisfies = Arc::new(satisfies);
        let collection = Arc::new(Collection::with_mode(
            |record: &Record| record.id().unwrap_or_default().to_owned(),
            mode,
        ));

        let sink = Arc::clone(&collection);
        let predicate = Arc::clone(&satisfies);
        let registration = cache.dispatcher.register(
            move |record| predicate(record),
            move |action| match action {
                DispatchAction::Add(record) | DispatchAction::Inform(record) => {
                    sink.upsert(record);
                }
                DispatchAction::Remove(key) => {
                    sink.remove(&key);
                }
            },
        );

        // Seed after registering so no change slips between the two; the
        // upsert dedupe makes a double-apply harmless.
        let cells: Vec<Arc<EntityCell>> = cache.cells.read().values().cloned().collect();
        for cell in cells {
            let record = cell.get();
            if satisfies(&record) {
                collection.upsert(record);
            }
        }

        Self {
            collection,
            _registration: registration,
        }
    }

    /// Returns a snapshot of the view's records.
    pub fn records(&self) -> Vec<Record> {
        self.collection.items()
    }

    /// Returns the number of records in view.
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    /// Returns true if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Returns true if the identity is in view.
    pub fn contains(&self, id: &str) -> bool {
        self.collection.contains(id)
    }

    /// Subscribes to membership changes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<CollectionEvent<Record>>
    where
        F: Fn(&CollectionEvent<Record>) + Send + Sync + 'static,
    {
        self.collection.subscribe(callback)
    }

    /// Returns a channel receiving every membership notification.
    pub fn watch(&self) -> Receiver<CollectionEvent<Record>> {
        self.collection.watch()
    }

    /// Waits for the next membership notification, up to `timeout`.
    pub fn wait_next(&self, timeout: Duration) -> Option<CollectionEvent<Record>> {
        self.collection.wait_next(timeout)
    }
}
