//! One synchronized entity type.
//!
//! An [`EntityType`] owns the per-type machinery: the schema handshake,
//! the realtime pump feeding the event router, the entity cache, the
//! offline write queue and the request cache. Mutations flow out through
//! the call transport and come back as realtime events; nothing here
//! writes the cache on the outbound path except a local create, which
//! inserts its optimistic cell.

use crate::cache::{EntityCache, EntityCell, LiveCollection, MutationSink};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::paged::PagedCollection;
use crate::queue::OfflineWriteQueue;
use crate::request_cache::RequestCache;
use crate::router::EventRouter;
use crate::staging::StagingSession;
use crate::transport::{CallTransport, RealtimeTransport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use syncmirror_protocol::{
    CallResult, FieldSchema, FieldValue, HandshakeRequest, HistoryResult, MutationKind,
    MutationRequest, ReadRequest, Record, COL_ID,
};
use syncmirror_reactive::DispatchAction;
use syncmirror_store::DurableStore;
use tracing::{info, warn};
use uuid::Uuid;

const PUMP_POLL: Duration = Duration::from_millis(100);

/// A synchronized entity type: schema, cache, realtime pump and queue.
pub struct EntityType {
    name: String,
    schema: FieldSchema,
    config: EngineConfig,
    calls: Arc<dyn CallTransport>,
    realtime: Arc<dyn RealtimeTransport>,
    cache: Arc<EntityCache>,
    router: Arc<EventRouter>,
    queue: Arc<OfflineWriteQueue>,
    requests: RequestCache,
    connected: AtomicBool,
    pump_running: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl EntityType {
    /// Creates an entity type. Nothing talks to the server until
    /// [`EntityType::build`] or [`EntityType::connect`] runs.
    pub fn new(
        name: impl Into<String>,
        schema: FieldSchema,
        config: EngineConfig,
        calls: Arc<dyn CallTransport>,
        realtime: Arc<dyn RealtimeTransport>,
        store: Option<Arc<dyn DurableStore>>,
    ) -> Arc<Self> {
        let name = name.into();
        let cache = Arc::new(EntityCache::new(
            name.clone(),
            schema.clone(),
            config.cell_notify,
        ));
        let router = Arc::new(EventRouter::new(
            name.clone(),
            Arc::clone(&cache),
            Arc::clone(&realtime),
        ));
        let queue = Arc::new(OfflineWriteQueue::new(
            name.clone(),
            store.clone(),
            Arc::clone(&calls),
            config.queue.clone(),
        ));
        Arc::new(Self {
            name,
            schema,
            config,
            calls,
            realtime,
            cache,
            router,
            queue,
            requests: RequestCache::new(store),
            connected: AtomicBool::new(false),
            pump_running: Arc::new(AtomicBool::new(false)),
            pump: Mutex::new(None),
        })
    }

    /// The entity type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared field schema.
    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// The live entity cache.
    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// The offline write queue.
    pub fn queue(&self) -> &Arc<OfflineWriteQueue> {
        &self.queue
    }

    /// The durable TTL cache for memoizing expensive calls.
    pub fn requests(&self) -> &RequestCache {
        &self.requests
    }

    /// Returns true once the handshake succeeded.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Performs the schema handshake.
    ///
    /// A rejected or unreachable handshake is fatal for the type; every
    /// operation fails until a later `connect` succeeds.
    pub fn connect(&self) -> EngineResult<()> {
        let request = HandshakeRequest {
            entity: self.name.clone(),
            schema: self.schema.clone(),
            protocol_version: self.config.protocol_version,
        };
        let response = self
            .calls
            .handshake(&request)
            .map_err(|error| EngineError::Connection {
                entity: self.name.clone(),
                message: error.to_string(),
            })?;
        if !response.success {
            self.connected.store(false, Ordering::SeqCst);
            return Err(EngineError::Connection {
                entity: self.name.clone(),
                message: response
                    .message
                    .unwrap_or_else(|| "handshake rejected".into()),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        info!(entity = %self.name, "handshake accepted");
        Ok(())
    }

    /// Connects, subscribes to realtime events and starts the background
    /// machinery: the event pump and the queue flusher.
    pub fn build(self: &Arc<Self>) -> EngineResult<()> {
        self.connect()?;
        let receiver = self.realtime.subscribe(&self.name)?;

        self.pump_running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.pump_running);
        let router = Arc::clone(&self.router);
        let entity = self.name.clone();
        let handle = std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                match receiver.recv_timeout(PUMP_POLL) {
                    Ok(message) => {
                        if let Err(error) = router.apply(&message) {
                            warn!(entity = %entity, seq = message.seq, %error, "event apply failed");
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        *self.pump.lock() = Some(handle);
        self.queue.start();
        Ok(())
    }

    /// Stops the pump and the queue flusher.
    pub fn shutdown(&self) {
        self.pump_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump.lock().take() {
            let _ = handle.join();
        }
        self.queue.stop();
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Creates an entity.
    ///
    /// The identity is taken from `fields` or generated. The optimistic
    /// cell enters the cache immediately; the create echo confirms it.
    /// If the direct send fails the mutation stays journaled and the
    /// transport error is returned.
    pub fn create(&self, mut fields: Record) -> EngineResult<(Arc<EntityCell>, CallResult)> {
        self.ensure_connected()?;
        if fields.id().is_none() {
            fields.set(COL_ID, FieldValue::from(Uuid::new_v4().to_string()));
        }
        let cell = self.cache.obtain(fields.clone())?;
        let result = self.submit(MutationKind::Create, fields)?;
        Ok((cell, result))
    }

    /// Updates fields of an entity. The cache changes only via the echo.
    pub fn update(&self, id: &str, fields: Record) -> EngineResult<CallResult> {
        let mut payload = fields;
        payload.set(COL_ID, FieldValue::from(id));
        self.submit(MutationKind::Update, payload)
    }

    /// Permanently deletes an entity.
    pub fn delete(&self, id: &str) -> EngineResult<CallResult> {
        self.submit(MutationKind::Delete, Record::with_id(id))
    }

    /// Archives an entity.
    pub fn archive(&self, id: &str) -> EngineResult<CallResult> {
        self.submit(MutationKind::Archive, Record::with_id(id))
    }

    /// Restores an archived entity.
    pub fn restore(&self, id: &str) -> EngineResult<CallResult> {
        self.submit(MutationKind::Restore, Record::with_id(id))
    }

    /// Reads all live entities, admitting each into the cache.
    pub fn all(&self) -> EngineResult<Vec<Arc<EntityCell>>> {
        self.read_cells(&ReadRequest::All)
    }

    /// Reads all archived entities, admitting each into the cache.
    pub fn archived(&self) -> EngineResult<Vec<Arc<EntityCell>>> {
        self.read_cells(&ReadRequest::Archived)
    }

    /// Reads one entity by identity.
    pub fn by_id(&self, id: &str) -> EngineResult<Option<Arc<EntityCell>>> {
        let cells = self.read_cells(&ReadRequest::ById(id.to_owned()))?;
        Ok(cells.into_iter().next())
    }

    /// Opens a paged view over a server-evaluated filter.
    ///
    /// Returned records are admitted into the cache, so a paged row and a
    /// cached cell for the same identity share state. The view follows
    /// structural cache changes: an entity entering or leaving moves the
    /// total optimistically and a refetch reconciles it.
    pub fn by_filter(
        self: &Arc<Self>,
        filter: serde_json::Value,
        page_size: u64,
    ) -> EngineResult<Arc<PagedCollection>> {
        self.ensure_connected()?;

        let fetch_owner = Arc::clone(self);
        let fetch_filter = filter.clone();
        let getter = Box::new(move |page: u64, page_size: u64| {
            let result = fetch_owner.calls.read(
                &fetch_owner.name,
                &ReadRequest::Filter {
                    filter: fetch_filter.clone(),
                    page,
                    page_size,
                },
            )?;
            if !result.success {
                return Err(EngineError::Operation(
                    result.message.unwrap_or_else(|| "filtered read failed".into()),
                ));
            }
            let records = result.records().to_vec();
            for record in &records {
                fetch_owner.cache.obtain(record.clone())?;
            }
            Ok(records)
        });

        let count_owner = Arc::clone(self);
        let counter = Box::new(move || {
            let result = count_owner.calls.read(
                &count_owner.name,
                &ReadRequest::Filter {
                    filter: filter.clone(),
                    page: 0,
                    page_size: 1,
                },
            )?;
            if !result.success {
                return Err(EngineError::Operation(
                    result.message.unwrap_or_else(|| "count read failed".into()),
                ));
            }
            Ok(result.total.unwrap_or(result.records().len() as u64))
        });

        let paged = Arc::new(PagedCollection::new(
            page_size,
            self.config.collection_notify,
            getter,
            counter,
        )?);

        // The server evaluates the filter, so membership is unknowable
        // client-side; any record entering or leaving the cache may move
        // the total, and the reconciling refetch settles it.
        let view = Arc::downgrade(&paged);
        let registration = self.cache.dispatcher().register(
            |_| true,
            move |action| {
                let Some(paged) = view.upgrade() else { return };
                match action {
                    DispatchAction::Add(_) => paged.note_added(),
                    DispatchAction::Remove(_) => paged.note_removed(),
                    DispatchAction::Inform(_) => {}
                }
            },
        );
        paged.track_membership(registration);
        Ok(paged)
    }

    /// Creates a live view of cached records matching `satisfies`.
    pub fn live_collection<P>(&self, satisfies: P) -> LiveCollection
    where
        P: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.cache
            .live_view(self.config.collection_notify, satisfies)
    }

    /// Opens an optimistic staging session over a cached entity.
    pub fn staging(&self, id: &str) -> EngineResult<StagingSession> {
        StagingSession::open(
            Arc::clone(&self.cache),
            id,
            self.config.recreate_on_delete,
        )
    }

    /// Lists the stored versions of an entity.
    pub fn history(&self, id: &str) -> EngineResult<HistoryResult> {
        self.ensure_connected()?;
        self.calls.history(&self.name, id)
    }

    /// Restores an entity to a stored version. The change lands as a
    /// realtime update.
    pub fn history_restore(&self, id: &str, version: u64) -> EngineResult<CallResult> {
        self.ensure_connected()?;
        self.calls.history_restore(&self.name, id, version)
    }

    /// Deletes one stored version of an entity.
    pub fn history_delete(&self, id: &str, version: u64) -> EngineResult<CallResult> {
        self.ensure_connected()?;
        self.calls.history_delete(&self.name, id, version)
    }

    /// Invokes a server-defined action for this entity type.
    pub fn custom(&self, action: &str, payload: &serde_json::Value) -> EngineResult<CallResult> {
        self.ensure_connected()?;
        self.calls.custom(&self.name, action, payload)
    }

    fn ensure_connected(&self) -> EngineResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(EngineError::NotConnected(self.name.clone()))
        }
    }

    fn read_cells(&self, request: &ReadRequest) -> EngineResult<Vec<Arc<EntityCell>>> {
        self.ensure_connected()?;
        let result = self.calls.read(&self.name, request)?;
        if !result.success {
            return Err(EngineError::Operation(
                result.message.unwrap_or_else(|| "read failed".into()),
            ));
        }
        result
            .records()
            .iter()
            .map(|record| self.cache.obtain(record.clone()))
            .collect()
    }
}

impl MutationSink for EntityType {
    /// Journals the mutation, sends it, and acknowledges the journal
    /// entry once the server round trip completes.
    ///
    /// A completed round trip acknowledges whatever the verdict was;
    /// replaying a mutation the server already judged would break
    /// at-most-once delivery. Only a transport failure leaves the entry
    /// for the batch flusher.
    fn submit(&self, kind: MutationKind, payload: Record) -> EngineResult<CallResult> {
        self.ensure_connected()?;
        let payload = payload.outgoing_payload();
        let entry_id = self.queue.enqueue(kind, payload.clone());
        let request = MutationRequest::new(self.name.clone(), kind, payload);
        match self.calls.mutate(&request) {
            Ok(result) => {
                if let Some(entry_id) = entry_id {
                    self.queue.acknowledge(entry_id);
                }
                if !result.success {
                    warn!(
                        entity = %self.name,
                        kind = kind.name(),
                        message = result.message.as_deref().unwrap_or(""),
                        "mutation rejected"
                    );
                }
                Ok(result)
            }
            Err(error) => {
                info!(entity = %self.name, kind = kind.name(), %error, "direct send failed, mutation journaled");
                Err(error)
            }
        }
    }
}

impl Drop for EntityType {
    fn drop(&mut self) {
        self.shutdown();
    }
}
