//! # syncmirror Engine
//!
//! Client-side entity synchronization: a live entity cache fed by
//! realtime events, optimistic three-way editing, and a durable offline
//! write queue.
//!
//! The moving parts, per entity type:
//!
//! - [`EntityType`]: the composition unit (handshake, realtime pump,
//!   cache, queue)
//! - [`EntityCache`] / [`EntityCell`]: one canonical observable cell per
//!   entity identity
//! - [`EventRouter`]: the only writer of cached state, applying server
//!   events idempotently
//! - [`StagingSession`]: base/local/remote three-way merge with pluggable
//!   save strategies
//! - [`OfflineWriteQueue`]: journal-first mutation delivery with
//!   at-most-once batch replay
//! - [`RequestCache`]: durable TTL memoization for expensive calls
//! - [`PagedCollection`]: server-filtered paged reads
//! - [`Registry`]: name-keyed lookup of entity types plus shared headers
//!
//! Mutations never apply themselves locally: they travel to the server
//! and return as realtime events, so every client converges through the
//! same path. The one exception is a local create, whose optimistic cell
//! enters the cache immediately.
//!
//! Hosts provide the wire by implementing [`CallTransport`] and
//! [`RealtimeTransport`]; the scripted mocks in [`transport`] drive the
//! engine in tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod entity_type;
mod error;
mod paged;
mod queue;
mod registry;
mod request_cache;
mod router;
mod staging;
pub mod transport;

pub use cache::{EntityCache, EntityCell, LiveCollection, MutationSink, UndoHandle, UpdateReceipt};
pub use config::{EngineConfig, QueueConfig, PROTOCOL_VERSION};
pub use entity_type::EntityType;
pub use error::{EngineError, EngineResult};
pub use paged::{PagedCollection, PageGetter, TotalCounter};
pub use queue::OfflineWriteQueue;
pub use registry::Registry;
pub use request_cache::RequestCache;
pub use router::{Applied, EventRouter};
pub use staging::{FieldConflict, FieldState, MergeState, Resolver, SaveStrategy, StagingSession};
pub use transport::{CallTransport, MockCallTransport, MockRealtimeTransport, RealtimeTransport};
