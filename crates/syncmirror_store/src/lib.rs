//! # syncmirror Store
//!
//! Durable local storage behind the syncmirror engine.
//!
//! This crate provides:
//! - The [`DurableStore`] trait over two logical tables: the
//!   pending-mutation log and the TTL cache
//! - [`MemoryStore`] for tests and ephemeral sessions
//! - [`FileStore`] for persistence across reloads, with an advisory
//!   directory lock and atomic table rewrites
//!
//! Tables are namespaced by a versioned store identifier
//! ([`STORE_NAMESPACE`]) so future layouts can migrate forward without
//! misreading old data.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entry;
mod error;
mod file;
mod memory;
mod store;

pub use entry::{now_ms, CacheEntry, QueueEntry};
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{DurableStore, STORE_NAMESPACE};
