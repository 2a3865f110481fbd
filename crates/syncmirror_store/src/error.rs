//! Error types for the durable store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An I/O error from the backing files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding a stored table failed.
    #[error("codec error: {0}")]
    Codec(#[from] syncmirror_protocol::ProtocolError),

    /// Another process holds the store lock.
    #[error("store directory is locked: {0}")]
    Locked(String),

    /// A stored table could not be interpreted.
    #[error("corrupt store table: {0}")]
    Corrupt(String),

    /// The store is unavailable.
    ///
    /// Callers are expected to degrade gracefully: skip queueing or
    /// caching rather than failing the surrounding operation.
    #[error("durable store unavailable")]
    Unavailable,
}
