//! Error types for the engine.

use crate::staging::FieldConflict;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the engine.
///
/// Server-side rejections of individual calls are not errors: public
/// operations return the server's [`syncmirror_protocol::CallResult`]
/// verdict directly. This enum covers the cases where no meaningful
/// verdict exists.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A record did not match its declared schema.
    ///
    /// Shape mismatches found during cache admission are logged instead,
    /// because partial records under field-level permissions are expected;
    /// this variant is raised only where a caller handed the engine
    /// something unusable (for example a record with no identity).
    #[error("validation: {0}")]
    Validation(String),

    /// A specific request failed before a server verdict was obtained.
    #[error("operation failed: {0}")]
    Operation(String),

    /// Handshake or realtime-subscribe failure.
    ///
    /// Fatal for the entity type: no further operation on it is
    /// meaningful until reconnection succeeds.
    #[error("connection failed for entity type '{entity}': {message}")]
    Connection {
        /// The entity type that failed to connect.
        entity: String,
        /// What went wrong.
        message: String,
    },

    /// A staging save found unresolved conflicts under a strategy that
    /// forbids them. Recoverable: retry with a different strategy or
    /// resolve manually.
    #[error("{} conflicting field(s)", conflicts.len())]
    Conflict {
        /// The conflicting fields.
        conflicts: Vec<FieldConflict>,
    },

    /// The entity backing an operation was deleted.
    #[error("entity '{0}' was deleted")]
    EntityDeleted(String),

    /// The entity type has not completed its handshake.
    #[error("entity type '{0}' is not connected")]
    NotConnected(String),

    /// Durable store failure that could not be degraded around.
    #[error("store error: {0}")]
    Store(#[from] syncmirror_store::StoreError),

    /// Wire data could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] syncmirror_protocol::ProtocolError),

    /// A bounded wait elapsed.
    #[error("operation timed out")]
    Timeout,
}

impl EngineError {
    /// Returns true if the entity type must reconnect before further use.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Connection { .. } | EngineError::NotConnected(_)
        )
    }

    /// Returns true if the caller can recover by retrying differently.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Conflict { .. } | EngineError::Operation(_) | EngineError::Timeout
        )
    }
}
