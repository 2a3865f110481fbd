//! Wire messages: realtime envelopes and request/response calls.

use crate::record::Record;
use crate::schema::FieldSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of entity-change event carried on the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A new entity exists.
    Create,
    /// Fields of an existing entity changed.
    Update,
    /// The entity was archived.
    Archive,
    /// The entity was restored from the archive.
    Restore,
    /// The entity was removed permanently.
    Delete,
}

impl EventKind {
    /// Returns the wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Archive => "archive",
            EventKind::Restore => "restore",
            EventKind::Delete => "delete",
        }
    }

    /// Parses a wire name into an event kind.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(EventKind::Create),
            "update" => Some(EventKind::Update),
            "archive" => Some(EventKind::Archive),
            "restore" => Some(EventKind::Restore),
            "delete" => Some(EventKind::Delete),
            _ => None,
        }
    }
}

/// A server→client message on the realtime channel.
///
/// `seq` is monotonic per channel; the client acknowledges it after
/// applying the event so the transport can resume from the last ack on
/// reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    /// Monotonic sequence number assigned by the server.
    pub seq: u64,
    /// The kind of change.
    pub event: EventKind,
    /// The affected record (possibly partial).
    pub data: Record,
}

impl RealtimeMessage {
    /// Creates a realtime message.
    pub fn new(seq: u64, event: EventKind, data: Record) -> Self {
        Self { seq, event, data }
    }
}

/// A client→server acknowledgement of a processed sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// The sequence number that was applied.
    pub seq: u64,
}

/// Kind of mutation submitted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    /// Create a new entity.
    Create,
    /// Update fields of an existing entity.
    Update,
    /// Archive an entity.
    Archive,
    /// Restore an archived entity.
    Restore,
    /// Permanently delete an entity.
    Delete,
}

impl MutationKind {
    /// Returns the wire name of this mutation.
    pub fn name(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Archive => "archive",
            MutationKind::Restore => "restore",
            MutationKind::Delete => "delete",
        }
    }

    /// Parses a wire name into a mutation kind.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(MutationKind::Create),
            "update" => Some(MutationKind::Update),
            "archive" => Some(MutationKind::Archive),
            "restore" => Some(MutationKind::Restore),
            "delete" => Some(MutationKind::Delete),
            _ => None,
        }
    }
}

/// Startup handshake: the client sends its declared schema for validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Entity type name.
    pub entity: String,
    /// The client's declared field schema.
    pub schema: FieldSchema,
    /// Protocol version.
    pub protocol_version: u16,
}

impl HandshakeRequest {
    /// Creates a handshake request at the current protocol version.
    pub fn new(entity: impl Into<String>, schema: FieldSchema) -> Self {
        Self {
            entity: entity.into(),
            schema,
            protocol_version: 1,
        }
    }
}

/// Server verdict on a handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Whether the schema was accepted.
    pub success: bool,
    /// Server message, set on rejection.
    pub message: Option<String>,
}

impl HandshakeResponse {
    /// Creates an accepting response.
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Creates a rejecting response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// A single mutation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRequest {
    /// Entity type name.
    pub entity: String,
    /// The mutation kind.
    pub kind: MutationKind,
    /// Outgoing payload (server-owned columns already stripped).
    pub payload: Record,
}

impl MutationRequest {
    /// Creates a mutation request.
    pub fn new(entity: impl Into<String>, kind: MutationKind, payload: Record) -> Self {
        Self {
            entity: entity.into(),
            kind,
            payload,
        }
    }
}

/// A read call against one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReadRequest {
    /// Read a single entity by identity.
    ById(String),
    /// Read all live entities.
    All,
    /// Read all archived entities.
    Archived,
    /// Read a page of entities matching a server-evaluated filter.
    Filter {
        /// Opaque filter expression, interpreted by the server.
        filter: serde_json::Value,
        /// Zero-based page index.
        page: u64,
        /// Page size.
        page_size: u64,
    },
}

/// The common result envelope for request/response calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Whether the call succeeded.
    pub success: bool,
    /// Server message, usually set on failure.
    pub message: Option<String>,
    /// Returned records, for reads.
    pub data: Option<Vec<Record>>,
    /// Total matching count, for paged reads.
    pub total: Option<u64>,
}

impl CallResult {
    /// Creates a bare success with no data.
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
            data: None,
            total: None,
        }
    }

    /// Creates a success carrying records.
    pub fn with_data(data: Vec<Record>) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            total: None,
        }
    }

    /// Creates a success carrying a page of records and the total count.
    pub fn with_page(data: Vec<Record>, total: u64) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            total: Some(total),
        }
    }

    /// Creates a failure.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            total: None,
        }
    }

    /// Returns the returned records, or an empty slice.
    pub fn records(&self) -> &[Record] {
        self.data.as_deref().unwrap_or(&[])
    }
}

/// One historical version of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Version counter, increasing per entity.
    pub version: u64,
    /// When this version was recorded, epoch milliseconds.
    pub recorded_ms: i64,
    /// The record as of this version.
    pub record: Record,
}

/// Result of a version-history read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResult {
    /// Whether the call succeeded.
    pub success: bool,
    /// Server message, usually set on failure.
    pub message: Option<String>,
    /// The historical versions, newest first.
    pub versions: Vec<VersionEntry>,
}

impl HistoryResult {
    /// Creates a success carrying versions.
    pub fn with_versions(versions: Vec<VersionEntry>) -> Self {
        Self {
            success: true,
            message: None,
            versions,
        }
    }

    /// Creates a failure.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            versions: Vec::new(),
        }
    }
}

/// Per-entry outcome of a batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntryResult {
    /// Identity of the queue entry this verdict is for.
    pub entry_id: Uuid,
    /// Whether the entry was applied.
    pub success: bool,
    /// Server message, usually set on failure.
    pub message: Option<String>,
    /// Optional result record.
    pub data: Option<Record>,
}

impl BatchEntryResult {
    /// Creates an applied verdict.
    pub fn success(entry_id: Uuid) -> Self {
        Self {
            entry_id,
            success: true,
            message: None,
            data: None,
        }
    }

    /// Creates a rejected verdict.
    pub fn error(entry_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            entry_id,
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}
