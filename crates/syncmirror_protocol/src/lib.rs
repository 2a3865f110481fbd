//! # syncmirror Protocol
//!
//! Wire and data model for the syncmirror entity synchronization engine.
//!
//! This crate provides:
//! - Field values, kinds, and per-type field schemas
//! - Partial records with the read-visibility invariant (an absent field
//!   means "not readable", never "empty")
//! - Realtime channel envelopes with sequence acknowledgement
//! - Request/response call envelopes (handshake, mutation, read, history,
//!   batch)
//! - CBOR helpers used by the durable store and for batch payloads

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod record;
mod schema;
mod value;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    Ack, BatchEntryResult, CallResult, EventKind, HandshakeRequest, HandshakeResponse,
    HistoryResult, MutationKind, MutationRequest, ReadRequest, RealtimeMessage, VersionEntry,
};
pub use record::{
    Record, COL_ARCHIVED, COL_ATTRIBUTES, COL_CAN_UPDATE, COL_CREATED, COL_ID, COL_LIFETIME,
    COL_UPDATED, GLOBAL_COLUMNS, SERVER_OWNED_COLUMNS,
};
pub use schema::{FieldSchema, ShapeIssue};
pub use value::{FieldKind, FieldValue};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbor_roundtrip() {
        let mut record = Record::with_id("e-1");
        record.set("count", FieldValue::Number(3.0));
        record.set("raw", FieldValue::Binary(vec![1, 2, 3]));

        let bytes = to_cbor(&record).unwrap();
        let back: Record = from_cbor(&bytes).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn cbor_decode_rejects_garbage() {
        let result: ProtocolResult<Record> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(result.is_err());
    }
}
