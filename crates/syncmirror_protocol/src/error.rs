//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or interpreting protocol data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A message carried an unknown event or mutation name.
    #[error("unknown wire name: {0}")]
    UnknownName(String),

    /// A message was structurally invalid.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::UnknownName("explode".into());
        assert!(err.to_string().contains("explode"));

        let err = ProtocolError::InvalidMessage("missing id".into());
        assert!(err.to_string().contains("missing id"));
    }
}
