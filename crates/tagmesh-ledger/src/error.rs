//! Error types for the ledger crate.

use tagmesh_types::TypesError;

/// Errors that can occur while encoding, validating or storing statements.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Subject, object, predicate or operation is out of range or badly encoded.
    #[error("malformed statement: {0}")]
    Malformed(String),

    /// Payload carries a version this build does not understand.
    #[error("unsupported payload version: {0}")]
    UnsupportedVersion(u8),

    /// Statement signature does not verify against its creator key.
    #[error("invalid statement signature")]
    SignatureInvalid,

    /// Two different statements claim the same `(edge, clock)` slot.
    #[error("clock race detected on edge {edge} at clock {clock}")]
    ClockRaceDetected {
        /// Display form of the offending edge.
        edge: String,
        /// The contested clock value.
        clock: u64,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<TypesError> for LedgerError {
    fn from(e: TypesError) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl From<fjall::Error> for LedgerError {
    fn from(e: fjall::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
