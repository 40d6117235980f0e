//! Error types for parsing and validating tagmesh identifiers.

/// Errors produced when parsing identifiers or validating tag values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    /// Input has the wrong length (bytes, or hex characters for hex input).
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Observed length.
        actual: usize,
    },

    /// Input is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Predicate wire value is not a known enumerator.
    #[error("unknown predicate: {0}")]
    UnknownPredicate(u8),

    /// Operation wire value is not a known enumerator.
    #[error("unknown operation: {0}")]
    UnknownOperation(u8),

    /// Tag length (in characters) is outside the accepted bounds.
    #[error("invalid tag length: {0}")]
    TagLength(usize),
}
