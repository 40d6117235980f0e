//! Error types for the engine crate.

use tagmesh_ledger::LedgerError;
use tagmesh_resolver::ResolveError;
use tagmesh_types::TypesError;

/// Errors returned by [`TagNode`](crate::TagNode) operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Subject or tag rejected at the boundary; nothing was written.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Aggregate computation error.
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),
}

impl From<TypesError> for EngineError {
    fn from(e: TypesError) -> Self {
        Self::Malformed(e.to_string())
    }
}
