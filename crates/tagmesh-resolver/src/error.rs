//! Error types for the resolver crate.

use tagmesh_ledger::LedgerError;

/// Errors that can occur while computing an aggregate view.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Two different statements share one `(edge, clock)` slot.
    #[error("ledger integrity violation on edge {edge} at clock {clock}")]
    IntegrityViolation {
        /// Display form of the offending edge.
        edge: String,
        /// The clock both statements claim.
        clock: u64,
    },

    /// Reading the statement slice failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
