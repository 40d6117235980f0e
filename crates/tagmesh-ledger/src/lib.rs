//! Signed statement ledger with per-edge logical clocks.
//!
//! A [`Statement`] records one author's ADD or REMOVE of a tag on a subject.
//! Statements are encoded canonically, ed25519-signed by their author, and
//! stored append-only in a [`Ledger`] keyed by `(edge, clock)`: a replayed
//! statement is a no-op and a conflicting one is an integrity fault.
//!
//! Local edits get their clock from the [`ClockAuthority`] inside the same
//! per-edge critical section that stores them, so one edge never receives
//! the same clock twice.

pub mod clock;
mod error;
mod ledger;
mod statement;
mod store;

#[cfg(test)]
mod tests;

pub use clock::{ClockAuthority, EdgeGuard};
pub use error::LedgerError;
pub use ledger::{InsertOutcome, Ledger};
pub use statement::{SIGNATURE_LEN, Statement, StatementContent};
pub use store::LedgerStore;
