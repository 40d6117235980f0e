//! Tests for the ledger crate.


use ed25519_dalek::SigningKey;
use tagmesh_types::{AuthorId, Subject};

use crate::ledger::Ledger;
use crate::store::LedgerStore;

/// Deterministic author key from a seed.
fn test_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Author id matching [`test_key`].
fn test_author(seed: u8) -> AuthorId {
    AuthorId::from(test_key(seed).verifying_key().to_bytes())
}

/// A subject filled with `n`.
fn test_subject(n: u8) -> Subject {
    Subject::from([n; 20])
}

/// Ledger over an in-memory store.
fn test_ledger() -> Ledger {
    Ledger::new(LedgerStore::in_memory())
}
