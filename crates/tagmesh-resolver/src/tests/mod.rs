//! Tests for the resolver crate.


use ed25519_dalek::SigningKey;
use tagmesh_ledger::Statement;
use tagmesh_types::{AuthorId, Operation, Predicate, Subject};

fn test_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn test_author(seed: u8) -> AuthorId {
    AuthorId::from(test_key(seed).verifying_key().to_bytes())
}

fn test_subject(n: u8) -> Subject {
    Subject::from([n; 20])
}

/// Statement by author `seed` on subject 1.
fn stmt(seed: u8, object: &str, operation: Operation, clock: u64) -> Statement {
    Statement::new_signed(
        test_subject(1),
        Predicate::Tag,
        object,
        operation,
        clock,
        &test_key(seed),
    )
}
