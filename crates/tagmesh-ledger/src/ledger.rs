//! Core ledger: validated, deduplicated, append-only statement set.

use ed25519_dalek::SigningKey;
use tagmesh_types::{Edge, Operation, Predicate, Subject, subject_prefix, validate_tag};
use tracing::{debug, error};

use crate::clock::{ClockAuthority, EdgeGuard};
use crate::error::LedgerError;
use crate::statement::Statement;
use crate::store::LedgerStore;

type Result<T> = std::result::Result<T, LedgerError>;

/// Result of offering a statement to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored under the given arrival sequence number.
    Inserted {
        /// Arrival sequence assigned by the store.
        seq: u64,
    },
    /// The identical statement was already stored; nothing changed.
    DuplicateIgnored,
}

impl InsertOutcome {
    /// Whether the statement was newly stored.
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted { .. })
    }
}

/// Append-only set of signed statements keyed by `(edge, clock)`.
///
/// This is the only shared mutable state of a node. Every write goes
/// through an [`EdgeGuard`], so the clock read, the duplicate check and
/// the insert for one edge never interleave with another writer on the
/// same edge, while different edges proceed independently.
pub struct Ledger {
    store: LedgerStore,
    clocks: ClockAuthority,
}

impl Ledger {
    /// Create a ledger over the given store.
    pub fn new(store: LedgerStore) -> Self {
        Self {
            store,
            clocks: ClockAuthority::default(),
        }
    }

    /// Create, clock, sign and store a local edit in one critical section.
    ///
    /// The tag is validated before anything is built, so a rejected edit
    /// leaves the ledger untouched.
    pub fn append_local(
        &self,
        subject: Subject,
        predicate: Predicate,
        object: &str,
        operation: Operation,
        signing_key: &SigningKey,
    ) -> Result<Statement> {
        validate_tag(object)?;
        let author = signing_key.verifying_key().to_bytes().into();
        let edge = Edge::new(author, subject, predicate, object);

        let guard = self.clocks.lock(&edge)?;
        let clock = self.clocks.next_clock(&self.store, &guard)?;
        let statement =
            Statement::new_signed(subject, predicate, object, operation, clock, signing_key);
        let seq = self.store.put(guard.key(), &statement)?;
        drop(guard);

        debug!(
            %subject,
            object,
            %operation,
            clock,
            seq,
            "appended local statement"
        );
        Ok(statement)
    }

    /// Validate and store a statement from any origin.
    ///
    /// Returns [`InsertOutcome::DuplicateIgnored`] when the identical
    /// statement is already present. A different statement at an occupied
    /// `(edge, clock)` is a ledger-integrity fault: it is logged, discarded
    /// and reported as [`LedgerError::ClockRaceDetected`].
    pub fn insert(&self, statement: &Statement) -> Result<InsertOutcome> {
        statement.validate()?;

        let edge = statement.edge();
        let guard = self.clocks.lock(&edge)?;
        self.insert_locked(&guard, &edge, statement)
    }

    fn insert_locked(
        &self,
        guard: &EdgeGuard<'_>,
        edge: &Edge,
        statement: &Statement,
    ) -> Result<InsertOutcome> {
        if let Some(existing) = self.store.get_raw(guard.key(), statement.clock)? {
            if existing == statement.encode() {
                debug!(%edge, clock = statement.clock, "duplicate statement ignored");
                return Ok(InsertOutcome::DuplicateIgnored);
            }
            error!(
                %edge,
                clock = statement.clock,
                "clock race: conflicting statement for an occupied (edge, clock), discarding"
            );
            return Err(LedgerError::ClockRaceDetected {
                edge: edge.to_string(),
                clock: statement.clock,
            });
        }

        let seq = self.store.put(guard.key(), statement)?;
        debug!(%edge, clock = statement.clock, seq, "inserted statement");
        Ok(InsertOutcome::Inserted { seq })
    }

    /// Highest clock stored for an edge.
    pub fn max_clock(&self, edge: &Edge) -> Result<Option<u64>> {
        self.store.max_clock(&edge.key())
    }

    /// Canonical encoding of the statement stored at `(edge, clock)`.
    pub fn encoded(&self, edge: &Edge, clock: u64) -> Result<Option<Vec<u8>>> {
        self.store.get_raw(&edge.key(), clock)
    }

    /// Every statement about `(subject, predicate)`, across all authors and
    /// clocks, grouped by edge and ordered by clock within an edge.
    pub fn statements_for_subject(
        &self,
        subject: &Subject,
        predicate: Predicate,
    ) -> Result<Vec<Statement>> {
        self.store.scan_prefix(&subject_prefix(subject, predicate))
    }

    /// Up to `limit` statements that arrived after the `watermark` sequence.
    pub fn statements_since(&self, watermark: u64, limit: usize) -> Result<Vec<(u64, Statement)>> {
        self.store.since(watermark, limit)
    }

    /// The `limit` most recently arrived statements, oldest first.
    pub fn latest(&self, limit: usize) -> Result<Vec<Statement>> {
        let from = self.store.last_seq().saturating_sub(limit as u64);
        Ok(self
            .store
            .since(from, limit)?
            .into_iter()
            .map(|(_, s)| s)
            .collect())
    }

    /// Arrival sequence of the newest statement (0 when empty).
    pub fn last_seq(&self) -> u64 {
        self.store.last_seq()
    }

    /// Number of stored statements.
    pub fn len(&self) -> Result<usize> {
        self.store.len()
    }

    /// Whether the ledger holds no statements.
    pub fn is_empty(&self) -> Result<bool> {
        self.store.is_empty()
    }
}
