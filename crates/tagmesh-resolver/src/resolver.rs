//! Ledger-backed aggregate reads with memoization.

use std::sync::Arc;

use tagmesh_ledger::{Ledger, Statement};
use tagmesh_types::{Predicate, Subject};
use tracing::debug;

use crate::aggregate::Aggregate;
use crate::cache::AggregateCache;
use crate::error::ResolveError;
use crate::policy::{OpenPolicy, VisibilityPolicy};

type Result<T> = std::result::Result<T, ResolveError>;

/// Default number of cached aggregates.
pub const DEFAULT_CACHE_ENTRIES: usize = 1024;

/// Computes aggregate views from the ledger under a visibility policy.
pub struct Resolver {
    ledger: Arc<Ledger>,
    policy: Arc<dyn VisibilityPolicy>,
    cache: AggregateCache,
}

impl Resolver {
    /// Resolver with the open policy and the default cache size.
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self::with_policy(ledger, Arc::new(OpenPolicy), DEFAULT_CACHE_ENTRIES)
    }

    /// Resolver with a custom policy and cache size.
    pub fn with_policy(
        ledger: Arc<Ledger>,
        policy: Arc<dyn VisibilityPolicy>,
        cache_entries: usize,
    ) -> Self {
        Self {
            ledger,
            policy,
            cache: AggregateCache::new(cache_entries),
        }
    }

    /// Current aggregate of `(subject, predicate)`.
    pub fn aggregate(&self, subject: &Subject, predicate: Predicate) -> Result<Arc<Aggregate>> {
        if let Some(hit) = self.cache.get(subject, predicate) {
            return Ok(hit);
        }

        let generation = self.cache.generation();
        let statements = self.ledger.statements_for_subject(subject, predicate)?;
        let aggregate = Arc::new(Aggregate::compute(
            *subject,
            predicate,
            &statements,
            self.policy.as_ref(),
        )?);
        debug!(
            %subject,
            statements = statements.len(),
            tags = aggregate.len(),
            "computed aggregate"
        );
        self.cache.put(generation, aggregate.clone());
        Ok(aggregate)
    }

    /// Ranked visible tags of `(subject, predicate)`.
    pub fn suggestions(&self, subject: &Subject, predicate: Predicate) -> Result<Vec<String>> {
        Ok(self.aggregate(subject, predicate)?.suggestions())
    }

    /// Full statement history of `(subject, predicate)`, grouped by edge.
    pub fn history(&self, subject: &Subject, predicate: Predicate) -> Result<Vec<Statement>> {
        Ok(self.ledger.statements_for_subject(subject, predicate)?)
    }

    /// Forget cached views of `subject` after it received a statement.
    pub fn invalidate(&self, subject: &Subject) {
        self.cache.invalidate(subject);
    }

    /// The ledger this resolver reads.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Cached aggregate count.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
