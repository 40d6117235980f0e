//! Conflict resolution for the tagmesh ledger.
//!
//! Reduces the multi-author, multi-clock history of a subject into the
//! set of tags currently visible on it. Per edge, the statement with the
//! highest clock wins; a tag is visible when enough authors admitted by
//! the [`VisibilityPolicy`] have an active ADD on it. The reduction is a
//! pure function of the ledger slice, memoized in an [`AggregateCache`]
//! that is invalidated whenever the subject receives a statement.

mod aggregate;
mod cache;
mod error;
mod policy;
mod resolver;

#[cfg(test)]
mod tests;

pub use aggregate::{Aggregate, TagScore};
pub use cache::AggregateCache;
pub use error::ResolveError;
pub use policy::{OpenPolicy, ThresholdPolicy, VisibilityPolicy};
pub use resolver::{DEFAULT_CACHE_ENTRIES, Resolver};
