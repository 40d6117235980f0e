//! LRU cache of computed aggregates.
//!
//! Entries are whole aggregates keyed by `(subject, predicate)`. They are
//! never patched: an accepted statement drops every entry for its subject,
//! and the next read recomputes from the ledger. A generation counter
//! keeps a computation that raced with an invalidation from being stored.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tagmesh_types::{Predicate, Subject};
use tracing::debug;

use crate::aggregate::Aggregate;

type Key = (Subject, Predicate);

/// Thread-safe LRU cache for aggregate views.
pub struct AggregateCache {
    max_entries: usize,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    /// Access order: front = oldest (eviction candidate), back = newest.
    order: VecDeque<Key>,
    data: HashMap<Key, Arc<Aggregate>>,
    /// Bumped on every invalidation.
    generation: u64,
}

impl AggregateCache {
    /// Create a cache holding at most `max_entries` aggregates.
    ///
    /// A `max_entries` of 0 disables caching entirely.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(CacheInner {
                order: VecDeque::new(),
                data: HashMap::new(),
                generation: 0,
            }),
        }
    }

    /// Current invalidation generation. Read it before loading the ledger
    /// slice and hand it back to [`put`](Self::put).
    pub fn generation(&self) -> u64 {
        self.inner.lock().expect("cache lock poisoned").generation
    }

    /// Store an aggregate computed at `generation`.
    ///
    /// Dropped when an invalidation happened since `generation` was read.
    pub fn put(&self, generation: u64, aggregate: Arc<Aggregate>) {
        if self.max_entries == 0 {
            return;
        }
        let key = (aggregate.subject, aggregate.predicate);
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if inner.generation != generation {
            debug!(subject = %key.0, "discarding aggregate computed before invalidation");
            return;
        }

        if inner.data.remove(&key).is_some() {
            inner.order.retain(|k| *k != key);
        }

        while inner.data.len() >= self.max_entries {
            let Some(evict) = inner.order.pop_front() else {
                break;
            };
            inner.data.remove(&evict);
            debug!(subject = %evict.0, "evicted cached aggregate");
        }

        inner.data.insert(key, aggregate);
        inner.order.push_back(key);
    }

    /// Look up an aggregate and promote it to most-recently-used.
    pub fn get(&self, subject: &Subject, predicate: Predicate) -> Option<Arc<Aggregate>> {
        let key = (*subject, predicate);
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let aggregate = inner.data.get(&key)?.clone();

        inner.order.retain(|k| *k != key);
        inner.order.push_back(key);

        Some(aggregate)
    }

    /// Drop every cached aggregate of `subject`.
    pub fn invalidate(&self, subject: &Subject) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.generation += 1;
        inner.data.retain(|(s, _), _| s != subject);
        inner.order.retain(|(s, _)| s != subject);
    }

    /// Current number of cached aggregates.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").data.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
