//! Per-edge clock authority.
//!
//! Every edge owns one clock sequence. [`ClockAuthority::lock`] grants
//! exclusive access to an edge (striped: edges hashing to the same stripe
//! share a mutex), and [`ClockAuthority::next_clock`] only accepts a live
//! [`EdgeGuard`], so a clock can never be minted outside the critical
//! section that also inserts the statement.

use std::sync::{Mutex, MutexGuard};

use tagmesh_types::Edge;

use crate::error::LedgerError;
use crate::store::LedgerStore;

type Result<T> = std::result::Result<T, LedgerError>;

/// Default number of lock stripes.
pub const DEFAULT_STRIPES: usize = 256;

/// Exclusive access to one edge, released on drop.
pub struct EdgeGuard<'a> {
    key: Vec<u8>,
    _stripe: MutexGuard<'a, ()>,
}

impl EdgeGuard<'_> {
    /// Byte key of the locked edge.
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

/// Hands out exclusive edge access and mints clock values.
pub struct ClockAuthority {
    stripes: Box<[Mutex<()>]>,
}

impl ClockAuthority {
    /// Create an authority with `stripes` lock stripes (at least one).
    pub fn new(stripes: usize) -> Self {
        let stripes = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes }
    }

    /// Block until the edge is exclusively held.
    pub fn lock(&self, edge: &Edge) -> Result<EdgeGuard<'_>> {
        let key = edge.key();
        let hash = blake3::hash(&key);
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        let index = (u64::from_le_bytes(head) % self.stripes.len() as u64) as usize;

        let stripe = self.stripes[index]
            .lock()
            .map_err(|_| LedgerError::Storage("edge lock poisoned".to_string()))?;

        Ok(EdgeGuard {
            key,
            _stripe: stripe,
        })
    }

    /// Next clock for the guarded edge: one past the highest clock observed
    /// (locally created or received), or 1 for an unseen edge.
    pub fn next_clock(&self, store: &LedgerStore, guard: &EdgeGuard<'_>) -> Result<u64> {
        match store.max_clock(guard.key())? {
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| LedgerError::Malformed("edge clock exhausted".to_string())),
            None => Ok(1),
        }
    }
}

impl Default for ClockAuthority {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}
