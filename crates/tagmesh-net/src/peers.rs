//! A plain set of known peers that samples uniformly at random.

use std::collections::HashSet;
use std::sync::RwLock;

use rand::seq::SliceRandom;
use tagmesh_types::PeerId;

use crate::PeerSampler;

/// Known gossip partners.
#[derive(Default)]
pub struct PeerSet {
    peers: RwLock<HashSet<PeerId>>,
}

impl PeerSet {
    /// Create an empty peer set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer. Returns `false` if it was already known.
    pub fn insert(&self, peer: PeerId) -> bool {
        self.peers.write().expect("peer set lock poisoned").insert(peer)
    }

    /// Forget a peer.
    pub fn remove(&self, peer: &PeerId) -> bool {
        self.peers.write().expect("peer set lock poisoned").remove(peer)
    }

    /// Every known peer, in no particular order.
    pub fn all(&self) -> Vec<PeerId> {
        self.peers
            .read()
            .expect("peer set lock poisoned")
            .iter()
            .copied()
            .collect()
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.read().expect("peer set lock poisoned").len()
    }

    /// Whether no peer is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PeerSampler for PeerSet {
    fn sample(&self, n: usize, exclude: &[PeerId]) -> Vec<PeerId> {
        let mut candidates: Vec<PeerId> = self
            .all()
            .into_iter()
            .filter(|p| !exclude.contains(p))
            .collect();
        candidates.shuffle(&mut rand::rng());
        candidates.truncate(n);
        candidates
    }
}
