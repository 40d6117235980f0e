//! Shared test harness for tagmesh integration tests.
//!
//! Provides [`TagCluster`]: N full nodes (ledger, resolver, synchronizer
//! and [`TagNode`]) wired through an in-memory transport with failure
//! injection. Every message crosses the real wire codec.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use tagmesh_engine::TagNode;
use tagmesh_gossip::{GossipConfig, Synchronizer};
use tagmesh_ledger::{Ledger, LedgerStore, Statement};
use tagmesh_net::{NetError, PeerSet, TagMessage, Transport};
use tagmesh_resolver::Resolver;
use tagmesh_types::{Operation, PeerId, Predicate, Subject};
use tokio::sync::RwLock;

// =========================================================================
// Mock transport
// =========================================================================

/// Routing table shared by every node's transport.
#[derive(Default)]
struct Network {
    nodes: StdRwLock<HashMap<PeerId, Arc<Synchronizer>>>,
    down_nodes: RwLock<HashSet<PeerId>>,
    /// Directed links that drop every message.
    cut_links: RwLock<HashSet<(PeerId, PeerId)>>,
}

impl Network {
    async fn route(&self, from: PeerId, to: PeerId) -> Result<Arc<Synchronizer>, NetError> {
        if self.down_nodes.read().await.contains(&to) {
            return Err(NetError::Endpoint("node is down".into()));
        }
        if self.cut_links.read().await.contains(&(from, to)) {
            return Err(NetError::Connect("link is partitioned".into()));
        }
        self.nodes
            .read()
            .expect("network lock poisoned")
            .get(&to)
            .cloned()
            .ok_or_else(|| NetError::Connect(format!("unknown peer {to}")))
    }
}

/// Mock transport that hands frames straight to the target synchronizer.
///
/// Supports failure injection: down nodes and cut links are unreachable.
struct MockTransport {
    me: PeerId,
    network: Arc<Network>,
}

fn over_the_wire(msg: &TagMessage) -> Result<TagMessage, NetError> {
    TagMessage::decode_frame(&msg.encode_frame()?)
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, peer: PeerId, msg: &TagMessage) -> Result<TagMessage, NetError> {
        let target = self.network.route(self.me, peer).await?;
        let reply = target
            .handle_message(self.me, over_the_wire(msg)?)
            .await
            .ok_or_else(|| NetError::Connect("no response".into()))?;
        over_the_wire(&reply)
    }

    async fn send_to(&self, peer: PeerId, msg: &TagMessage) -> Result<(), NetError> {
        let target = self.network.route(self.me, peer).await?;
        target.handle_message(self.me, over_the_wire(msg)?).await;
        Ok(())
    }
}

// =========================================================================
// TagCluster
// =========================================================================

/// A simulated N-node tagmesh network.
pub struct TagCluster {
    nodes: Vec<TagNode>,
    syncs: Vec<Arc<Synchronizer>>,
    peer_sets: Vec<Arc<PeerSet>>,
    peer_ids: Vec<PeerId>,
    network: Arc<Network>,
}

impl TagCluster {
    /// Create an N-node cluster where every node gossips with every other.
    pub fn new(n: usize) -> Self {
        Self::with_config(n, GossipConfig::default())
    }

    /// Create a fully connected N-node cluster with custom gossip settings.
    pub fn with_config(n: usize, config: GossipConfig) -> Self {
        let cluster = Self::unconnected(n, config);
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    cluster.link(i, j);
                }
            }
        }
        cluster
    }

    /// Create a line `0 - 1 - ... - n-1`: each node only knows its
    /// neighbours, so statements have to be relayed.
    pub fn line(n: usize) -> Self {
        let config = GossipConfig {
            forward_fanout: 0,
            ..GossipConfig::default()
        };
        let cluster = Self::unconnected(n, config);
        for i in 1..n {
            cluster.link(i - 1, i);
            cluster.link(i, i - 1);
        }
        cluster
    }

    fn unconnected(n: usize, config: GossipConfig) -> Self {
        assert!(n < u8::MAX as usize, "too many nodes");
        let network = Arc::new(Network::default());
        let mut cluster = Self {
            nodes: Vec::with_capacity(n),
            syncs: Vec::with_capacity(n),
            peer_sets: Vec::with_capacity(n),
            peer_ids: Vec::with_capacity(n),
            network,
        };

        for i in 0..n {
            let id = PeerId::from([i as u8 + 1; 32]);
            let ledger = Arc::new(Ledger::new(LedgerStore::in_memory()));
            let resolver = Arc::new(Resolver::new(ledger));
            let peers = Arc::new(PeerSet::new());
            let transport = Arc::new(MockTransport {
                me: id,
                network: cluster.network.clone(),
            });
            let sync = Arc::new(Synchronizer::new(
                resolver.clone(),
                transport,
                peers.clone(),
                config.clone(),
            ));
            cluster
                .network
                .nodes
                .write()
                .expect("network lock poisoned")
                .insert(id, sync.clone());

            cluster
                .nodes
                .push(TagNode::new(resolver).with_synchronizer(sync.clone()));
            cluster.syncs.push(sync);
            cluster.peer_sets.push(peers);
            cluster.peer_ids.push(id);
        }
        cluster
    }

    /// Make node `j` a gossip partner of node `i`.
    fn link(&self, i: usize, j: usize) {
        self.peer_sets[i].insert(self.peer_ids[j]);
    }

    /// Get a reference to a node by index.
    pub fn node(&self, i: usize) -> &TagNode {
        &self.nodes[i]
    }

    /// Get a node's synchronizer by index.
    pub fn sync(&self, i: usize) -> &Arc<Synchronizer> {
        &self.syncs[i]
    }

    /// Get a node's network identity by index.
    pub fn peer_id(&self, i: usize) -> PeerId {
        self.peer_ids[i]
    }

    /// Number of nodes in the cluster.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the cluster has zero nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Mark a node as down: it stops gossiping and cannot be reached.
    pub async fn kill_node(&self, i: usize) {
        self.network.down_nodes.write().await.insert(self.peer_ids[i]);
    }

    /// Bring a killed node back. Its ledger survived.
    pub async fn revive_node(&self, i: usize) {
        self.network.down_nodes.write().await.remove(&self.peer_ids[i]);
    }

    async fn is_down(&self, i: usize) -> bool {
        self.network.down_nodes.read().await.contains(&self.peer_ids[i])
    }

    /// Cut every link between `side` and the rest of the cluster.
    pub async fn partition(&self, side: &[usize]) {
        let mut cut = self.network.cut_links.write().await;
        for &a in side {
            for b in (0..self.len()).filter(|b| !side.contains(b)) {
                cut.insert((self.peer_ids[a], self.peer_ids[b]));
                cut.insert((self.peer_ids[b], self.peer_ids[a]));
            }
        }
    }

    /// Restore every cut link.
    pub async fn heal(&self) {
        self.network.cut_links.write().await.clear();
    }

    /// Run one gossip round on every live node, then let every push it
    /// triggered land.
    pub async fn gossip_round(&self) {
        for (i, sync) in self.syncs.iter().enumerate() {
            if !self.is_down(i).await {
                sync.round().await;
            }
        }
        self.settle().await;
    }

    /// Wait until no node has a background push in flight.
    pub async fn settle(&self) {
        loop {
            let mut pending = false;
            for sync in &self.syncs {
                pending |= sync.flush().await;
            }
            if !pending {
                break;
            }
        }
    }

    /// Gossip until every node in `group` holds the same statements.
    ///
    /// Returns the number of rounds it took, or `None` if the group had
    /// not converged after `max_rounds`.
    pub async fn converge_group(&self, group: &[usize], max_rounds: usize) -> Option<usize> {
        self.settle().await;
        for round in 0..=max_rounds {
            if self.group_converged(group) {
                return Some(round);
            }
            if round < max_rounds {
                self.gossip_round().await;
            }
        }
        None
    }

    /// Gossip until every node holds the same statements.
    pub async fn converge(&self, max_rounds: usize) -> Option<usize> {
        let all: Vec<usize> = (0..self.len()).collect();
        self.converge_group(&all, max_rounds).await
    }

    fn group_converged(&self, group: &[usize]) -> bool {
        let mut prints = group.iter().map(|&i| self.fingerprint(i));
        match prints.next() {
            Some(first) => prints.all(|p| p == first),
            None => true,
        }
    }

    /// Sorted canonical encodings of every statement node `i` holds.
    pub fn fingerprint(&self, i: usize) -> Vec<Vec<u8>> {
        let mut encoded: Vec<Vec<u8>> = self
            .node(i)
            .ledger()
            .statements_since(0, usize::MAX)
            .expect("ledger read")
            .into_iter()
            .map(|(_, s)| s.encode())
            .collect();
        encoded.sort();
        encoded
    }

    /// Visible tags of `infohash` on node `i`.
    pub fn suggestions(&self, i: usize, infohash: &str) -> Vec<String> {
        self.node(i)
            .get_suggestions(infohash, Predicate::Tag)
            .expect("suggestions")
    }
}

// =========================================================================
// Data helpers
// =========================================================================

/// Deterministic author key from a seed byte.
pub fn author_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Hex infohash whose 20 bytes all equal `n`.
pub fn infohash(n: u8) -> String {
    Subject::from([n; 20]).to_string()
}

/// A signed tag statement about `infohash(subject)`.
pub fn statement(
    author: u8,
    subject: u8,
    object: &str,
    operation: Operation,
    clock: u64,
) -> Statement {
    Statement::new_signed(
        Subject::from([subject; 20]),
        Predicate::Tag,
        object,
        operation,
        clock,
        &author_key(author),
    )
}
