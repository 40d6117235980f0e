//! Tests for the gossip crate.
//!
//! Nodes are wired through [`MeshTransport`], which hands every message
//! (after a round trip through the wire codec) straight to the target
//! node's [`Synchronizer::handle_message`].


use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use tagmesh_ledger::{Ledger, LedgerStore, Statement};
use tagmesh_net::{NetError, PeerSet, TagMessage, Transport};
use tagmesh_resolver::Resolver;
use tagmesh_types::{Operation, PeerId, Predicate, Subject};

use crate::config::GossipConfig;
use crate::sync::Synchronizer;

/// In-process network of synchronizers.
#[derive(Default)]
struct Mesh {
    nodes: RwLock<HashMap<PeerId, Arc<Synchronizer>>>,
    down: RwLock<HashSet<PeerId>>,
}

impl Mesh {
    fn target(&self, peer: PeerId) -> Result<Arc<Synchronizer>, NetError> {
        if self.down.read().unwrap().contains(&peer) {
            return Err(NetError::Endpoint("peer is down".into()));
        }
        self.nodes
            .read()
            .unwrap()
            .get(&peer)
            .cloned()
            .ok_or_else(|| NetError::Connect(format!("unknown peer {peer}")))
    }

    fn set_down(&self, peer: PeerId) {
        self.down.write().unwrap().insert(peer);
    }
}

/// One node's view of the mesh.
struct MeshTransport {
    me: PeerId,
    mesh: Arc<Mesh>,
}

fn over_the_wire(msg: &TagMessage) -> Result<TagMessage, NetError> {
    TagMessage::decode_frame(&msg.encode_frame()?)
}

#[async_trait]
impl Transport for MeshTransport {
    async fn request(&self, peer: PeerId, msg: &TagMessage) -> Result<TagMessage, NetError> {
        let node = self.mesh.target(peer)?;
        let reply = node
            .handle_message(self.me, over_the_wire(msg)?)
            .await
            .ok_or_else(|| NetError::Connect("no response".into()))?;
        over_the_wire(&reply)
    }

    async fn send_to(&self, peer: PeerId, msg: &TagMessage) -> Result<(), NetError> {
        let node = self.mesh.target(peer)?;
        node.handle_message(self.me, over_the_wire(msg)?).await;
        Ok(())
    }
}

struct TestNode {
    id: PeerId,
    sync: Arc<Synchronizer>,
    resolver: Arc<Resolver>,
    peers: Arc<PeerSet>,
}

impl TestNode {
    fn ledger(&self) -> &Ledger {
        self.resolver.ledger()
    }

    fn suggestions(&self, subject: u8) -> Vec<String> {
        self.resolver
            .suggestions(&test_subject(subject), Predicate::Tag)
            .unwrap()
    }
}

fn add_node(mesh: &Arc<Mesh>, n: u8, config: GossipConfig) -> TestNode {
    let transport = Arc::new(MeshTransport {
        me: PeerId::from([n; 32]),
        mesh: mesh.clone(),
    });
    add_node_with_transport(mesh, n, config, transport)
}

/// Register a node reachable through the mesh that sends through
/// `transport`.
fn add_node_with_transport(
    mesh: &Arc<Mesh>,
    n: u8,
    config: GossipConfig,
    transport: Arc<dyn Transport>,
) -> TestNode {
    let id = PeerId::from([n; 32]);
    let ledger = Arc::new(Ledger::new(LedgerStore::in_memory()));
    let resolver = Arc::new(Resolver::new(ledger));
    let peers = Arc::new(PeerSet::new());
    let sync = Arc::new(Synchronizer::new(
        resolver.clone(),
        transport,
        peers.clone(),
        config,
    ));
    mesh.nodes.write().unwrap().insert(id, sync.clone());
    TestNode {
        id,
        sync,
        resolver,
        peers,
    }
}

/// Make every node a gossip partner of every other node.
fn connect(nodes: &[&TestNode]) {
    for a in nodes {
        for b in nodes {
            if a.id != b.id {
                a.peers.insert(b.id);
            }
        }
    }
}

fn test_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn test_subject(n: u8) -> Subject {
    Subject::from([n; 20])
}

fn stmt(author: u8, subject: u8, object: &str, operation: Operation, clock: u64) -> Statement {
    Statement::new_signed(
        test_subject(subject),
        Predicate::Tag,
        object,
        operation,
        clock,
        &test_key(author),
    )
}
