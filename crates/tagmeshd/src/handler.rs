//! Incoming protocol handler for the tagmesh daemon.
//!
//! Implements iroh's [`ProtocolHandler`] trait so the [`Router`] hands
//! every `tagmesh/1` connection to the gossip synchronizer.
//!
//! [`ProtocolHandler`]: iroh::protocol::ProtocolHandler
//! [`Router`]: iroh::protocol::Router

use std::fmt;
use std::sync::Arc;

use iroh::EndpointAddr;
use iroh::endpoint::Connection;
use iroh::protocol::AcceptError;
use tagmesh_gossip::Synchronizer;
use tagmesh_net::{PeerSet, TagTransport, peer_id_of};
use tracing::{debug, info};

/// Dispatches incoming tagmesh connections to the [`Synchronizer`].
///
/// Peers that connect to us become gossip partners themselves.
pub struct TagProtocol {
    sync: Arc<Synchronizer>,
    peers: Arc<PeerSet>,
    transport: Arc<TagTransport>,
}

impl fmt::Debug for TagProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagProtocol").finish_non_exhaustive()
    }
}

impl TagProtocol {
    /// Create a new protocol handler.
    pub fn new(sync: Arc<Synchronizer>, peers: Arc<PeerSet>, transport: Arc<TagTransport>) -> Self {
        Self {
            sync,
            peers,
            transport,
        }
    }
}

impl iroh::protocol::ProtocolHandler for TagProtocol {
    async fn accept(&self, conn: Connection) -> Result<(), AcceptError> {
        let remote_id = conn.remote_id();
        let peer = peer_id_of(&remote_id);
        // Bootstrap peers already have a better address on file.
        if self.peers.insert(peer) {
            self.transport
                .add_peer_addr(EndpointAddr::new(remote_id))
                .await;
            info!(%peer, "new gossip peer");
        }

        // One-way pushes.
        let sync_uni = self.sync.clone();
        let conn_uni = conn.clone();
        tokio::spawn(async move {
            TagTransport::handle_connection(conn_uni, move |from, msg| {
                let sync = sync_uni.clone();
                async move {
                    if let Some(reply) = sync.handle_message(from, msg).await {
                        debug!(%from, kind = reply.kind(), "dropping reply to one-way message");
                    }
                }
            })
            .await;
        });

        // Announce, deliver and pull exchanges.
        let sync_bi = self.sync.clone();
        tokio::spawn(async move {
            TagTransport::handle_bi_streams(conn, move |from, msg| {
                let sync = sync_bi.clone();
                async move { sync.handle_message(from, msg).await }
            })
            .await;
        });

        Ok(())
    }
}
