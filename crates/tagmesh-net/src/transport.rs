//! Network transport built on iroh QUIC.
//!
//! [`TagTransport`] wraps an iroh [`Endpoint`] and provides:
//! - Connection pooling (reuse connections to the same peer).
//! - An address book from [`PeerId`] to dialable [`EndpointAddr`].
//! - Request/response over bi-streams and one-way sends over uni-streams,
//!   both carrying length-prefixed [`TagMessage`] frames.

use std::collections::HashMap;
use std::sync::Arc;

use iroh::endpoint::{Connection, RecvStream, SendStream};
use iroh::{Endpoint, EndpointAddr, SecretKey};
use tagmesh_types::PeerId;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::TAGMESH_ALPN;
use crate::error::NetError;
use crate::message::{MessageBody, TagMessage};

/// Transport identity of a connected endpoint as a [`PeerId`].
pub fn peer_id_of(id: &iroh::EndpointId) -> PeerId {
    PeerId::from(*id.as_bytes())
}

/// Network transport for peer-to-peer gossip.
pub struct TagTransport {
    endpoint: Endpoint,
    /// Cached connections to remote peers.
    ///
    /// `Mutex` so concurrent callers never dial the same peer twice.
    connections: Arc<Mutex<HashMap<iroh::EndpointId, Connection>>>,
    /// Known direct addresses. Peers missing here are dialed by id only.
    addresses: Arc<RwLock<HashMap<PeerId, EndpointAddr>>>,
    alpn: Vec<u8>,
}

impl TagTransport {
    /// Bind a new endpoint speaking [`TAGMESH_ALPN`].
    ///
    /// Use [`iroh::RelayMode::Disabled`] for tests that don't need relay servers.
    pub async fn bind(secret_key: SecretKey, relay_mode: iroh::RelayMode) -> Result<Self, NetError> {
        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![TAGMESH_ALPN.to_vec()])
            .relay_mode(relay_mode)
            .bind()
            .await
            .map_err(|e| NetError::Endpoint(e.to_string()))?;
        Ok(Self::from_endpoint(endpoint))
    }

    /// Create a transport for outgoing traffic on an existing endpoint.
    ///
    /// Use this when the endpoint is shared with an iroh [`Router`] that
    /// handles incoming connections.
    ///
    /// [`Router`]: iroh::protocol::Router
    pub fn from_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connections: Arc::new(Mutex::new(HashMap::new())),
            addresses: Arc::new(RwLock::new(HashMap::new())),
            alpn: TAGMESH_ALPN.to_vec(),
        }
    }

    /// Return a reference to the underlying iroh endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Return the [`EndpointAddr`] of this transport (ID + addresses).
    pub fn addr(&self) -> EndpointAddr {
        self.endpoint.addr()
    }

    /// This endpoint's identity as a gossip peer.
    pub fn peer_id(&self) -> PeerId {
        peer_id_of(&self.endpoint.id())
    }

    /// Remember how to reach a peer. Returns its [`PeerId`].
    pub async fn add_peer_addr(&self, addr: EndpointAddr) -> PeerId {
        let peer = peer_id_of(&addr.id);
        self.addresses.write().await.insert(peer, addr);
        peer
    }

    async fn resolve(&self, peer: PeerId) -> Result<EndpointAddr, NetError> {
        if let Some(addr) = self.addresses.read().await.get(&peer) {
            return Ok(addr.clone());
        }
        let id = iroh::EndpointId::from_bytes(peer.as_bytes())
            .map_err(|_| NetError::InvalidPeer(peer))?;
        Ok(EndpointAddr::new(id))
    }

    // -------------------------------------------------------------------
    // Connection management
    // -------------------------------------------------------------------

    /// Get or establish a QUIC connection to a remote peer.
    async fn get_connection(&self, peer: PeerId) -> Result<Connection, NetError> {
        let addr = self.resolve(peer).await?;
        let remote_id = addr.id;
        let mut cache = self.connections.lock().await;

        if let Some(conn) = cache.get(&remote_id)
            && conn.close_reason().is_none()
        {
            return Ok(conn.clone());
        }

        debug!(remote = %remote_id.fmt_short(), "connecting to peer");
        let conn = self
            .endpoint
            .connect(addr, &self.alpn)
            .await
            .map_err(|e| NetError::Connect(e.to_string()))?;

        cache.insert(remote_id, conn.clone());
        Ok(conn)
    }

    /// Remove a cached connection (e.g. after detecting it's dead).
    pub async fn remove_connection(&self, peer: &PeerId) {
        if let Ok(id) = iroh::EndpointId::from_bytes(peer.as_bytes()) {
            self.connections.lock().await.remove(&id);
        }
    }

    // -------------------------------------------------------------------
    // High-level messaging
    // -------------------------------------------------------------------

    /// Send a one-way message on a new uni-directional stream.
    pub async fn send_to(&self, peer: PeerId, msg: &TagMessage) -> Result<(), NetError> {
        let conn = self.get_connection(peer).await?;
        Self::send_message(&conn, msg).await
    }

    /// Send a request on a new bi-directional stream and wait for the reply.
    pub async fn request(&self, peer: PeerId, msg: &TagMessage) -> Result<TagMessage, NetError> {
        let conn = self.get_connection(peer).await?;

        let (mut send, mut recv) = match conn.open_bi().await {
            Ok(streams) => streams,
            Err(e) => {
                self.remove_connection(&peer).await;
                return Err(NetError::StreamOpen(e.to_string()));
            }
        };

        Self::send_on_stream(&mut send, msg).await?;
        let response = Self::recv_message(&mut recv).await?;
        debug!(%peer, request = msg.kind(), response = response.kind(), "request completed");
        Ok(response)
    }

    // -------------------------------------------------------------------
    // Low-level message send/receive
    // -------------------------------------------------------------------

    /// Send a message over a new uni-directional stream on the given connection.
    pub async fn send_message(conn: &Connection, message: &TagMessage) -> Result<(), NetError> {
        let frame = message.encode_frame()?;

        let mut send = conn
            .open_uni()
            .await
            .map_err(|e| NetError::StreamOpen(e.to_string()))?;

        send.write_all(&frame).await?;
        send.finish()?;

        Ok(())
    }

    /// Send a message on an already-open send stream and finish it.
    pub async fn send_on_stream(send: &mut SendStream, message: &TagMessage) -> Result<(), NetError> {
        let frame = message.encode_frame()?;
        send.write_all(&frame).await?;
        send.finish()?;
        Ok(())
    }

    /// Receive one length-prefixed message from a stream.
    pub async fn recv_message(recv: &mut RecvStream) -> Result<TagMessage, NetError> {
        let mut len_buf = [0u8; 4];
        recv.read_exact(&mut len_buf).await?;
        let len = TagMessage::frame_len(len_buf)?;

        let payload = recv.read_to_end(len).await?;
        TagMessage::decode_payload(&payload)
    }

    // -------------------------------------------------------------------
    // Incoming message handling
    // -------------------------------------------------------------------

    /// Accept incoming uni-directional streams on a connection and hand
    /// each message, with the sender's id, to `handler`.
    ///
    /// This runs until the connection is closed.
    pub async fn handle_connection<F, Fut>(conn: Connection, handler: F)
    where
        F: Fn(PeerId, TagMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let remote = peer_id_of(&conn.remote_id());
        loop {
            match conn.accept_uni().await {
                Ok(mut recv) => match Self::recv_message(&mut recv).await {
                    Ok(msg) => handler(remote, msg).await,
                    Err(e) => {
                        warn!(%remote, "failed to decode message: {e}");
                    }
                },
                Err(e) => {
                    debug!(%remote, "connection closed: {e}");
                    break;
                }
            }
        }
    }

    /// Accept incoming bi-directional streams on a connection. Each request
    /// is answered with whatever `handler` returns, on the same stream.
    pub async fn handle_bi_streams<F, Fut>(conn: Connection, handler: F)
    where
        F: Fn(PeerId, TagMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Option<TagMessage>> + Send,
    {
        let remote = peer_id_of(&conn.remote_id());
        loop {
            match conn.accept_bi().await {
                Ok((mut send, mut recv)) => match Self::recv_message(&mut recv).await {
                    Ok(request) => {
                        if let Some(response) = handler(remote, request).await
                            && let Err(e) = Self::send_on_stream(&mut send, &response).await
                        {
                            warn!(%remote, "failed to send response: {e}");
                        }
                    }
                    Err(e @ NetError::VersionMismatch { .. }) => {
                        warn!(%remote, "refusing request: {e}");
                        let refusal = TagMessage::new(MessageBody::Refused {
                            reason: e.to_string(),
                        });
                        if let Err(e) = Self::send_on_stream(&mut send, &refusal).await {
                            debug!(%remote, "failed to send refusal: {e}");
                        }
                    }
                    Err(e) => {
                        warn!(%remote, "failed to decode bi-stream request: {e}");
                    }
                },
                Err(e) => {
                    debug!(%remote, "connection closed (bi): {e}");
                    break;
                }
            }
        }
    }

    /// Gracefully close the transport.
    pub async fn close(&self) {
        self.endpoint.close().await;
    }
}

#[async_trait::async_trait]
impl crate::Transport for TagTransport {
    async fn request(&self, peer: PeerId, msg: &TagMessage) -> Result<TagMessage, NetError> {
        self.request(peer, msg).await
    }

    async fn send_to(&self, peer: PeerId, msg: &TagMessage) -> Result<(), NetError> {
        self.send_to(peer, msg).await
    }
}
