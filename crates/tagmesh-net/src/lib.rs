//! Gossip wire protocol and transport on iroh QUIC.
//!
//! - [`TagMessage`]: the versioned wire protocol (postcard-serialized,
//!   length-prefixed frames).
//! - [`Transport`] and [`PeerSampler`]: the capabilities the gossip layer
//!   consumes, so tests can substitute in-memory peers.
//! - [`TagTransport`]: an iroh [`Endpoint`] with connection pooling.
//!
//! [`Endpoint`]: iroh::Endpoint

mod error;
mod message;
mod peers;
mod transport;

pub use error::NetError;
pub use message::{EdgeClock, MAX_MESSAGE_SIZE, MessageBody, TagMessage};
pub use peers::PeerSet;
pub use transport::{TagTransport, peer_id_of};

use tagmesh_types::PeerId;

/// ALPN protocol identifier of the tagmesh gossip protocol.
pub const TAGMESH_ALPN: &[u8] = b"tagmesh/1";

/// Point-to-point delivery of protocol messages to a named peer.
///
/// This allows substituting a mock transport in tests (avoiding the need
/// for real iroh QUIC endpoints and network access).
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the peer's response.
    async fn request(&self, peer: PeerId, msg: &TagMessage) -> Result<TagMessage, NetError>;

    /// Send a message without waiting for a response.
    async fn send_to(&self, peer: PeerId, msg: &TagMessage) -> Result<(), NetError>;
}

/// Best-effort selection of gossip partners.
pub trait PeerSampler: Send + Sync {
    /// Up to `n` distinct random peers, none of them in `exclude`.
    fn sample(&self, n: usize, exclude: &[PeerId]) -> Vec<PeerId>;
}
