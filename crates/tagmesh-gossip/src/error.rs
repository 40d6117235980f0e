//! Error types for the gossip crate.

use tagmesh_ledger::LedgerError;
use tagmesh_net::NetError;
use tagmesh_types::PeerId;

/// Errors that can end a gossip exchange.
///
/// None of them mark the peer as faulty: the exchange is simply retried on
/// a later round.
#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    /// A network step did not complete within the configured timeout.
    #[error("peer {peer} timed out during {step}")]
    PeerTimeout {
        /// The unresponsive peer.
        peer: PeerId,
        /// The exchange step that timed out.
        step: &'static str,
    },

    /// Transport failure.
    #[error("network error: {0}")]
    Net(NetError),

    /// Local ledger failure (storage).
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The peer answered with an unexpected or refusing message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer speaks another protocol version.
    #[error("protocol version mismatch: ours {ours}, theirs {theirs}")]
    VersionMismatch {
        /// Version this build speaks.
        ours: u16,
        /// Version the peer speaks.
        theirs: u16,
    },
}

impl From<NetError> for GossipError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::VersionMismatch { ours, theirs } => Self::VersionMismatch { ours, theirs },
            other => Self::Net(other),
        }
    }
}
