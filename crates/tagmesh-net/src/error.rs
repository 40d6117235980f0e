//! Error types for network operations.

use tagmesh_types::PeerId;

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to connect to a remote endpoint.
    #[error("connection error: {0}")]
    Connect(String),

    /// A QUIC connection error.
    #[error("connection error: {0}")]
    Connection(#[from] iroh::endpoint::ConnectionError),

    /// Failed to open a stream.
    #[error("stream open error: {0}")]
    StreamOpen(String),

    /// Error writing to a stream.
    #[error("write error: {0}")]
    Write(#[from] iroh::endpoint::WriteError),

    /// Stream was already closed when trying to finish.
    #[error("stream closed: {0}")]
    ClosedStream(#[from] iroh::endpoint::ClosedStream),

    /// Error reading from a stream.
    #[error("read error: {0}")]
    ReadToEnd(#[from] iroh::endpoint::ReadToEndError),

    /// Error reading exact bytes.
    #[error("read exact error: {0}")]
    ReadExact(#[from] iroh::endpoint::ReadExactError),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Frame announces more bytes than a message may carry.
    #[error("message too large: {len} bytes (max {max})")]
    TooLarge {
        /// Announced payload length.
        len: usize,
        /// Largest accepted payload length.
        max: usize,
    },

    /// Remote speaks a different protocol version.
    #[error("protocol version mismatch: ours {ours}, theirs {theirs}")]
    VersionMismatch {
        /// Version this build speaks.
        ours: u16,
        /// Version found in the received message.
        theirs: u16,
    },

    /// The peer id is not a valid transport identity.
    #[error("invalid peer id {0}")]
    InvalidPeer(PeerId),

    /// The remote endpoint was not found or unreachable.
    #[error("endpoint error: {0}")]
    Endpoint(String),
}
