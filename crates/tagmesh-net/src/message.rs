//! Protocol messages for the tagmesh gossip layer.
//!
//! Every message is a [`TagMessage`] envelope carrying the sender's
//! [`PROTOCOL_VERSION`], serialized with postcard and framed with a
//! 4-byte big-endian length prefix. Statements travel in their canonical
//! signed encoding so the receiver verifies exactly the bytes that were
//! signed.

use serde::{Deserialize, Serialize};
use tagmesh_types::{AuthorId, Edge, PROTOCOL_VERSION, Predicate, Subject};

use crate::error::NetError;

/// Maximum message payload size: 16 MiB.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// One summary entry: an edge and the highest clock the sender holds for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeClock {
    /// Subject of the edge.
    pub subject: Subject,
    /// Predicate of the edge.
    pub predicate: Predicate,
    /// Author of the edge.
    pub author: AuthorId,
    /// Object of the edge.
    pub object: String,
    /// Highest clock the sender holds.
    pub clock: u64,
}

impl EdgeClock {
    /// The edge this entry describes.
    pub fn edge(&self) -> Edge {
        Edge::new(self.author, self.subject, self.predicate, &self.object)
    }
}

/// Message payloads exchanged between tagmesh peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Summary of the sender's newest statements (bi-stream, expects [`Want`]).
    ///
    /// [`Want`]: MessageBody::Want
    Announce {
        /// Edge and clock of each announced statement.
        summary: Vec<EdgeClock>,
    },

    /// Announced entries the receiver does not hold yet.
    Want {
        /// Entries to deliver, copied from the announce summary.
        entries: Vec<EdgeClock>,
    },

    /// Requested statements (bi-stream, expects [`Ack`]).
    ///
    /// [`Ack`]: MessageBody::Ack
    Deliver {
        /// Canonical signed statement encodings.
        statements: Vec<Vec<u8>>,
    },

    /// Unsolicited statements forwarded to a peer (uni-stream, no response).
    Push {
        /// Canonical signed statement encodings.
        statements: Vec<Vec<u8>>,
    },

    /// Outcome of a [`Deliver`](MessageBody::Deliver).
    Ack {
        /// Newly stored statements.
        accepted: u32,
        /// Statements already held.
        duplicates: u32,
        /// Invalid, throttled or filtered statements.
        rejected: u32,
    },

    /// Ask for statements that arrived after a sequence watermark.
    Pull {
        /// Last arrival sequence already received from this peer.
        since: u64,
        /// Most statements wanted in one response.
        limit: u32,
    },

    /// Response to a [`Pull`](MessageBody::Pull).
    PullResponse {
        /// Canonical signed statement encodings, in arrival order.
        statements: Vec<Vec<u8>>,
        /// Arrival sequence of the last statement included (or `since`).
        watermark: u64,
        /// Whether more statements remain after `watermark`.
        more: bool,
    },

    /// The receiver would not process the request.
    Refused {
        /// Human readable reason.
        reason: String,
    },
}

impl MessageBody {
    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Announce { .. } => "announce",
            MessageBody::Want { .. } => "want",
            MessageBody::Deliver { .. } => "deliver",
            MessageBody::Push { .. } => "push",
            MessageBody::Ack { .. } => "ack",
            MessageBody::Pull { .. } => "pull",
            MessageBody::PullResponse { .. } => "pull_response",
            MessageBody::Refused { .. } => "refused",
        }
    }
}

/// Versioned envelope around every [`MessageBody`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMessage {
    /// Protocol version of the sender. Must be the first field.
    pub version: u16,
    /// The message itself.
    pub body: MessageBody,
}

impl TagMessage {
    /// Wrap a body with this build's protocol version.
    pub fn new(body: MessageBody) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            body,
        }
    }

    /// Serialize to a length-prefixed frame.
    pub fn encode_frame(&self) -> Result<Vec<u8>, NetError> {
        let payload =
            postcard::to_allocvec(self).map_err(|e| NetError::Serialization(e.to_string()))?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(NetError::TooLarge {
                len: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Read the payload length from a 4-byte frame header.
    pub fn frame_len(header: [u8; 4]) -> Result<usize, NetError> {
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(NetError::TooLarge {
                len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(len)
    }

    /// Deserialize a payload (the frame without its length prefix).
    ///
    /// The version is read before the body, so a peer speaking another
    /// version is refused with [`NetError::VersionMismatch`] instead of
    /// failing on an unknown body layout.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, NetError> {
        let (version, _) = postcard::take_from_bytes::<u16>(payload)
            .map_err(|e| NetError::Serialization(e.to_string()))?;
        if version != PROTOCOL_VERSION {
            return Err(NetError::VersionMismatch {
                ours: PROTOCOL_VERSION,
                theirs: version,
            });
        }
        postcard::from_bytes(payload).map_err(|e| NetError::Serialization(e.to_string()))
    }

    /// Deserialize a complete length-prefixed frame.
    pub fn decode_frame(frame: &[u8]) -> Result<Self, NetError> {
        let header: [u8; 4] = frame
            .get(..4)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| NetError::Serialization("truncated frame header".to_string()))?;
        let len = Self::frame_len(header)?;
        let payload = &frame[4..];
        if payload.len() != len {
            return Err(NetError::Serialization(format!(
                "frame length {len} does not match payload of {} bytes",
                payload.len()
            )));
        }
        Self::decode_payload(payload)
    }

    /// Short name of the body variant, for logs.
    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }
}
