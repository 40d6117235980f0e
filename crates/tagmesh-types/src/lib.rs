//! Shared types and identifiers for tagmesh.
//!
//! This crate defines the vocabulary every other tagmesh crate speaks:
//! identifiers ([`Subject`], [`AuthorId`], [`PeerId`]), the closed
//! enumerations carried by a statement ([`Predicate`], [`Operation`]),
//! the conflict unit ([`Edge`]) and the tag length limits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod error;

pub use error::TypesError;

/// Shortest tag accepted, in characters.
pub const MIN_TAG_LENGTH: usize = 3;

/// Longest tag accepted, in characters.
pub const MAX_TAG_LENGTH: usize = 50;

/// Version byte leading every canonical statement payload.
pub const PAYLOAD_VERSION: u8 = 1;

/// Version of the gossip message set. Peers refuse mismatching versions.
pub const PROTOCOL_VERSION: u16 = 1;

/// Length of a subject (BitTorrent v1 infohash) in bytes.
pub const SUBJECT_LEN: usize = 20;

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Length of the raw identifier in bytes.
            pub const LEN: usize = $len;

            /// Return the raw byte representation.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Build an ID from a byte slice, checking its length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| TypesError::InvalidLength {
                    expected: $len,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }

            /// Parse an ID from its lowercase or uppercase hex rendering.
            pub fn from_hex(s: &str) -> Result<Self, TypesError> {
                if s.len() != $len * 2 {
                    return Err(TypesError::InvalidLength {
                        expected: $len * 2,
                        actual: s.len(),
                    });
                }
                let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
                Self::from_slice(&bytes)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

define_id!(
    /// Content identifier a tag is attached to: a 20-byte infohash.
    Subject,
    SUBJECT_LEN
);

define_id!(
    /// Author of a statement: the raw ed25519 public key bytes.
    AuthorId,
    32
);

define_id!(
    /// Network identity of a gossip partner (transport public key bytes).
    PeerId,
    32
);

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Relation a statement asserts between its subject and object.
///
/// Wire values are stable; new predicates get new values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Predicate {
    /// Free-text tag attached to content.
    Tag,
}

impl Predicate {
    /// Wire value of the predicate.
    pub fn as_u8(self) -> u8 {
        match self {
            Predicate::Tag => 1,
        }
    }
}

impl TryFrom<u8> for Predicate {
    type Error = TypesError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Predicate::Tag),
            other => Err(TypesError::UnknownPredicate(other)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Tag => f.write_str("tag"),
        }
    }
}

/// Whether a statement asserts or retracts its edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Operation {
    /// The author attaches the object to the subject.
    Add,
    /// The author retracts the object from the subject.
    Remove,
}

impl Operation {
    /// Wire value of the operation.
    pub fn as_u8(self) -> u8 {
        match self {
            Operation::Add => 1,
            Operation::Remove => 2,
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = TypesError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Operation::Add),
            2 => Ok(Operation::Remove),
            other => Err(TypesError::UnknownOperation(other)),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Add => f.write_str("add"),
            Operation::Remove => f.write_str("remove"),
        }
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// The unit of conflict: one author's relation between a subject and an object.
///
/// Every edge owns exactly one clock sequence. Statements on the same edge
/// are ordered by clock; statements on different edges are only aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Edge {
    /// Content the edge is attached to.
    pub subject: Subject,
    /// Relation type.
    pub predicate: Predicate,
    /// Author owning the clock sequence.
    pub author: AuthorId,
    /// Tag text.
    pub object: String,
}

impl Edge {
    /// Create an edge.
    pub fn new(author: AuthorId, subject: Subject, predicate: Predicate, object: &str) -> Self {
        Self {
            subject,
            predicate,
            author,
            object: object.to_string(),
        }
    }

    /// Byte key identifying the edge.
    ///
    /// Layout: `subject ++ predicate ++ author ++ u16 BE object length ++
    /// object`. It starts with [`subject_prefix`] so all edges of a subject
    /// sort together, and the length prefix keeps one edge key from being a
    /// prefix of another.
    pub fn key(&self) -> Vec<u8> {
        let object = self.object.as_bytes();
        let mut key = subject_prefix(&self.subject, self.predicate);
        key.reserve(AuthorId::LEN + 2 + object.len());
        key.extend_from_slice(self.author.as_bytes());
        key.extend_from_slice(&(object.len() as u16).to_be_bytes());
        key.extend_from_slice(object);
        key
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.author, self.subject, self.predicate, self.object
        )
    }
}

/// Key prefix shared by every edge of `(subject, predicate)`.
pub fn subject_prefix(subject: &Subject, predicate: Predicate) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(SUBJECT_LEN + 1);
    prefix.extend_from_slice(subject.as_bytes());
    prefix.push(predicate.as_u8());
    prefix
}

/// Check a tag against [`MIN_TAG_LENGTH`] and [`MAX_TAG_LENGTH`].
///
/// Length is counted in Unicode scalar values, not bytes.
pub fn validate_tag(tag: &str) -> Result<(), TypesError> {
    let len = tag.chars().count();
    if !(MIN_TAG_LENGTH..=MAX_TAG_LENGTH).contains(&len) {
        return Err(TypesError::TagLength(len));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
