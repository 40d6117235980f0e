//! Statement type and its canonical binary codec.

use bytes::{Buf, BufMut};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use tagmesh_types::{
    AuthorId, Edge, Operation, PAYLOAD_VERSION, Predicate, SUBJECT_LEN, Subject, validate_tag,
};

use crate::error::LedgerError;

type Result<T> = std::result::Result<T, LedgerError>;

/// Length of an ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// One signed, clocked edit on an edge.
///
/// Statements are immutable: a retraction is a new statement with
/// [`Operation::Remove`] and a higher clock on the same edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Content the statement is about.
    pub subject: Subject,
    /// Relation type.
    pub predicate: Predicate,
    /// Tag text.
    pub object: String,
    /// Add or remove.
    pub operation: Operation,
    /// Position in the edge's clock sequence.
    pub clock: u64,
    /// ed25519 public key of the author.
    pub creator: AuthorId,
    /// ed25519 signature over [`Statement::payload`].
    pub signature: [u8; SIGNATURE_LEN],
}

/// Borrowed signable content of a [`Statement`] (everything but the signature).
#[derive(Debug, Clone, Copy)]
pub struct StatementContent<'a> {
    pub subject: &'a Subject,
    pub predicate: Predicate,
    pub object: &'a str,
    pub operation: Operation,
    pub clock: u64,
    pub creator: &'a AuthorId,
}

impl StatementContent<'_> {
    /// Canonical, versioned byte encoding that signatures cover.
    ///
    /// Layout (all integers big-endian):
    ///
    /// ```text
    /// u8   version
    /// [20] subject
    /// u8   predicate
    /// u16  object length, object bytes
    /// u8   operation
    /// u64  clock
    /// u16  key length, creator key bytes
    /// ```
    pub fn encode_payload(&self) -> Vec<u8> {
        let object = self.object.as_bytes();
        let mut buf = Vec::with_capacity(1 + SUBJECT_LEN + 1 + 2 + object.len() + 1 + 8 + 2 + 32);
        buf.put_u8(PAYLOAD_VERSION);
        buf.put_slice(self.subject.as_bytes());
        buf.put_u8(self.predicate.as_u8());
        buf.put_u16(object.len() as u16);
        buf.put_slice(object);
        buf.put_u8(self.operation.as_u8());
        buf.put_u64(self.clock);
        buf.put_u16(AuthorId::LEN as u16);
        buf.put_slice(self.creator.as_bytes());
        buf
    }
}

impl Statement {
    /// Create a statement signed by `signing_key`; the creator is the key's
    /// public half.
    pub fn new_signed(
        subject: Subject,
        predicate: Predicate,
        object: &str,
        operation: Operation,
        clock: u64,
        signing_key: &SigningKey,
    ) -> Self {
        let creator = AuthorId::from(signing_key.verifying_key().to_bytes());
        let payload = StatementContent {
            subject: &subject,
            predicate,
            object,
            operation,
            clock,
            creator: &creator,
        }
        .encode_payload();
        let signature: Signature = signing_key.sign(&payload);

        Self {
            subject,
            predicate,
            object: object.to_string(),
            operation,
            clock,
            creator,
            signature: signature.to_bytes(),
        }
    }

    /// Borrow the signable content.
    pub fn content(&self) -> StatementContent<'_> {
        StatementContent {
            subject: &self.subject,
            predicate: self.predicate,
            object: &self.object,
            operation: self.operation,
            clock: self.clock,
            creator: &self.creator,
        }
    }

    /// Canonical signing payload of this statement.
    pub fn payload(&self) -> Vec<u8> {
        self.content().encode_payload()
    }

    /// The edge this statement belongs to.
    pub fn edge(&self) -> Edge {
        Edge::new(self.creator, self.subject, self.predicate, &self.object)
    }

    /// Verify the ed25519 signature against the creator key.
    ///
    /// Returns `false` if the key bytes are not a valid point or the
    /// signature does not match. Strict verification rejects malleable
    /// signature encodings so one payload has one accepted signature.
    pub fn verify_signature(&self) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(self.creator.as_bytes()) else {
            return false;
        };
        let signature = Signature::from_bytes(&self.signature);
        verifying_key
            .verify_strict(&self.payload(), &signature)
            .is_ok()
    }

    /// Full admission check: tag bounds, then signature.
    pub fn validate(&self) -> Result<()> {
        validate_tag(&self.object)?;
        if !self.verify_signature() {
            return Err(LedgerError::SignatureInvalid);
        }
        Ok(())
    }

    /// Encode payload followed by the length-prefixed signature.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.payload();
        buf.put_u16(SIGNATURE_LEN as u16);
        buf.put_slice(&self.signature);
        buf
    }

    /// Decode a statement produced by [`Statement::encode`].
    ///
    /// Rejects unknown versions, unknown enumerator values, wrong fixed
    /// lengths, invalid UTF-8 and trailing bytes. Does not check the tag
    /// bounds or the signature; see [`Statement::validate`].
    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        let buf = &mut bytes;

        need(buf, 1)?;
        let version = buf.get_u8();
        if version != PAYLOAD_VERSION {
            return Err(LedgerError::UnsupportedVersion(version));
        }

        let subject = Subject::from_slice(take(buf, SUBJECT_LEN)?)?;

        need(buf, 1)?;
        let predicate = Predicate::try_from(buf.get_u8())?;

        need(buf, 2)?;
        let object_len = buf.get_u16() as usize;
        let object = std::str::from_utf8(take(buf, object_len)?)
            .map_err(|e| LedgerError::Malformed(format!("object is not utf-8: {e}")))?
            .to_string();

        need(buf, 1 + 8 + 2)?;
        let operation = Operation::try_from(buf.get_u8())?;
        let clock = buf.get_u64();
        let key_len = buf.get_u16() as usize;
        let creator = AuthorId::from_slice(take(buf, key_len)?)?;

        need(buf, 2)?;
        let sig_len = buf.get_u16() as usize;
        let signature: [u8; SIGNATURE_LEN] = take(buf, sig_len)?.try_into().map_err(|_| {
            LedgerError::Malformed(format!("signature must be {SIGNATURE_LEN} bytes, got {sig_len}"))
        })?;

        if buf.has_remaining() {
            return Err(LedgerError::Malformed(format!(
                "{} trailing bytes",
                buf.remaining()
            )));
        }

        Ok(Self {
            subject,
            predicate,
            object,
            operation,
            clock,
            creator,
            signature,
        })
    }
}

fn need(buf: &&[u8], n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(LedgerError::Malformed(format!(
            "truncated statement: need {n} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    need(buf, n)?;
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}
