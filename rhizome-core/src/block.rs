// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merkle-rooted aggregation of event ids.
//!
//! Blocks batch accepted event ids into a signed, chained record used for
//! anchoring and audit. They play no role in ordering; the event DAG alone
//! decides that.
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cid::ContentId;
use crate::did::{Did, DidError};
use crate::hash::Hash;
use crate::hlc::Timestamp;
use crate::identity::{PrivateKey, Signature};

/// A signed batch of event ids with a pointer to the previous block.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Block {
    pub height: u64,
    pub previous: Option<ContentId>,
    pub event_ids: Vec<ContentId>,
    pub merkle_root: Hash,
    pub created_at: Timestamp,
    pub author: Did,
    pub signature: Option<Signature>,
}

impl Block {
    /// Assemble an unsigned block over the given event ids.
    pub fn new(
        height: u64,
        previous: Option<ContentId>,
        event_ids: Vec<ContentId>,
        created_at: Timestamp,
        author: Did,
    ) -> Self {
        let merkle_root = merkle_root(&event_ids);
        Self {
            height,
            previous,
            event_ids,
            merkle_root,
            created_at,
            author,
            signature: None,
        }
    }

    /// Canonical byte encoding: every field except the signature.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&CanonicalBlock(self), &mut bytes)
            .expect("CBOR encoder failed due to a critical IO error");
        bytes
    }

    /// Content address of the block.
    pub fn id(&self) -> ContentId {
        ContentId::new(self.canonical_bytes())
    }

    pub fn sign(&mut self, private_key: &PrivateKey) {
        self.signature = None;
        let bytes = self.canonical_bytes();
        self.signature = Some(private_key.sign(&bytes));
    }

    /// Check the merkle root and the author's signature.
    pub fn verify(&self) -> Result<(), BlockError> {
        if merkle_root(&self.event_ids) != self.merkle_root {
            return Err(BlockError::RootMismatch);
        }

        let Some(signature) = &self.signature else {
            return Err(BlockError::MissingSignature);
        };

        let bytes = self.canonical_bytes();
        let public_key = self.author.public_key()?;
        if !public_key.verify(&bytes, signature) {
            return Err(BlockError::InvalidSignature);
        }

        Ok(())
    }

    /// True when the given event id is part of this block's batch.
    pub fn contains(&self, event_id: &ContentId) -> bool {
        self.event_ids.contains(event_id)
    }
}

/// Merkle root over event id leaf digests.
///
/// Levels are built by hashing concatenated sibling pairs, an odd node is
/// promoted unchanged. The root of an empty batch is the digest of no bytes.
pub fn merkle_root(event_ids: &[ContentId]) -> Hash {
    if event_ids.is_empty() {
        return Hash::new([]);
    }

    let mut level: Vec<Hash> = event_ids.iter().map(|id| id.hash()).collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => {
                    let mut concat = Vec::with_capacity(64);
                    concat.extend_from_slice(left.as_bytes());
                    concat.extend_from_slice(right.as_bytes());
                    Hash::new(concat)
                }
                [single] => *single,
                _ => unreachable!("chunks of two"),
            })
            .collect();
    }

    level[0]
}

struct CanonicalBlock<'a>(&'a Block);

impl Serialize for CanonicalBlock<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let block = self.0;
        let mut seq = serializer.serialize_seq(Some(6))?;
        seq.serialize_element(&block.height)?;
        seq.serialize_element(&block.previous)?;
        seq.serialize_element(&block.event_ids)?;
        seq.serialize_element(&block.merkle_root)?;
        seq.serialize_element(&block.created_at)?;
        seq.serialize_element(&block.author)?;
        seq.end()
    }
}

impl Serialize for Block {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| serde::ser::Error::custom("refusing to encode an unsigned block"))?;

        let mut seq = serializer.serialize_seq(Some(7))?;
        seq.serialize_element(&self.height)?;
        seq.serialize_element(&self.previous)?;
        seq.serialize_element(&self.event_ids)?;
        seq.serialize_element(&self.merkle_root)?;
        seq.serialize_element(&self.created_at)?;
        seq.serialize_element(&self.author)?;
        seq.serialize_element(signature)?;
        seq.end()
    }
}

/// Error types for block verification.
#[derive(Error, Debug)]
pub enum BlockError {
    /// Recomputed merkle root does not match the recorded one.
    #[error("merkle root does not match the block's event ids")]
    RootMismatch,

    /// Block carries no signature.
    #[error("block needs to be signed")]
    MissingSignature,

    /// Signature does not verify against the block author's key.
    #[error("block signature does not match the claimed author")]
    InvalidSignature,

    /// Author identifier cannot be resolved to a public key.
    #[error(transparent)]
    UnresolvableAuthor(#[from] DidError),
}
