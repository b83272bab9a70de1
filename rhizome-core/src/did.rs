// SPDX-License-Identifier: MIT OR Apache-2.0

//! Self-certifying identifiers derived from public keys.
//!
//! A `Did` is the `did:key` form of an ed25519 public key: base58btc over the
//! multicodec-tagged key bytes. Because derivation is deterministic in both
//! directions, resolving a DID back to its key requires no registry lookup.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{IdentityError, PublicKey};

/// Multicodec identifier for ed25519 public keys (varint encoded).
const ED25519_CODEC: [u8; 2] = [0xed, 0x01];

/// Method and multibase prefix shared by all supported identifiers.
const DID_KEY_PREFIX: &str = "did:key:z";

/// Decentralized identifier of an author.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Did(String);

impl Did {
    /// Derive the identifier of the given public key.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let mut tagged = Vec::with_capacity(ED25519_CODEC.len() + 32);
        tagged.extend_from_slice(&ED25519_CODEC);
        tagged.extend_from_slice(public_key.as_bytes());
        Self(format!(
            "{DID_KEY_PREFIX}{}",
            bs58::encode(tagged).into_string()
        ))
    }

    /// Resolve the identifier back to its public key.
    ///
    /// Fails when the method is unknown or the key is of an unsupported type.
    pub fn public_key(&self) -> Result<PublicKey, DidError> {
        let encoded = self
            .0
            .strip_prefix(DID_KEY_PREFIX)
            .ok_or_else(|| DidError::UnsupportedMethod(self.0.clone()))?;

        let tagged = bs58::decode(encoded).into_vec()?;
        let key_bytes = tagged
            .strip_prefix(&ED25519_CODEC[..])
            .ok_or(DidError::UnsupportedKeyType)?;

        Ok(PublicKey::from_bytes(key_bytes)?)
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&PublicKey> for Did {
    fn from(public_key: &PublicKey) -> Self {
        Self::from_public_key(public_key)
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let did = Self(value.to_string());
        // Resolution doubles as validation.
        did.public_key()?;
        Ok(did)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}

impl Serialize for Did {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value
            .parse()
            .map_err(|err: DidError| serde::de::Error::custom(err.to_string()))
    }
}

/// Error types for identifier derivation and resolution.
#[derive(Error, Debug)]
pub enum DidError {
    /// Identifier does not use the `did:key` method with base58btc encoding.
    #[error("unsupported did method in '{0}'")]
    UnsupportedMethod(String),

    /// Identifier encodes a key type other than ed25519.
    #[error("did encodes an unsupported key type, expected ed25519")]
    UnsupportedKeyType,

    /// Identifier contains characters outside the base58 alphabet.
    #[error("invalid base58 encoding in did")]
    InvalidBase58(#[from] bs58::decode::Error),

    /// Key bytes are malformed.
    #[error(transparent)]
    InvalidKey(#[from] IdentityError),
}
