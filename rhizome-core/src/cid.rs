// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multicodec-tagged content addresses.
//!
//! A `ContentId` names a piece of data by the BLAKE3 digest of its canonical
//! byte encoding. The string form is base58btc with a `z` multibase prefix
//! over the tagged digest bytes, so identifiers remain self-describing when
//! they travel outside the wire format.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::{HASH_LEN, Hash, HashError};
use crate::serde_utils::{deserialize_hex, serialize_hex};

/// Multicodec identifier for BLAKE3 digests.
const BLAKE3_CODEC: u8 = 0x1e;

/// Multibase prefix for base58btc strings.
const BASE58_BTC: char = 'z';

/// Content address of a canonical byte sequence.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId(Hash);

impl ContentId {
    /// Derive the content id of the given canonical bytes.
    pub fn new(buf: impl AsRef<[u8]>) -> Self {
        Self(Hash::new(buf))
    }

    /// The untagged digest.
    pub fn hash(&self) -> Hash {
        self.0
    }

    /// Tagged digest bytes: codec, digest length, digest.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HASH_LEN + 2);
        bytes.push(BLAKE3_CODEC);
        bytes.push(HASH_LEN as u8);
        bytes.extend_from_slice(self.0.as_bytes());
        bytes
    }

    /// Parse tagged digest bytes, rejecting unsupported codecs.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContentIdError> {
        let [codec, len, digest @ ..] = bytes else {
            return Err(ContentIdError::InvalidLength(bytes.len()));
        };

        if *codec != BLAKE3_CODEC {
            return Err(ContentIdError::UnsupportedCodec(*codec));
        }

        if *len as usize != HASH_LEN || digest.len() != HASH_LEN {
            return Err(ContentIdError::InvalidLength(bytes.len()));
        }

        Ok(Self(Hash::try_from(digest)?))
    }
}

impl From<Hash> for ContentId {
    fn from(hash: Hash) -> Self {
        Self(hash)
    }
}

impl From<ContentId> for Hash {
    fn from(cid: ContentId) -> Self {
        cid.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            BASE58_BTC,
            bs58::encode(self.to_bytes()).into_string()
        )
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({self})")
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let encoded = value
            .strip_prefix(BASE58_BTC)
            .ok_or(ContentIdError::MissingMultibasePrefix)?;
        let bytes = bs58::decode(encoded).into_vec()?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for ContentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serialize_hex(&self.to_bytes(), serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let value = String::deserialize(deserializer)?;
            value
                .parse()
                .map_err(|err: ContentIdError| serde::de::Error::custom(err.to_string()))
        } else {
            let bytes = deserialize_hex(deserializer)?;
            Self::from_bytes(&bytes)
                .map_err(|err: ContentIdError| serde::de::Error::custom(err.to_string()))
        }
    }
}

/// Error types for `ContentId` struct.
#[derive(Error, Debug)]
pub enum ContentIdError {
    /// Identifier does not start with the base58btc multibase prefix.
    #[error("content id string is missing the 'z' multibase prefix")]
    MissingMultibasePrefix,

    /// Identifier is tagged with a codec other than BLAKE3.
    #[error("unsupported multicodec {0:#04x} in content id, expected blake3")]
    UnsupportedCodec(u8),

    /// Tagged bytes have an unexpected length.
    #[error("invalid content id length of {0} bytes")]
    InvalidLength(usize),

    /// Digest portion is malformed.
    #[error(transparent)]
    InvalidDigest(#[from] HashError),

    /// Identifier contains characters outside the base58 alphabet.
    #[error("invalid base58 encoding in content id")]
    InvalidBase58(#[from] bs58::decode::Error),
}

#[cfg(test)]
mod tests {
    use super::{ContentId, ContentIdError};

    #[test]
    fn string_round_trip() {
        let cid = ContentId::new(b"some canonical bytes");
        let string = cid.to_string();
        assert!(string.starts_with('z'));

        let parsed: ContentId = string.parse().unwrap();
        assert_eq!(cid, parsed);
    }

    #[test]
    fn bytes_round_trip() {
        let cid = ContentId::new([1, 2, 3]);
        let parsed = ContentId::from_bytes(&cid.to_bytes()).unwrap();
        assert_eq!(cid, parsed);
    }

    #[test]
    fn rejects_unknown_codec() {
        let mut bytes = ContentId::new([1, 2, 3]).to_bytes();
        bytes[0] = 0x12;
        let result = ContentId::from_bytes(&bytes);
        assert!(matches!(result, Err(ContentIdError::UnsupportedCodec(0x12))));
    }

    #[test]
    fn rejects_missing_prefix() {
        // Base32-style identifier, no 'z' multibase prefix.
        let result: Result<ContentId, _> = "bafyabc123".parse();
        assert!(matches!(result, Err(ContentIdError::MissingMultibasePrefix)));
    }

    #[test]
    fn serde_encodings() {
        let cid = ContentId::new(b"payload");

        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(json, format!("\"{cid}\""));
        let from_json: ContentId = serde_json::from_str(&json).unwrap();
        assert_eq!(cid, from_json);

        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&cid, &mut bytes).unwrap();
        let from_cbor: ContentId = ciborium::de::from_reader(&bytes[..]).unwrap();
        assert_eq!(cid, from_cbor);
    }
}
