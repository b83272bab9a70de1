// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ed25519 key material used to sign and verify events and capabilities.
use std::fmt;
use std::hash::Hasher;

use ed25519_dalek::{
    PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, SIGNATURE_LENGTH, Signer, SigningKey, Verifier,
    VerifyingKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serde_utils::{deserialize_hex, serialize_hex};

/// Private ed25519 key used for signing.
#[derive(Clone, Debug)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Generate a new private key from the system's CSPRNG.
    pub fn new() -> Self {
        let mut csprng = OsRng;
        Self(SigningKey::generate(&mut csprng))
    }

    /// Restore a private key from its raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let checked: [u8; SECRET_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyLength(bytes.len(), SECRET_KEY_LENGTH))?;
        Ok(Self(SigningKey::from_bytes(&checked)))
    }

    /// Raw bytes of the private key.
    pub fn as_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.0.to_bytes()
    }

    /// The public half of this key pair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Sign the given bytes.
    pub fn sign(&self, bytes: &[u8]) -> Signature {
        Signature(self.0.sign(bytes))
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_bytes()))
    }
}

/// Public ed25519 key identifying an author.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Restore a public key from its raw bytes, rejecting points which are
    /// not on the curve.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let checked: [u8; PUBLIC_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyLength(bytes.len(), PUBLIC_KEY_LENGTH))?;
        let key =
            VerifyingKey::from_bytes(&checked).map_err(|_| IdentityError::InvalidPublicKey)?;
        Ok(Self(key))
    }

    /// Raw bytes of the public key.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.0.as_bytes()
    }

    /// Verify a signature over the given bytes against this key.
    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> bool {
        self.0.verify(bytes, &signature.0).is_ok()
    }

    /// Hex string representation of the public key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl std::hash::Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(self.as_bytes());
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(value)
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(value: VerifyingKey) -> Self {
        Self(value)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    /// Restore a signature from its raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let checked: [u8; SIGNATURE_LENGTH] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyLength(bytes.len(), SIGNATURE_LENGTH))?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&checked)))
    }

    /// Raw bytes of the signature.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.to_bytes()
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(value)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl Serialize for PrivateKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(&self.as_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;
        Self::from_bytes(&bytes)
            .map_err(|err: IdentityError| serde::de::Error::custom(err.to_string()))
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(self.as_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;
        Self::from_bytes(&bytes)
            .map_err(|err: IdentityError| serde::de::Error::custom(err.to_string()))
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;
        Self::from_bytes(&bytes)
            .map_err(|err: IdentityError| serde::de::Error::custom(err.to_string()))
    }
}

/// Error types for key material.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Key or signature bytes have an unexpected length.
    #[error("invalid length of {0} bytes, expected {1} bytes")]
    InvalidKeyLength(usize, usize),

    /// Bytes do not form a valid curve point.
    #[error("invalid ed25519 public key bytes")]
    InvalidPublicKey,
}

#[cfg(test)]
mod tests {
    use super::{PrivateKey, PublicKey, Signature};

    #[test]
    fn sign_and_verify() {
        let private_key = PrivateKey::new();
        let public_key = private_key.public_key();

        let signature = private_key.sign(b"an announcement");
        assert!(public_key.verify(b"an announcement", &signature));
        assert!(!public_key.verify(b"a different announcement", &signature));
    }

    #[test]
    fn signing_is_deterministic() {
        let private_key = PrivateKey::new();
        let signature_1 = private_key.sign(b"same bytes");
        let signature_2 = private_key.sign(b"same bytes");
        assert_eq!(signature_1, signature_2);
    }

    #[test]
    fn key_round_trips() {
        let private_key = PrivateKey::new();
        let restored = PrivateKey::from_bytes(&private_key.as_bytes()).unwrap();
        assert_eq!(private_key.public_key(), restored.public_key());

        let public_key = private_key.public_key();
        let restored = PublicKey::from_bytes(public_key.as_bytes()).unwrap();
        assert_eq!(public_key, restored);

        let signature = private_key.sign(b"bytes");
        let restored = Signature::from_bytes(&signature.to_bytes()).unwrap();
        assert_eq!(signature, restored);
    }

    #[test]
    fn serde_encodings() {
        let public_key = PrivateKey::new().public_key();

        let json = serde_json::to_string(&public_key).unwrap();
        assert_eq!(json, format!("\"{public_key}\""));

        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&public_key, &mut bytes).unwrap();
        let again: PublicKey = ciborium::de::from_reader(&bytes[..]).unwrap();
        assert_eq!(public_key, again);
    }
}
