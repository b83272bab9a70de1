// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signed capability grants.
use std::collections::{BTreeMap, BTreeSet};

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize};

use rhizome_core::{Did, PrivateKey, Signature};

use crate::access::{Resource, Right};

/// Default lifetime of a grant when the issuer gives no expiry: one year.
pub const DEFAULT_TTL_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// Bounds on a grant's validity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Wall-clock expiry in unix milliseconds. Zero means "fill the default".
    pub expires_at: u64,

    /// How often the grant may be used, unbounded when absent.
    pub max_uses: Option<u32>,

    /// Issuer-defined predicates, opaque to the manager.
    pub predicates: BTreeMap<String, String>,
}

impl Constraints {
    pub fn expiring_at(expires_at: u64) -> Self {
        Self {
            expires_at,
            ..Default::default()
        }
    }

    pub fn with_max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = Some(max_uses);
        self
    }
}

/// A signed, revocable, constraint-bounded grant of rights over one resource.
///
/// The signature covers every field except the usage counter and the
/// signature itself, so a capability cannot be widened after issuance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    pub subject: Did,
    pub resource: Resource,
    pub rights: BTreeSet<Right>,
    pub constraints: Constraints,
    pub issuer: Did,
    pub issued_at: u64,
    pub uses: u32,
    pub signature: Option<Signature>,
}

impl Capability {
    /// Canonical byte encoding of the signed fields.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&CanonicalCapability(self), &mut bytes)
            .expect("CBOR encoder failed due to a critical IO error");
        bytes
    }

    pub fn sign(&mut self, issuer_key: &PrivateKey) {
        self.signature = None;
        let bytes = self.canonical_bytes();
        self.signature = Some(issuer_key.sign(&bytes));
    }

    /// Cryptographic check of the issuer's signature over the canonical
    /// fields. Presence alone is not enough.
    pub fn verify_signature(&self) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        let Ok(public_key) = self.issuer.public_key() else {
            return false;
        };
        public_key.verify(&self.canonical_bytes(), signature)
    }

    /// True when the grant explicitly lists the given right.
    pub fn grants(&self, right: Right) -> bool {
        self.rights.contains(&right)
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.constraints.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        match self.constraints.max_uses {
            Some(max_uses) => self.uses >= max_uses,
            None => false,
        }
    }
}

struct CanonicalCapability<'a>(&'a Capability);

impl Serialize for CanonicalCapability<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let capability = self.0;
        let mut seq = serializer.serialize_seq(Some(7))?;
        seq.serialize_element(&capability.id)?;
        seq.serialize_element(&capability.subject)?;
        seq.serialize_element(&capability.resource)?;
        seq.serialize_element(&capability.rights)?;
        seq.serialize_element(&capability.constraints)?;
        seq.serialize_element(&capability.issuer)?;
        seq.serialize_element(&capability.issued_at)?;
        seq.end()
    }
}
