// SPDX-License-Identifier: MIT OR Apache-2.0

//! Issuance, verification and revocation of capability grants.
use std::collections::{BTreeSet, HashMap, HashSet};

use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::{debug, warn};

use rhizome_core::{Did, PrivateKey, unix_now_ms};

use crate::access::{Resource, Right};
use crate::capability::{Capability, Constraints, DEFAULT_TTL_MS};

/// Local index of capabilities, owned by one node session.
///
/// Verification is consumptive: a successful check increments the grant's
/// usage counter. Revocation is immediate and final.
#[derive(Debug, Default)]
pub struct CapabilityManager {
    by_id: HashMap<String, Capability>,
    by_issuer: HashMap<Did, HashSet<String>>,
    by_subject: HashMap<Did, HashSet<String>>,
}

impl CapabilityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue and index a new grant signed by the issuer's key.
    ///
    /// Fills a one-year expiry when the constraints give none.
    pub fn issue(
        &mut self,
        subject: Did,
        resource: Resource,
        rights: impl IntoIterator<Item = Right>,
        issuer_key: &PrivateKey,
        constraints: Option<Constraints>,
    ) -> Result<Capability, CapabilityError> {
        self.issue_at(
            subject,
            resource,
            rights,
            issuer_key,
            constraints,
            unix_now_ms(),
        )
    }

    /// Issue against an explicit wall-clock reading.
    pub fn issue_at(
        &mut self,
        subject: Did,
        resource: Resource,
        rights: impl IntoIterator<Item = Right>,
        issuer_key: &PrivateKey,
        constraints: Option<Constraints>,
        now_ms: u64,
    ) -> Result<Capability, CapabilityError> {
        let rights: BTreeSet<Right> = rights.into_iter().collect();
        if rights.is_empty() {
            return Err(CapabilityError::EmptyRights);
        }

        let mut constraints = constraints.unwrap_or_default();
        if constraints.expires_at == 0 {
            constraints.expires_at = now_ms + DEFAULT_TTL_MS;
        }

        let mut capability = Capability {
            id: random_capability_id(),
            subject: subject.clone(),
            resource,
            rights,
            constraints,
            issuer: Did::from_public_key(&issuer_key.public_key()),
            issued_at: now_ms,
            uses: 0,
            signature: None,
        };
        capability.sign(issuer_key);

        debug!(
            id = %capability.id,
            subject = %capability.subject,
            resource = %capability.resource,
            "issued capability"
        );

        self.by_issuer
            .entry(capability.issuer.clone())
            .or_default()
            .insert(capability.id.clone());
        self.by_subject
            .entry(subject)
            .or_default()
            .insert(capability.id.clone());
        self.by_id
            .insert(capability.id.clone(), capability.clone());

        Ok(capability)
    }

    /// Check a grant against a requested right and consume one use.
    ///
    /// Failures are reported in priority order: unknown id, bad signature,
    /// expiry, exhaustion, insufficient rights.
    pub fn verify(&mut self, id: &str, right: Right) -> Result<Capability, CapabilityError> {
        self.verify_at(id, right, unix_now_ms())
    }

    /// Check against an explicit wall-clock reading.
    pub fn verify_at(
        &mut self,
        id: &str,
        right: Right,
        now_ms: u64,
    ) -> Result<Capability, CapabilityError> {
        let capability = self.by_id.get_mut(id).ok_or(CapabilityError::NotFound)?;

        if !capability.verify_signature() {
            warn!(id, "capability carries an invalid signature");
            return Err(CapabilityError::InvalidSignature);
        }

        if capability.is_expired(now_ms) {
            return Err(CapabilityError::Expired);
        }

        if capability.is_exhausted() {
            return Err(CapabilityError::ExhaustedUses);
        }

        if !capability.grants(right) {
            return Err(CapabilityError::InsufficientRights(right));
        }

        capability.uses += 1;
        Ok(capability.clone())
    }

    /// Find and consume a grant held by the subject for the given resource
    /// and right.
    pub fn authorize(
        &mut self,
        subject: &Did,
        resource: &Resource,
        right: Right,
    ) -> Result<Capability, CapabilityError> {
        self.authorize_at(subject, resource, right, unix_now_ms())
    }

    /// Authorize against an explicit wall-clock reading.
    pub fn authorize_at(
        &mut self,
        subject: &Did,
        resource: &Resource,
        right: Right,
        now_ms: u64,
    ) -> Result<Capability, CapabilityError> {
        let mut candidates: Vec<String> = self
            .by_subject
            .get(subject)
            .map(|ids| {
                ids.iter()
                    .filter(|id| {
                        self.by_id
                            .get(*id)
                            .is_some_and(|capability| &capability.resource == resource)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        candidates.sort();

        let mut last_error = CapabilityError::NotFound;
        for id in candidates {
            match self.verify_at(&id, right, now_ms) {
                Ok(capability) => return Ok(capability),
                Err(err) => last_error = err,
            }
        }

        Err(last_error)
    }

    /// Remove a grant from every index. There is no un-revoke.
    pub fn revoke(&mut self, id: &str) -> bool {
        let Some(capability) = self.by_id.remove(id) else {
            return false;
        };

        if let Some(ids) = self.by_issuer.get_mut(&capability.issuer) {
            ids.remove(id);
        }
        if let Some(ids) = self.by_subject.get_mut(&capability.subject) {
            ids.remove(id);
        }

        debug!(id, "revoked capability");
        true
    }

    /// Revoke every grant held by the given subject.
    pub fn revoke_all_for_subject(&mut self, subject: &Did) -> usize {
        let ids: Vec<String> = self
            .by_subject
            .get(subject)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        let mut revoked = 0;
        for id in ids {
            if self.revoke(&id) {
                revoked += 1;
            }
        }
        revoked
    }

    /// Opportunistically drop every grant past its expiry.
    pub fn revoke_expired(&mut self) -> usize {
        self.revoke_expired_at(unix_now_ms())
    }

    /// Expiry sweep against an explicit wall-clock reading.
    pub fn revoke_expired_at(&mut self, now_ms: u64) -> usize {
        let expired: Vec<String> = self
            .by_id
            .values()
            .filter(|capability| capability.is_expired(now_ms))
            .map(|capability| capability.id.clone())
            .collect();

        let mut revoked = 0;
        for id in expired {
            if self.revoke(&id) {
                revoked += 1;
            }
        }
        revoked
    }

    pub fn get(&self, id: &str) -> Option<&Capability> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

fn random_capability_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Error types for the capability gate, in verification priority order.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CapabilityError {
    /// No grant with this id, or the grant has been revoked.
    #[error("capability not found")]
    NotFound,

    /// Issuer signature does not verify over the canonical fields.
    #[error("capability signature is invalid")]
    InvalidSignature,

    /// The grant's expiry has passed.
    #[error("capability has expired")]
    Expired,

    /// The grant's usage budget is spent.
    #[error("capability uses are exhausted")]
    ExhaustedUses,

    /// The grant does not list the requested right.
    #[error("capability does not grant '{0}'")]
    InsufficientRights(Right),

    /// A grant needs at least one right.
    #[error("capability needs at least one right")]
    EmptyRights,
}

#[cfg(test)]
mod tests {
    use rhizome_core::{Did, PrivateKey};

    use crate::access::{Resource, ResourceKind, Right};
    use crate::capability::{Constraints, DEFAULT_TTL_MS};

    use super::{CapabilityError, CapabilityManager};

    fn subject() -> Did {
        Did::from_public_key(&PrivateKey::new().public_key())
    }

    #[test]
    fn issue_fills_default_expiry() {
        let issuer_key = PrivateKey::new();
        let mut manager = CapabilityManager::new();

        let capability = manager
            .issue_at(
                subject(),
                Resource::new(ResourceKind::Memory, "m-1"),
                [Right::Read],
                &issuer_key,
                None,
                5_000,
            )
            .unwrap();

        assert_eq!(capability.constraints.expires_at, 5_000 + DEFAULT_TTL_MS);
        assert!(capability.verify_signature());
    }

    #[test]
    fn single_use_capability_is_consumed() {
        let issuer_key = PrivateKey::new();
        let mut manager = CapabilityManager::new();

        let capability = manager
            .issue_at(
                subject(),
                Resource::new(ResourceKind::Conversation, "c-1"),
                [Right::Write],
                &issuer_key,
                Some(Constraints::default().with_max_uses(1)),
                1_000,
            )
            .unwrap();

        assert!(manager.verify_at(&capability.id, Right::Write, 2_000).is_ok());
        assert_eq!(
            manager.verify_at(&capability.id, Right::Write, 2_000),
            Err(CapabilityError::ExhaustedUses)
        );
    }

    #[test]
    fn revocation_is_immediate_and_final() {
        let issuer_key = PrivateKey::new();
        let mut manager = CapabilityManager::new();

        let capability = manager
            .issue_at(
                subject(),
                Resource::new(ResourceKind::Circle, "gardeners"),
                [Right::Read, Right::Write],
                &issuer_key,
                Some(Constraints::default().with_max_uses(100)),
                1_000,
            )
            .unwrap();

        assert!(manager.verify_at(&capability.id, Right::Read, 1_100).is_ok());

        assert!(manager.revoke(&capability.id));
        // Remaining uses and a valid expiry no longer matter.
        assert_eq!(
            manager.verify_at(&capability.id, Right::Read, 1_200),
            Err(CapabilityError::NotFound)
        );
        assert!(!manager.revoke(&capability.id));
    }

    #[test]
    fn expired_capabilities_are_rejected() {
        let issuer_key = PrivateKey::new();
        let mut manager = CapabilityManager::new();

        let capability = manager
            .issue_at(
                subject(),
                Resource::new(ResourceKind::Message, "m-9"),
                [Right::Read],
                &issuer_key,
                Some(Constraints::expiring_at(2_000)),
                1_000,
            )
            .unwrap();

        assert!(manager.verify_at(&capability.id, Right::Read, 1_999).is_ok());
        assert_eq!(
            manager.verify_at(&capability.id, Right::Read, 2_000),
            Err(CapabilityError::Expired)
        );
    }

    #[test]
    fn rights_are_checked_exactly() {
        let issuer_key = PrivateKey::new();
        let mut manager = CapabilityManager::new();

        let capability = manager
            .issue_at(
                subject(),
                Resource::new(ResourceKind::Conversation, "c-1"),
                [Right::Admin],
                &issuer_key,
                None,
                1_000,
            )
            .unwrap();

        // Admin on the resource does not imply write on it, let alone on
        // anything else.
        assert_eq!(
            manager.verify_at(&capability.id, Right::Write, 1_100),
            Err(CapabilityError::InsufficientRights(Right::Write))
        );
    }

    #[test]
    fn authorize_finds_grants_by_subject_and_resource() {
        let issuer_key = PrivateKey::new();
        let mut manager = CapabilityManager::new();
        let holder = subject();

        let conversation = Resource::new(ResourceKind::Conversation, "c-1");
        manager
            .issue_at(
                holder.clone(),
                conversation.clone(),
                [Right::Write],
                &issuer_key,
                None,
                1_000,
            )
            .unwrap();

        assert!(
            manager
                .authorize_at(&holder, &conversation, Right::Write, 1_100)
                .is_ok()
        );

        // Same subject, different resource: the grant does not carry over.
        let other = Resource::new(ResourceKind::Conversation, "c-2");
        assert_eq!(
            manager.authorize_at(&holder, &other, Right::Write, 1_100),
            Err(CapabilityError::NotFound)
        );

        // Different subject entirely.
        assert_eq!(
            manager.authorize_at(&subject(), &conversation, Right::Write, 1_100),
            Err(CapabilityError::NotFound)
        );
    }

    #[test]
    fn tampered_grant_fails_with_invalid_signature() {
        let issuer_key = PrivateKey::new();
        let mut manager = CapabilityManager::new();
        let holder = subject();

        let capability = manager
            .issue_at(
                holder.clone(),
                Resource::new(ResourceKind::Memory, "m-1"),
                [Right::Read],
                &issuer_key,
                None,
                1_000,
            )
            .unwrap();

        // Widen the indexed copy behind the manager's back.
        if let Some(stored) = manager.by_id.get_mut(&capability.id) {
            stored.rights.insert(Right::Admin);
        }

        assert_eq!(
            manager.verify_at(&capability.id, Right::Read, 1_100),
            Err(CapabilityError::InvalidSignature)
        );
    }

    #[test]
    fn batch_revocations() {
        let issuer_key = PrivateKey::new();
        let mut manager = CapabilityManager::new();
        let holder = subject();

        for index in 0..3 {
            manager
                .issue_at(
                    holder.clone(),
                    Resource::new(ResourceKind::Memory, format!("m-{index}")),
                    [Right::Read],
                    &issuer_key,
                    Some(Constraints::expiring_at(2_000)),
                    1_000,
                )
                .unwrap();
        }
        manager
            .issue_at(
                subject(),
                Resource::new(ResourceKind::Memory, "other"),
                [Right::Read],
                &issuer_key,
                Some(Constraints::expiring_at(9_000)),
                1_000,
            )
            .unwrap();

        assert_eq!(manager.revoke_all_for_subject(&holder), 3);
        assert_eq!(manager.len(), 1);

        assert_eq!(manager.revoke_expired_at(10_000), 1);
        assert!(manager.is_empty());
    }
}
