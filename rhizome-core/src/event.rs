// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signed, content-addressed and causally linked chain events.
//!
//! A `ChainEvent` is the atomic unit of state change. Its identifier is the
//! BLAKE3 digest of the canonical CBOR encoding of all fields except `id` and
//! `signature`, and its signature covers those same bytes. Events link to
//! zero or more causal parents, forming a DAG in which concurrent children
//! are expected and retained.
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::de::{Error as SerdeError, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cid::ContentId;
use crate::did::{Did, DidError};
use crate::hlc::Timestamp;
use crate::identity::{PrivateKey, Signature};
use crate::vector_clock::VectorClock;

/// Domain a chain event operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Domain {
    Identity,
    Conversation,
    Message,
    DerivedUnit,
    Memory,
    Social,
    Circle,
    Sync,
    Anchor,
}

impl Domain {
    pub const ALL: [Domain; 9] = [
        Domain::Identity,
        Domain::Conversation,
        Domain::Message,
        Domain::DerivedUnit,
        Domain::Memory,
        Domain::Social,
        Domain::Circle,
        Domain::Sync,
        Domain::Anchor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Identity => "identity",
            Domain::Conversation => "conversation",
            Domain::Message => "message",
            Domain::DerivedUnit => "derived-unit",
            Domain::Memory => "memory",
            Domain::Social => "social",
            Domain::Circle => "circle",
            Domain::Sync => "sync",
            Domain::Anchor => "anchor",
        }
    }
}

impl FromStr for Domain {
    type Err = EventError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|domain| domain.as_str() == value)
            .ok_or_else(|| EventError::UnknownEventType(value.to_string()))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operation a chain event performs within its domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Tombstone,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Tombstone => "tombstone",
        }
    }
}

/// Closed enumeration of domain operations, serialized as the canonical
/// `"domain:action"` string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventType {
    pub domain: Domain,
    pub action: Action,
}

impl EventType {
    pub fn new(domain: Domain, action: Action) -> Self {
        Self { domain, action }
    }

    pub fn create(domain: Domain) -> Self {
        Self::new(domain, Action::Create)
    }

    pub fn update(domain: Domain) -> Self {
        Self::new(domain, Action::Update)
    }

    pub fn tombstone(domain: Domain) -> Self {
        Self::new(domain, Action::Tombstone)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain.as_str(), self.action.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((domain, action)) = value.split_once(':') else {
            return Err(EventError::UnknownEventType(value.to_string()));
        };

        let domain = domain.parse()?;
        let action = match action {
            "create" => Action::Create,
            "update" => Action::Update,
            "tombstone" => Action::Tombstone,
            _ => return Err(EventError::UnknownEventType(value.to_string())),
        };

        Ok(Self { domain, action })
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value
            .parse()
            .map_err(|err: EventError| serde::de::Error::custom(err.to_string()))
    }
}

/// Replication visibility class of an event.
///
/// Gates which topics an event is announced to, never how it is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Public,
    Circle,
    Friends,
    Private,
    #[serde(rename = "self")]
    SelfOnly,
}

/// Domain data carried by an event, one variant per domain.
///
/// Larger payloads live out-of-band and are referenced by content id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Payload {
    Identity(IdentityPayload),
    Conversation(ConversationPayload),
    Message(MessagePayload),
    DerivedUnit(DerivedUnitPayload),
    Memory(MemoryPayload),
    Social(SocialPayload),
    Circle(CirclePayload),
    Sync(SyncPayload),
    Anchor(AnchorPayload),
}

impl Payload {
    /// The domain this payload shape belongs to.
    pub fn domain(&self) -> Domain {
        match self {
            Payload::Identity(_) => Domain::Identity,
            Payload::Conversation(_) => Domain::Conversation,
            Payload::Message(_) => Domain::Message,
            Payload::DerivedUnit(_) => Domain::DerivedUnit,
            Payload::Memory(_) => Domain::Memory,
            Payload::Social(_) => Domain::Social,
            Payload::Circle(_) => Domain::Circle,
            Payload::Sync(_) => Domain::Sync,
            Payload::Anchor(_) => Domain::Anchor,
        }
    }

    /// Content id of out-of-band data referenced by this payload, if any.
    pub fn content(&self) -> Option<ContentId> {
        match self {
            Payload::Identity(payload) => payload.avatar,
            Payload::Message(payload) => payload.attachment,
            Payload::DerivedUnit(payload) => payload.content,
            Payload::Memory(payload) => payload.content,
            Payload::Sync(payload) => payload.cursor,
            Payload::Anchor(payload) => payload.block,
            Payload::Conversation(_) | Payload::Social(_) | Payload::Circle(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityPayload {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<ContentId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationPayload {
    pub title: Option<String>,
    pub participants: Vec<Did>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub conversation: Option<String>,
    pub text: Option<String>,
    pub attachment: Option<ContentId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedUnitPayload {
    pub kind: String,
    pub source: Option<ContentId>,
    pub content: Option<ContentId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryPayload {
    pub label: Option<String>,
    pub content: Option<ContentId>,
    pub salience: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SocialPayload {
    pub relation: String,
    pub target: Option<Did>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CirclePayload {
    pub name: Option<String>,
    pub members: Vec<Did>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub peer: Option<Did>,
    pub cursor: Option<ContentId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorPayload {
    pub block: Option<ContentId>,
    pub height: Option<u64>,
}

/// The atomic unit of state change.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainEvent {
    /// Content address of the canonical encoding, excluding `id` and
    /// `signature` themselves.
    pub id: ContentId,
    pub event_type: EventType,
    pub author: Did,
    pub timestamp: Timestamp,
    pub payload: Payload,
    /// Per-entity version counter, starting at 1.
    pub version: u64,
    /// Causal clock snapshot at creation time.
    pub vector_clock: VectorClock,
    /// Causal parents. Concurrent children of the same parent are expected.
    pub parents: Vec<ContentId>,
    /// The mutable entity this event updates, if any.
    pub entity_id: Option<String>,
    pub prev_version: Option<u64>,
    pub scope: Scope,
    pub tags: Vec<String>,
    pub signature: Option<Signature>,
}

impl ChainEvent {
    /// Canonical byte encoding: every field except `id` and `signature`, in
    /// fixed order.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&CanonicalEvent(self), &mut bytes)
            // All field types in this module are serializable, an error here
            // means the writer itself failed.
            .expect("CBOR encoder failed due to a critical IO error");
        bytes
    }

    /// Sign the event and derive its content address.
    pub fn sign(&mut self, private_key: &PrivateKey) {
        self.signature = None;
        let bytes = self.canonical_bytes();
        self.signature = Some(private_key.sign(&bytes));
        self.id = ContentId::new(&bytes);
    }

    /// Check content address and authorship.
    ///
    /// Recomputes the canonical form first: any field mutation shows up as a
    /// tampered id before the signature is even looked at.
    pub fn verify(&self) -> Result<(), EventError> {
        let Some(signature) = &self.signature else {
            return Err(EventError::MissingSignature);
        };

        let bytes = self.canonical_bytes();
        if ContentId::new(&bytes) != self.id {
            return Err(EventError::Tampered(self.id));
        }

        let public_key = self.author.public_key()?;
        if !public_key.verify(&bytes, signature) {
            return Err(EventError::Forged(self.id));
        }

        Ok(())
    }

    /// Content id of out-of-band payload data, if any.
    pub fn payload_content(&self) -> Option<ContentId> {
        self.payload.content()
    }

    pub fn is_tombstone(&self) -> bool {
        self.event_type.action == Action::Tombstone
    }
}

/// Structural validation beyond signature and content address.
pub fn validate_event(event: &ChainEvent) -> Result<(), EventError> {
    if event.signature.is_none() {
        return Err(EventError::MissingSignature);
    }

    let payload_domain = event.payload.domain();
    if payload_domain != event.event_type.domain {
        return Err(EventError::PayloadMismatch {
            expected: event.event_type.domain,
            found: payload_domain,
        });
    }

    match (event.version, event.prev_version) {
        (0, _) => return Err(EventError::VersionMismatch),
        (1, None) => (),
        (_, None) => return Err(EventError::VersionMismatch),
        (version, Some(prev)) if prev + 1 != version => return Err(EventError::VersionMismatch),
        (_, Some(_)) => {
            if event.entity_id.is_none() {
                return Err(EventError::MissingEntity);
            }
        }
    }

    if event.vector_clock.get(&event.author) == 0 {
        return Err(EventError::ClockMissingAuthor);
    }

    Ok(())
}

/// Borrow of an event's signed fields, encoded as an 11 element sequence.
struct CanonicalEvent<'a>(&'a ChainEvent);

impl Serialize for CanonicalEvent<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let event = self.0;
        let mut seq = serializer.serialize_seq(Some(11))?;
        seq.serialize_element(&event.event_type)?;
        seq.serialize_element(&event.author)?;
        seq.serialize_element(&event.timestamp)?;
        seq.serialize_element(&event.payload)?;
        seq.serialize_element(&event.version)?;
        seq.serialize_element(&event.vector_clock)?;
        seq.serialize_element(&event.parents)?;
        seq.serialize_element(&event.entity_id)?;
        seq.serialize_element(&event.prev_version)?;
        seq.serialize_element(&event.scope)?;
        seq.serialize_element(&event.tags)?;
        seq.end()
    }
}

impl Serialize for ChainEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| serde::ser::Error::custom("refusing to encode an unsigned event"))?;

        let mut seq = serializer.serialize_seq(Some(13))?;
        seq.serialize_element(&self.id)?;
        seq.serialize_element(&self.event_type)?;
        seq.serialize_element(&self.author)?;
        seq.serialize_element(&self.timestamp)?;
        seq.serialize_element(&self.payload)?;
        seq.serialize_element(&self.version)?;
        seq.serialize_element(&self.vector_clock)?;
        seq.serialize_element(&self.parents)?;
        seq.serialize_element(&self.entity_id)?;
        seq.serialize_element(&self.prev_version)?;
        seq.serialize_element(&self.scope)?;
        seq.serialize_element(&self.tags)?;
        seq.serialize_element(signature)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ChainEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct EventVisitor(PhantomData<ChainEvent>);

        impl<'de> Visitor<'de> for EventVisitor {
            type Value = ChainEvent;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("chain event encoded as a sequence")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                fn field<'de, A, T>(seq: &mut A, name: &'static str) -> Result<T, A::Error>
                where
                    A: SeqAccess<'de>,
                    T: Deserialize<'de>,
                {
                    seq.next_element()?
                        .ok_or_else(|| SerdeError::custom(format!("{name} missing")))
                }

                let id = field(&mut seq, "id")?;
                let event_type = field(&mut seq, "event type")?;
                let author = field(&mut seq, "author")?;
                let timestamp = field(&mut seq, "timestamp")?;
                let payload = field(&mut seq, "payload")?;
                let version = field(&mut seq, "version")?;
                let vector_clock = field(&mut seq, "vector clock")?;
                let parents = field(&mut seq, "parents")?;
                let entity_id = field(&mut seq, "entity id")?;
                let prev_version = field(&mut seq, "previous version")?;
                let scope = field(&mut seq, "scope")?;
                let tags = field(&mut seq, "tags")?;
                let signature: Signature = field(&mut seq, "signature")?;

                Ok(ChainEvent {
                    id,
                    event_type,
                    author,
                    timestamp,
                    payload,
                    version,
                    vector_clock,
                    parents,
                    entity_id,
                    prev_version,
                    scope,
                    tags,
                    signature: Some(signature),
                })
            }
        }

        deserializer.deserialize_seq(EventVisitor(PhantomData))
    }
}

/// Error types for event creation and verification.
#[derive(Error, Debug)]
pub enum EventError {
    /// Event carries no signature.
    #[error("event needs to be signed")]
    MissingSignature,

    /// Recomputed content address does not match the claimed id.
    #[error("event {0} has been tampered with, content address mismatch")]
    Tampered(ContentId),

    /// Signature does not verify against the author's resolved key.
    #[error("event {0} carries a forged signature")]
    Forged(ContentId),

    /// Author identifier cannot be resolved to a public key.
    #[error(transparent)]
    UnresolvableAuthor(#[from] DidError),

    /// Payload shape does not belong to the claimed event type.
    #[error("payload domain '{found}' does not match event type domain '{expected}'")]
    PayloadMismatch { expected: Domain, found: Domain },

    /// Version and previous version disagree.
    #[error("event version and previous version are inconsistent")]
    VersionMismatch,

    /// Versioned update without an entity to update.
    #[error("entity id needs to be set when a previous version is given")]
    MissingEntity,

    /// Vector clock carries no entry for the event's author.
    #[error("vector clock is missing the author's own entry")]
    ClockMissingAuthor,

    /// Event type string is not part of the closed enumeration.
    #[error("unknown event type '{0}'")]
    UnknownEventType(String),
}
