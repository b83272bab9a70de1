// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rights and the resources they apply to.
use std::fmt;

use serde::{Deserialize, Serialize};

use rhizome_core::Domain;

/// The three rights which can be granted over a resource.
///
/// A capability grants exactly the rights it lists. Holding `Admin` on one
/// resource implies nothing about any other resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Right {
    /// Permission to read a resource's events.
    Read,

    /// Permission to append events to a resource.
    Write,

    /// Permission to manage grants on a resource.
    Admin,
}

impl fmt::Display for Right {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Right::Read => "read",
            Right::Write => "write",
            Right::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

/// Kind of resource a grant applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// A user's own data space, addressed by their identifier.
    User,
    Conversation,
    Message,
    DerivedUnit,
    Memory,
    Social,
    Circle,
    Sync,
    Anchor,
    /// Out-of-band content addressed by content id.
    Content,
}

impl From<Domain> for ResourceKind {
    fn from(domain: Domain) -> Self {
        match domain {
            Domain::Identity => ResourceKind::User,
            Domain::Conversation => ResourceKind::Conversation,
            Domain::Message => ResourceKind::Message,
            Domain::DerivedUnit => ResourceKind::DerivedUnit,
            Domain::Memory => ResourceKind::Memory,
            Domain::Social => ResourceKind::Social,
            Domain::Circle => ResourceKind::Circle,
            Domain::Sync => ResourceKind::Sync,
            Domain::Anchor => ResourceKind::Anchor,
        }
    }
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::User => "user",
            ResourceKind::Conversation => "conversation",
            ResourceKind::Message => "message",
            ResourceKind::DerivedUnit => "derived-unit",
            ResourceKind::Memory => "memory",
            ResourceKind::Social => "social",
            ResourceKind::Circle => "circle",
            ResourceKind::Sync => "sync",
            ResourceKind::Anchor => "anchor",
            ResourceKind::Content => "content",
        }
    }
}

/// A concrete resource: kind plus identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub id: String,
}

impl Resource {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.id)
    }
}
