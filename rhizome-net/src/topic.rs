// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped broadcast topics.
//!
//! Topics partition the network into named channels. Their identifier on the
//! wire is the digest of the path, so transports only ever see opaque 32-byte
//! ids.
use std::fmt;

use rhizome_core::{Did, Hash};

/// Opaque topic identifier used by transports.
pub type TopicId = [u8; 32];

/// A named broadcast channel, scoped by what it carries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// The unscoped network-wide channel.
    General,

    /// Operational channels, open like `General`.
    System(String),

    /// A single user's personal channel.
    User(Did),

    /// A circle's shared channel.
    Circle(String),
}

impl Topic {
    /// Path form of the topic, `<scope>/<name>` for scoped ones.
    pub fn path(&self) -> String {
        match self {
            Topic::General => "general".to_string(),
            Topic::System(name) => format!("system/{name}"),
            Topic::User(did) => format!("user/{did}"),
            Topic::Circle(id) => format!("circle/{id}"),
        }
    }

    /// Wire identifier: digest of the path.
    pub fn id(&self) -> TopicId {
        Hash::new(self.path()).into()
    }

    /// Open topics carry no access set; everyone may read and publish.
    pub fn is_open(&self) -> bool {
        matches!(self, Topic::General | Topic::System(_))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

#[cfg(test)]
mod tests {
    use rhizome_core::{Did, PrivateKey};

    use super::Topic;

    #[test]
    fn paths_are_scoped() {
        assert_eq!(Topic::General.path(), "general");
        assert_eq!(Topic::System("presence".to_string()).path(), "system/presence");
        assert_eq!(Topic::Circle("gardeners".to_string()).path(), "circle/gardeners");

        let did = Did::from_public_key(&PrivateKey::new().public_key());
        assert_eq!(Topic::User(did.clone()).path(), format!("user/{did}"));
    }

    #[test]
    fn distinct_paths_have_distinct_ids() {
        let circle_a = Topic::Circle("a".to_string());
        let circle_b = Topic::Circle("b".to_string());
        assert_ne!(circle_a.id(), circle_b.id());
        assert_eq!(circle_a.id(), Topic::Circle("a".to_string()).id());
    }

    #[test]
    fn openness() {
        assert!(Topic::General.is_open());
        assert!(Topic::System("presence".to_string()).is_open());
        assert!(!Topic::Circle("gardeners".to_string()).is_open());
    }
}
