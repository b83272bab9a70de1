// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-topic access sets.
use std::collections::{HashMap, HashSet};

use tracing::debug;

use rhizome_core::Did;

use crate::topic::{Topic, TopicId};

/// Explicit access sets per scoped topic, owned by one node session.
///
/// Grants and revocations mirror the capability manager's semantics but are
/// topic-local; they never touch resource-level rights.
#[derive(Debug, Default)]
pub struct TopicTable {
    access: HashMap<TopicId, HashSet<Did>>,
}

impl TopicTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a peer on a scoped topic. Open topics need no grants.
    pub fn grant(&mut self, topic: &Topic, peer: Did) {
        if topic.is_open() {
            return;
        }
        debug!(topic = %topic, %peer, "granted topic access");
        self.access.entry(topic.id()).or_default().insert(peer);
    }

    /// Remove a peer from a scoped topic, immediately.
    pub fn revoke(&mut self, topic: &Topic, peer: &Did) -> bool {
        let Some(peers) = self.access.get_mut(&topic.id()) else {
            return false;
        };
        let removed = peers.remove(peer);
        if removed {
            debug!(topic = %topic, %peer, "revoked topic access");
        }
        removed
    }

    /// Whether a peer may read from and publish into a topic.
    ///
    /// Unconditionally true for open topics, membership otherwise.
    pub fn has_access(&self, topic: &Topic, peer: &Did) -> bool {
        if topic.is_open() {
            return true;
        }
        self.access
            .get(&topic.id())
            .is_some_and(|peers| peers.contains(peer))
    }

    /// Current members of a scoped topic.
    pub fn members(&self, topic: &Topic) -> HashSet<Did> {
        self.access.get(&topic.id()).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use rhizome_core::{Did, PrivateKey};

    use crate::topic::Topic;

    use super::TopicTable;

    fn peer() -> Did {
        Did::from_public_key(&PrivateKey::new().public_key())
    }

    #[test]
    fn open_topics_need_no_grant() {
        let table = TopicTable::new();
        let stranger = peer();

        assert!(table.has_access(&Topic::General, &stranger));
        assert!(table.has_access(&Topic::System("presence".to_string()), &stranger));
        assert!(!table.has_access(&Topic::Circle("gardeners".to_string()), &stranger));
    }

    #[test]
    fn grant_and_revoke() {
        let mut table = TopicTable::new();
        let topic = Topic::Circle("gardeners".to_string());
        let member = peer();

        table.grant(&topic, member.clone());
        assert!(table.has_access(&topic, &member));
        assert_eq!(table.members(&topic).len(), 1);

        assert!(table.revoke(&topic, &member));
        assert!(!table.has_access(&topic, &member));
        assert!(!table.revoke(&topic, &member));
    }

    #[test]
    fn access_is_per_topic() {
        let mut table = TopicTable::new();
        let member = peer();

        table.grant(&Topic::Circle("gardeners".to_string()), member.clone());
        assert!(!table.has_access(&Topic::Circle("beekeepers".to_string()), &member));
    }
}
