// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access-gated publishing into scoped topics.
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use rhizome_core::Did;

use crate::access::TopicTable;
use crate::topic::Topic;
use crate::transport::{BoxedStream, Transport, TransportError};

/// Gossip distribution for one node.
///
/// Every publish and subscribe is checked against the topic's access set
/// before the transport sees it. An unauthorized publish fails closed with
/// its own error, so callers can tell "not allowed" apart from "nobody
/// listening".
#[derive(Debug)]
pub struct Gossip {
    transport: Arc<dyn Transport>,
    topics: TopicTable,
    local_peer: Did,
}

impl Gossip {
    pub fn new(transport: Arc<dyn Transport>, local_peer: Did) -> Self {
        Self {
            transport,
            topics: TopicTable::new(),
            local_peer,
        }
    }

    pub fn local_peer(&self) -> &Did {
        &self.local_peer
    }

    /// Allow a peer on a scoped topic.
    pub fn grant(&mut self, topic: &Topic, peer: Did) {
        self.topics.grant(topic, peer);
    }

    /// Remove a peer from a scoped topic.
    pub fn revoke(&mut self, topic: &Topic, peer: &Did) -> bool {
        self.topics.revoke(topic, peer)
    }

    /// Whether a peer currently has access to a topic.
    pub fn has_access(&self, topic: &Topic, peer: &Did) -> bool {
        self.topics.has_access(topic, peer)
    }

    /// Broadcast bytes into a topic on behalf of the local peer.
    pub async fn publish(&self, topic: &Topic, bytes: Vec<u8>) -> Result<(), GossipError> {
        if !self.topics.has_access(topic, &self.local_peer) {
            return Err(GossipError::NotAuthorized {
                topic: topic.path(),
                peer: self.local_peer.clone(),
            });
        }

        self.transport.publish(topic.id(), bytes).await?;
        debug!(topic = %topic, "published to topic");
        Ok(())
    }

    /// Subscribe the local peer to a topic's byte stream.
    pub async fn subscribe(&self, topic: &Topic) -> Result<BoxedStream<Vec<u8>>, GossipError> {
        if !self.topics.has_access(topic, &self.local_peer) {
            return Err(GossipError::NotAuthorized {
                topic: topic.path(),
                peer: self.local_peer.clone(),
            });
        }

        Ok(self.transport.subscribe(topic.id()).await?)
    }
}

/// Error types for gossip distribution.
#[derive(Debug, Error)]
pub enum GossipError {
    /// The peer is not in the topic's access set. Distinct from the
    /// transport's errors, so "not allowed" never reads as "no peers".
    #[error("peer {peer} is not authorized for topic '{topic}'")]
    NotAuthorized { topic: String, peer: Did },

    /// The transport could not move the bytes.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_stream::StreamExt;

    use rhizome_core::{Did, PrivateKey};

    use crate::test_utils::MemoryTransport;
    use crate::topic::Topic;

    use super::{Gossip, GossipError};

    fn peer() -> Did {
        Did::from_public_key(&PrivateKey::new().public_key())
    }

    #[tokio::test]
    async fn open_topics_deliver_to_everyone() {
        let transport = Arc::new(MemoryTransport::default());
        let alice = Gossip::new(transport.clone(), peer());
        let bob = Gossip::new(transport, peer());

        let mut incoming = bob.subscribe(&Topic::General).await.unwrap();
        alice
            .publish(&Topic::General, b"hello everyone".to_vec())
            .await
            .unwrap();

        let received = incoming.next().await.unwrap();
        assert_eq!(received, b"hello everyone".to_vec());
    }

    #[tokio::test]
    async fn scoped_topics_fail_closed() {
        let transport = Arc::new(MemoryTransport::default());
        let outsider = Gossip::new(transport, peer());
        let topic = Topic::Circle("gardeners".to_string());

        let result = outsider.publish(&topic, b"let me in".to_vec()).await;
        assert!(matches!(result, Err(GossipError::NotAuthorized { .. })));

        let result = outsider.subscribe(&topic).await;
        assert!(matches!(result, Err(GossipError::NotAuthorized { .. })));
    }

    #[tokio::test]
    async fn granted_peer_can_publish_until_revoked() {
        let transport = Arc::new(MemoryTransport::default());
        let member = peer();
        let mut gossip = Gossip::new(transport, member.clone());
        let topic = Topic::Circle("gardeners".to_string());

        gossip.grant(&topic, member.clone());
        assert!(gossip.publish(&topic, b"compost tips".to_vec()).await.is_ok());

        gossip.revoke(&topic, &member);
        let result = gossip.publish(&topic, b"more tips".to_vec()).await;
        assert!(matches!(result, Err(GossipError::NotAuthorized { .. })));
    }

    #[tokio::test]
    async fn publishing_into_an_empty_topic_is_not_an_error() {
        let transport = Arc::new(MemoryTransport::default());
        let gossip = Gossip::new(transport, peer());

        // No subscribers anywhere: allowed, just nobody to hear it.
        assert!(
            gossip
                .publish(&Topic::General, b"anyone?".to_vec())
                .await
                .is_ok()
        );
    }
}
