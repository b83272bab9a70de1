// SPDX-License-Identifier: MIT OR Apache-2.0

//! The external gossip substrate surface.
use std::fmt::Debug;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::topic::TopicId;

pub type BoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Moves bytes between peers subscribed to the same topic.
///
/// This crate only decides whether and where bytes go; connection handling,
/// NAT traversal and swarm membership live behind this trait.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    /// Broadcast bytes into a topic.
    async fn publish(&self, topic_id: TopicId, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribe to the stream of bytes broadcast into a topic.
    async fn subscribe(&self, topic_id: TopicId) -> Result<BoxedStream<Vec<u8>>, TransportError>;
}

/// Error type reported by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The substrate could not serve the request.
    #[error("transport failure: {0}")]
    Failed(String),
}
