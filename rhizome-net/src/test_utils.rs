// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport doubles for tests.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::topic::TopicId;
use crate::transport::{BoxedStream, Transport, TransportError};

const CHANNEL_CAPACITY: usize = 64;

/// Process-local transport fanning bytes out over broadcast channels.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    channels: Mutex<HashMap<TopicId, broadcast::Sender<Vec<u8>>>>,
}

impl MemoryTransport {
    fn sender(&self, topic_id: TopicId) -> broadcast::Sender<Vec<u8>> {
        let mut channels = self.channels.lock().expect("transport lock poisoned");
        channels
            .entry(topic_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic_id: TopicId, bytes: Vec<u8>) -> Result<(), TransportError> {
        // An empty topic is fine; broadcast errors only mean "no receivers".
        let _ = self.sender(topic_id).send(bytes);
        Ok(())
    }

    async fn subscribe(&self, topic_id: TopicId) -> Result<BoxedStream<Vec<u8>>, TransportError> {
        let receiver = self.sender(topic_id).subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|result| result.ok());
        Ok(Box::pin(stream))
    }
}
