// SPDX-License-Identifier: MIT OR Apache-2.0

//! DHT doubles for tests.
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use rhizome_core::ContentId;

use crate::dht::{Dht, DhtError};

/// A process-local DHT backed by a plain map.
#[derive(Debug, Default)]
pub struct MemoryDht {
    records: Mutex<HashMap<String, Vec<u8>>>,
    provided: Mutex<HashSet<ContentId>>,
}

impl MemoryDht {
    /// True when the given content id has been announced.
    pub fn provided(&self, content_id: &ContentId) -> bool {
        self.provided
            .lock()
            .expect("memory dht lock poisoned")
            .contains(content_id)
    }
}

#[async_trait]
impl Dht for MemoryDht {
    async fn put(&self, key: String, value: Vec<u8>) -> Result<(), DhtError> {
        self.records
            .lock()
            .expect("memory dht lock poisoned")
            .insert(key, value);
        Ok(())
    }

    async fn get(&self, key: String) -> Result<Option<Vec<u8>>, DhtError> {
        Ok(self
            .records
            .lock()
            .expect("memory dht lock poisoned")
            .get(&key)
            .cloned())
    }

    async fn provide(
        &self,
        content_id: ContentId,
        _addresses: Vec<String>,
    ) -> Result<(), DhtError> {
        self.provided
            .lock()
            .expect("memory dht lock poisoned")
            .insert(content_id);
        Ok(())
    }
}

/// A DHT whose lookups never complete, for exercising deadline handling.
#[derive(Debug)]
pub struct StallingDht;

#[async_trait]
impl Dht for StallingDht {
    async fn put(&self, _key: String, _value: Vec<u8>) -> Result<(), DhtError> {
        std::future::pending().await
    }

    async fn get(&self, _key: String) -> Result<Option<Vec<u8>>, DhtError> {
        std::future::pending().await
    }

    async fn provide(
        &self,
        _content_id: ContentId,
        _addresses: Vec<String>,
    ) -> Result<(), DhtError> {
        std::future::pending().await
    }
}
