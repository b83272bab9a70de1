// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping content ids to the peers able to serve them.
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use rhizome_core::{ContentId, Did, decode_cbor, encode_cbor};

use crate::dht::DhtState;

/// Configuration for the content registry.
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// Namespace prefix of all DHT keys written by this deployment.
    pub namespace: String,

    /// Ceiling on any single DHT lookup.
    pub dht_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            namespace: "rhizome".to_string(),
            dht_timeout: Duration::from_secs(2),
        }
    }
}

/// Discovery metadata registered for one piece of content.
///
/// Lives independently of whatever event referenced the content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    pub owner: Did,
    pub content_type: String,
    pub size: u64,
    pub mime: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// The most recently known provider set for one content id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub content_ref: ContentRef,
    pub providers: BTreeSet<Did>,
}

/// Local provider cache, optionally backed by a DHT.
///
/// Lookups are degraded service, never errors: a missing, slow or
/// unconfigured DHT yields the empty provider set within the configured
/// deadline.
#[derive(Debug)]
pub struct ContentRegistry {
    config: DiscoveryConfig,
    dht: DhtState,
    cache: HashMap<ContentId, ProviderRecord>,
}

impl ContentRegistry {
    pub fn new(config: DiscoveryConfig, dht: DhtState) -> Self {
        Self {
            config,
            dht,
            cache: HashMap::new(),
        }
    }

    fn key(&self, content_id: &ContentId) -> String {
        format!("/{}/content/{}", self.config.namespace, content_id)
    }

    /// Record a provider locally and announce it to the DHT, best effort.
    pub async fn publish(
        &mut self,
        content_id: ContentId,
        content_ref: ContentRef,
        provider: Did,
    ) {
        let record = match self.cache.get_mut(&content_id) {
            Some(record) => {
                record.providers.insert(provider);
                record.content_ref.updated_at = content_ref.updated_at;
                record.clone()
            }
            None => {
                let record = ProviderRecord {
                    content_ref,
                    providers: BTreeSet::from([provider]),
                };
                self.cache.insert(content_id, record.clone());
                record
            }
        };

        let DhtState::Available(dht) = &self.dht else {
            return;
        };

        let value = match encode_cbor(&record) {
            Ok(value) => value,
            Err(err) => {
                warn!(%content_id, "failed to encode provider record: {err}");
                return;
            }
        };

        let announce = async {
            dht.put(self.key(&content_id), value).await?;
            dht.provide(content_id, vec![]).await
        };
        match timeout(self.config.dht_timeout, announce).await {
            Ok(Ok(())) => debug!(%content_id, "announced content to dht"),
            Ok(Err(err)) => warn!(%content_id, "dht announce failed: {err}"),
            Err(_) => warn!(%content_id, "dht announce timed out"),
        }
    }

    /// Providers currently known for the given content id.
    ///
    /// Checks the local cache first and falls back to a deadline-bounded DHT
    /// lookup. Total failure returns the empty set.
    pub async fn find_providers(&mut self, content_id: &ContentId) -> BTreeSet<Did> {
        if let Some(record) = self.cache.get(content_id) {
            return record.providers.clone();
        }

        let DhtState::Available(dht) = &self.dht else {
            return BTreeSet::new();
        };

        let bytes = match timeout(self.config.dht_timeout, dht.get(self.key(content_id))).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => return BTreeSet::new(),
            Ok(Err(err)) => {
                warn!(%content_id, "dht lookup failed: {err}");
                return BTreeSet::new();
            }
            Err(_) => {
                warn!(%content_id, "dht lookup timed out");
                return BTreeSet::new();
            }
        };

        match decode_cbor::<ProviderRecord, _>(&bytes[..]) {
            Ok(record) => {
                let providers = record.providers.clone();
                self.cache.insert(*content_id, record);
                providers
            }
            Err(err) => {
                warn!(%content_id, "malformed provider record from dht: {err}");
                BTreeSet::new()
            }
        }
    }

    /// Drop one provider from the local record.
    pub fn retract(&mut self, content_id: &ContentId, provider: &Did) -> bool {
        match self.cache.get_mut(content_id) {
            Some(record) => record.providers.remove(provider),
            None => false,
        }
    }

    /// The locally cached record, if any.
    pub fn cached(&self, content_id: &ContentId) -> Option<&ProviderRecord> {
        self.cache.get(content_id)
    }

    pub fn is_dht_configured(&self) -> bool {
        self.dht.is_configured()
    }
}
