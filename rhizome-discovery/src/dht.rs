// SPDX-License-Identifier: MIT OR Apache-2.0

//! The external DHT collaborator surface.
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use rhizome_core::ContentId;

/// A distributed key/value substrate used for provider discovery.
///
/// The registry only decides what to look up and announce; how the records
/// travel between peers is this trait's problem.
#[async_trait]
pub trait Dht: Debug + Send + Sync {
    /// Store a value under a key, best effort.
    async fn put(&self, key: String, value: Vec<u8>) -> Result<(), DhtError>;

    /// Look a key up, returning `None` when nobody holds it.
    async fn get(&self, key: String) -> Result<Option<Vec<u8>>, DhtError>;

    /// Announce this node as a provider of the given content.
    async fn provide(&self, content_id: ContentId, addresses: Vec<String>) -> Result<(), DhtError>;
}

/// Whether a DHT was wired up at construction time.
///
/// Checked once where the registry is built; call sites never test for a
/// possibly-absent handle again.
#[derive(Clone, Debug, Default)]
pub enum DhtState {
    /// Purely local operation, lookups degrade to cache-only.
    #[default]
    Unconfigured,

    /// A DHT is reachable through the given handle.
    Available(Arc<dyn Dht>),
}

impl DhtState {
    pub fn is_configured(&self) -> bool {
        matches!(self, DhtState::Available(_))
    }
}

impl From<Arc<dyn Dht>> for DhtState {
    fn from(dht: Arc<dyn Dht>) -> Self {
        DhtState::Available(dht)
    }
}

/// Error type reported by DHT implementations.
#[derive(Debug, Error)]
pub enum DhtError {
    /// The substrate could not serve the request.
    #[error("dht unavailable: {0}")]
    Unavailable(String),
}
