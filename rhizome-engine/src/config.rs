// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for a node session.
use rhizome_discovery::DiscoveryConfig;

/// Tunables for one node.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Content discovery settings, including the DHT lookup deadline.
    pub discovery: DiscoveryConfig,

    /// How often a causally blocked event is rechecked before it is dropped
    /// as unresolvable.
    pub max_buffer_attempts: u32,

    /// Delay before the first recheck of a blocked event; doubles on every
    /// further attempt.
    pub base_backoff_ms: u64,

    /// Capacity of the subscription broadcast channels.
    pub channel_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            max_buffer_attempts: 5,
            base_backoff_ms: 500,
            channel_capacity: 64,
        }
    }
}
