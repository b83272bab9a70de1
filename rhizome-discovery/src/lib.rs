// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content provider discovery.
//!
//! A registry maps content ids to the peers currently able to serve them,
//! caching records locally and best-effort mirroring them into a DHT. A
//! failing or absent DHT degrades lookups to the local cache; discovery never
//! blocks a caller past its deadline and never raises on miss.
pub mod dht;
pub mod registry;
#[cfg(feature = "test_utils")]
pub mod test_utils;

pub use dht::{Dht, DhtError, DhtState};
pub use registry::{ContentRef, ContentRegistry, DiscoveryConfig, ProviderRecord};
