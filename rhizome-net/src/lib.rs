// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic-scoped gossip distribution with per-topic access control.
//!
//! The network is partitioned into named topics: one open `general` channel,
//! open `system` channels, and scoped per-user and per-circle channels which
//! carry explicit access sets. Publishing into a scoped topic without access
//! fails closed before any bytes reach the transport.
pub mod access;
pub mod gossip;
#[cfg(feature = "test_utils")]
pub mod test_utils;
pub mod topic;
pub mod transport;

pub use access::TopicTable;
pub use gossip::{Gossip, GossipError};
pub use topic::{Topic, TopicId};
pub use transport::{BoxedStream, Transport, TransportError};
