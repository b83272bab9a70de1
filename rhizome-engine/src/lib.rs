// SPDX-License-Identifier: MIT OR Apache-2.0

//! The replication engine tying the event model, capability gate, discovery
//! and gossip layers together into one node.
//!
//! Every event, local or inbound, passes the same pipeline: integrity
//! verification, the capability gate, causal readiness, then the atomic
//! merge-and-index step, and finally best-effort announcement. Causally
//! blocked events wait in a bounded buffer; everything else fails with a
//! typed error.
pub mod buffer;
pub mod config;
pub mod error;
pub mod node;
pub mod subscriptions;

pub use buffer::{CausalBuffer, PendingEvent};
pub use config::NodeConfig;
pub use error::{CausalityError, EngineError};
pub use node::{Acceptance, EventDraft, Node, SweepOutcome};
pub use subscriptions::{NodeEvent, Subscriptions};
