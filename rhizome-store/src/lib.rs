// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage for chain events and the entity projections folded from them.
//!
//! Stores are plain values owned by a node session. Running several replicas
//! side by side in one process, as the tests do, just means holding several
//! stores.
pub mod entity;
pub mod memory;
pub mod traits;

pub use entity::{Applied, EntityError, EntityState, Head};
pub use memory::MemoryStore;
pub use traits::{EntityStore, EventStore, StoreError};
