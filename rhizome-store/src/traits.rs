// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces onto event and entity-state persistence.
use rhizome_core::{ChainEvent, ContentId};
use thiserror::Error;

use crate::entity::EntityState;

/// Interface onto the append-only event log.
///
/// Insertion is idempotent by content id; an accepted event is never removed
/// again, tombstoning happens at the entity level through dedicated events.
pub trait EventStore {
    /// Insert an event, returning false when it was already present.
    fn insert_event(&mut self, event: ChainEvent) -> Result<bool, StoreError>;

    fn get_event(&self, id: &ContentId) -> Result<Option<ChainEvent>, StoreError>;

    fn has_event(&self, id: &ContentId) -> Result<bool, StoreError>;

    /// All events referencing the given entity, in timestamp order.
    fn events_for_entity(&self, entity_id: &str) -> Result<Vec<ChainEvent>, StoreError>;
}

/// Interface onto materialized entity projections.
pub trait EntityStore {
    fn get_entity(&self, entity_id: &str) -> Result<Option<EntityState>, StoreError>;

    fn insert_entity(&mut self, state: EntityState) -> Result<(), StoreError>;

    fn entity_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Error type for storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Backend(String),
}
